//
// Copyright (c) 2025 Abby Project Contributors
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: abby — Hardware-bound audio delivery at the edge.
//

//! Producer thread wiring a [`StreamDecryptor`] to a [`RollingBuffer`].
//!
//! One pipeline per active track. The producer loop:
//! check stop → service a pending seek → wait for buffer space →
//! decrypt one chunk → push. On end-of-file the producer parks on the
//! buffer until a seek or stop arrives. A chunk authentication failure
//! is fatal: the error message is stored, stop is requested, and the
//! producer exits — the consumer then observes end-of-stream and
//! `status` surfaces the message.

use crate::buffer::{BufferSignal, BufferedChunk, RollingBuffer};
use crate::decryptor::StreamDecryptor;
use crate::error::ContainerError;
use crate::reader::ChunkStreamReader;

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Message stored when a chunk fails authentication mid-stream.
pub const DECRYPT_AUTH_ERROR: &str = "Decryption Failed: Authentication Error";

/// A running producer/buffer pair for one track.
pub struct Pipeline {
    buffer: Arc<RollingBuffer>,
    total_chunks: u32,
    last_error: Arc<Mutex<Option<String>>>,
    producer: Option<JoinHandle<()>>,
}

impl Pipeline {
    /// Spawn the producer thread over an opened decryptor.
    pub fn start(decryptor: StreamDecryptor) -> Self {
        let buffer = Arc::new(RollingBuffer::new());
        let total_chunks = decryptor.total_chunks();
        let last_error = Arc::new(Mutex::new(None));

        let producer = {
            let buffer = Arc::clone(&buffer);
            let last_error = Arc::clone(&last_error);
            thread::spawn(move || produce(decryptor, &buffer, &last_error))
        };

        Self {
            buffer,
            total_chunks,
            last_error,
            producer: Some(producer),
        }
    }

    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    pub fn buffer(&self) -> &Arc<RollingBuffer> {
        &self.buffer
    }

    /// New byte-stream consumer over this pipeline's buffer.
    pub fn reader(&self) -> ChunkStreamReader {
        ChunkStreamReader::new(Arc::clone(&self.buffer), self.total_chunks)
    }

    /// The fatal error message, if the producer died on one.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap().clone()
    }

    /// Stop the producer and join it. Safe to call twice; the second
    /// call is a no-op that returns promptly.
    pub fn stop(&mut self) {
        self.buffer.request_stop();
        if let Some(handle) = self.producer.take() {
            let _ = handle.join();
        }
        self.buffer.clear();
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

fn produce(
    mut decryptor: StreamDecryptor,
    buffer: &RollingBuffer,
    last_error: &Mutex<Option<String>>,
) {
    loop {
        if buffer.stop_requested() {
            break;
        }

        if let Some(req) = buffer.take_seek_request() {
            let target = req.chunk.min(decryptor.total_chunks());
            if let Err(e) = decryptor.seek(target) {
                store_error(last_error, &e);
                buffer.request_stop();
                break;
            }
        }

        match buffer.wait_writable() {
            BufferSignal::Ready => {}
            BufferSignal::Stopped => break,
            BufferSignal::SeekPending => continue,
        }

        match decryptor.decrypt_next() {
            Ok(Some(chunk)) => {
                match buffer.push(BufferedChunk {
                    index: chunk.index,
                    data: chunk.data,
                }) {
                    BufferSignal::Ready => {}
                    BufferSignal::Stopped => break,
                    // The decrypted chunk is stale after a seek; the
                    // decryptor gets repositioned on the next pass.
                    BufferSignal::SeekPending => continue,
                }
            }
            Ok(None) => {
                buffer.mark_eof();
                buffer.wait_for_work();
            }
            Err(e) => {
                store_error(last_error, &e);
                buffer.request_stop();
                break;
            }
        }
    }
}

fn store_error(slot: &Mutex<Option<String>>, error: &ContainerError) {
    let message = match error {
        ContainerError::AuthFailed => DECRYPT_AUTH_ERROR.to_string(),
        other => format!("Decryption Failed: {other}"),
    };
    eprintln!("[ERR] pipeline: {message}");
    *slot.lock().unwrap() = Some(message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{encrypt_file, CHUNK_SIZE, HEADER_LEN, RECORD_OVERHEAD};
    use crate::hwid::DeviceId;
    use crate::MAX_BUFFERED_CHUNKS;
    use std::fs;
    use std::io::Read;
    use std::time::Duration;

    fn device() -> DeviceId {
        DeviceId::from("MACHINE_pipeline_tests")
    }

    fn encoded(data: &[u8]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("plain.bin");
        let dst = dir.path().join("track.pira");
        fs::write(&src, data).unwrap();
        encrypt_file(&src, &dst, &device()).unwrap();
        (dir, dst)
    }

    fn open_pipeline(path: &std::path::Path) -> Pipeline {
        Pipeline::start(StreamDecryptor::open(path, &device()).unwrap())
    }

    #[test]
    fn streams_whole_track_through_reader() {
        let data: Vec<u8> = (0..CHUNK_SIZE * 2 + 777).map(|i| (i % 239) as u8).collect();
        let (_dir, path) = encoded(&data);

        let mut pipeline = open_pipeline(&path);
        let mut out = Vec::new();
        pipeline.reader().read_to_end(&mut out).unwrap();

        assert_eq!(out, data);
        assert!(pipeline.last_error().is_none());
        pipeline.stop();
    }

    #[test]
    fn buffer_never_exceeds_capacity() {
        // 25 chunks: more than the buffer may hold at once.
        let data = vec![5u8; CHUNK_SIZE * MAX_BUFFERED_CHUNKS + CHUNK_SIZE * 5];
        let (_dir, path) = encoded(&data);

        let mut pipeline = open_pipeline(&path);
        let buffer = Arc::clone(pipeline.buffer());

        let mut reader = pipeline.reader();
        let mut sink = vec![0u8; CHUNK_SIZE / 3];
        let mut total = 0usize;
        loop {
            assert!(buffer.len() <= MAX_BUFFERED_CHUNKS);
            let n = reader.read(&mut sink).unwrap();
            if n == 0 && reader.at_end() {
                break;
            }
            total += n;
        }
        assert_eq!(total, data.len());
        pipeline.stop();
    }

    #[test]
    fn slow_path_seek_repositions_producer() {
        let mut data = vec![0u8; CHUNK_SIZE * (MAX_BUFFERED_CHUNKS + 10)];
        let marker = CHUNK_SIZE * 28 + 12;
        data[marker] = 0xEE;
        let (_dir, path) = encoded(&data);

        let mut pipeline = open_pipeline(&path);
        let mut reader = pipeline.reader();

        // Chunk 28 cannot be buffered while chunk 0 is still queued.
        use std::io::{Seek, SeekFrom};
        let target = 28 * CHUNK_SIZE as u64 + 12;
        assert_eq!(reader.seek(SeekFrom::Start(target)).unwrap(), target);

        let mut byte = [0u8; 1];
        assert_eq!(reader.read(&mut byte).unwrap(), 1);
        assert_eq!(byte[0], 0xEE);
        pipeline.stop();
    }

    #[test]
    fn auth_failure_mid_stream_stops_and_surfaces_error() {
        let data = vec![3u8; CHUNK_SIZE + 99];
        let (_dir, path) = encoded(&data);

        // Corrupt the second chunk's tag.
        let mut bytes = fs::read(&path).unwrap();
        let tag_off = HEADER_LEN + RECORD_OVERHEAD + CHUNK_SIZE + 12;
        bytes[tag_off] ^= 0xff;
        fs::write(&path, &bytes).unwrap();

        let mut pipeline = open_pipeline(&path);
        let mut reader = pipeline.reader();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();

        // Only the intact first chunk came through; the error is stored.
        assert_eq!(out.len(), CHUNK_SIZE);
        assert_eq!(pipeline.last_error().as_deref(), Some(DECRYPT_AUTH_ERROR));
        assert!(pipeline.buffer().stop_requested());
        pipeline.stop();
    }

    #[test]
    fn stop_is_idempotent_and_prompt() {
        let data = vec![1u8; CHUNK_SIZE * 3];
        let (_dir, path) = encoded(&data);

        let mut pipeline = open_pipeline(&path);
        pipeline.stop();

        let started = std::time::Instant::now();
        pipeline.stop();
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn producer_parks_at_eof_and_serves_a_later_seek() {
        let data = vec![9u8; CHUNK_SIZE * 2];
        let (_dir, path) = encoded(&data);

        let mut pipeline = open_pipeline(&path);
        let mut reader = pipeline.reader();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out.len(), data.len());
        assert!(reader.at_end());

        // Rewind after EOF: the parked producer must wake and refill.
        use std::io::{Seek, SeekFrom};
        assert_eq!(reader.seek(SeekFrom::Start(0)).unwrap(), 0);
        let mut byte = [0u8; 1];
        assert_eq!(reader.read(&mut byte).unwrap(), 1);
        assert_eq!(byte[0], 9);
        pipeline.stop();
    }
}
