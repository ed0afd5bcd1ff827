//
// Copyright (c) 2025 Abby Project Contributors
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: abby — Hardware-bound audio delivery at the edge.
//

//! Byte-stream façade over the rolling buffer for the audio decoder.
//!
//! The external decoder treats the decrypted track as a flat byte space
//! of `total_chunks × CHUNK_SIZE` bytes and pulls through `Read`/`Seek`.
//! Reads drain the buffer's front entry; seeks either adjust the
//! buffered window in place or reposition the producer.
//!
//! Short reads are legal: when the buffer stays empty past a bounded
//! wait the adapter returns whatever it collected (possibly nothing),
//! which the decoder interprets as underrun or end-of-stream.

use crate::buffer::RollingBuffer;
use crate::container::CHUNK_SIZE;

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;
use std::time::Duration;

/// Bound on one empty-buffer wait inside `read`.
const READ_WAIT: Duration = Duration::from_millis(250);

/// How long a slow-path seek may wait for the producer to refill.
const SEEK_WAIT: Duration = Duration::from_secs(3);

/// `Read + Seek` adapter over a [`RollingBuffer`]. One per consumer.
pub struct ChunkStreamReader {
    buffer: Arc<RollingBuffer>,
    total_chunks: u32,
    /// Logical stream position, authoritative when the buffer is empty.
    pos: u64,
}

impl ChunkStreamReader {
    pub fn new(buffer: Arc<RollingBuffer>, total_chunks: u32) -> Self {
        Self {
            buffer,
            total_chunks,
            pos: 0,
        }
    }

    /// Total length of the flat byte space.
    pub fn stream_len(&self) -> u64 {
        self.total_chunks as u64 * CHUNK_SIZE as u64
    }

    /// Current position in the flat byte space, preferring the buffered
    /// front entry over the locally tracked position.
    pub fn position(&self) -> u64 {
        match self.buffer.front_position() {
            Some((index, cursor)) => index as u64 * CHUNK_SIZE as u64 + cursor as u64,
            None => self.pos,
        }
    }

    /// True once the producer finished and the buffer drained.
    pub fn at_end(&self) -> bool {
        self.buffer.at_end()
    }

    /// True once the pipeline was told to stop.
    pub fn stopped(&self) -> bool {
        self.buffer.stop_requested()
    }
}

impl Read for ChunkStreamReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut collected = 0;
        while collected < buf.len() {
            // A pending seek means another party is repositioning the
            // stream; hand back what we have and let the caller retry.
            if self.buffer.seek_pending() {
                break;
            }

            // Resynchronize with the buffered window first: a control-
            // side seek may have moved the stream under us.
            if let Some((index, cursor)) = self.buffer.front_position() {
                self.pos = index as u64 * CHUNK_SIZE as u64 + cursor as u64;
            }

            let n = self.buffer.read_front(&mut buf[collected..]);
            if n > 0 {
                collected += n;
                self.pos += n as u64;
                continue;
            }

            // Buffered data already drained above, so a stop or EOF now
            // means end-of-stream rather than underrun.
            if self.buffer.stop_requested() || self.buffer.at_end() {
                break;
            }

            // Empty: wait bounded for the producer, then give up on
            // this pass if still dry (underrun).
            if !self.buffer.wait_nonempty(READ_WAIT) {
                break;
            }
        }

        Ok(collected)
    }
}

impl Seek for ChunkStreamReader {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        let len = self.stream_len() as i64;
        let wanted = match target {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(delta) => self.position() as i64 + delta,
            SeekFrom::End(delta) => len + delta,
        };
        // Out-of-range targets clamp to the stream bounds.
        let wanted = wanted.clamp(0, len) as u64;

        let chunk = (wanted / CHUNK_SIZE as u64) as u32;
        let offset = (wanted % CHUNK_SIZE as u64) as usize;

        // Seeking to the very end needs no chunk at the front.
        if chunk >= self.total_chunks {
            self.buffer.request_seek(self.total_chunks);
            self.pos = wanted;
            return Ok(wanted);
        }

        // Fast path: the target is already buffered.
        if self.buffer.seek_within(chunk, offset) {
            self.pos = wanted;
            return Ok(wanted);
        }

        // Slow path: clear the buffer, reposition the producer, wait
        // for the target chunk to arrive at the front.
        self.buffer.request_seek(chunk);
        if !self.buffer.wait_for_chunk(chunk, SEEK_WAIT) {
            self.pos = self.stream_len();
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("seek to chunk {chunk} timed out"),
            ));
        }
        self.buffer.seek_within(chunk, offset);
        self.pos = wanted;
        Ok(wanted)
    }
}
