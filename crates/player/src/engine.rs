//
// Copyright (c) 2025 Abby Project Contributors
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: abby — Hardware-bound audio delivery at the edge.
//

//! The playback engine: one active track, one pipeline, one sink.
//!
//! `play` opens the container for this device, starts the core
//! pipeline's producer and spawns a consumer thread that pulls bytes
//! through the stream reader into the PCM sink. Control commands
//! (pause, resume, seek, volume, status) act on shared state; the
//! engine never reaches into the pipeline's internals.

use abby_core::decryptor::StreamDecryptor;
use abby_core::hwid::DeviceId;
use abby_core::pipeline::Pipeline;
use abby_core::reader::ChunkStreamReader;

use anyhow::{anyhow, Result};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::sink::{SinkFactory, BYTES_PER_SECOND};

/// How long `play` waits for the first chunk before giving up.
const PREBUFFER_WAIT: Duration = Duration::from_secs(5);

/// Consumer block size: 50 ms of PCM.
const CONSUME_BLOCK: usize = BYTES_PER_SECOND / 20;

struct Session {
    pipeline: Pipeline,
    /// Seek-only reader; the consuming reader lives on the consumer thread.
    control: ChunkStreamReader,
    consumer: Option<JoinHandle<()>>,
    position: Arc<AtomicU64>,
    active: Arc<AtomicBool>,
    path: String,
}

/// Single-track playback engine. All methods take `&self`; internal
/// state is behind one session lock plus a few atomics the consumer
/// thread shares.
pub struct AudioEngine {
    device: DeviceId,
    sink_factory: Arc<SinkFactory>,
    session: Mutex<Option<Session>>,
    paused: Arc<AtomicBool>,
    volume_bits: Arc<AtomicU32>,
    last_error: Mutex<Option<String>>,
}

impl AudioEngine {
    pub fn new(device: DeviceId, sink_factory: SinkFactory) -> Self {
        Self {
            device,
            sink_factory: Arc::new(sink_factory),
            session: Mutex::new(None),
            paused: Arc::new(AtomicBool::new(false)),
            volume_bits: Arc::new(AtomicU32::new(1.0f32.to_bits())),
            last_error: Mutex::new(None),
        }
    }

    /// Start playing a container file, replacing any current track.
    pub fn play(&self, path: &Path) -> Result<()> {
        self.stop();
        *self.last_error.lock().unwrap() = None;

        println!("[PLAY] Opening encrypted file: {}", path.display());
        let decryptor = StreamDecryptor::open(path, &self.device)
            .map_err(|e| anyhow!("open container: {e}"))?;
        let total_chunks = decryptor.total_chunks();
        let pipeline = Pipeline::start(decryptor);

        // Block until the producer delivered the first chunk so the
        // sink does not start on an empty buffer.
        if !pipeline.buffer().wait_nonempty(PREBUFFER_WAIT) {
            let reason = pipeline
                .last_error()
                .unwrap_or_else(|| "timeout waiting for pre-buffer".to_string());
            *self.last_error.lock().unwrap() = Some(reason.clone());
            drop(pipeline);
            return Err(anyhow!("pre-buffer failed: {reason}"));
        }

        println!("[PLAY] Total chunks: {total_chunks}");

        let position = Arc::new(AtomicU64::new(0));
        let active = Arc::new(AtomicBool::new(true));
        self.paused.store(false, Ordering::Release);

        let consumer = {
            let reader = pipeline.reader();
            let factory = Arc::clone(&self.sink_factory);
            let paused = Arc::clone(&self.paused);
            let volume_bits = Arc::clone(&self.volume_bits);
            let position = Arc::clone(&position);
            let active = Arc::clone(&active);
            thread::spawn(move || {
                consume(reader, &factory, &paused, &volume_bits, &position);
                active.store(false, Ordering::Release);
            })
        };

        let control = pipeline.reader();
        *self.session.lock().unwrap() = Some(Session {
            pipeline,
            control,
            consumer: Some(consumer),
            position,
            active,
            path: path.display().to_string(),
        });
        Ok(())
    }

    /// Stop playback and release the track. Idempotent; a second call
    /// returns promptly.
    pub fn stop(&self) {
        let mut guard = self.session.lock().unwrap();
        if let Some(mut session) = guard.take() {
            session.pipeline.stop();
            if let Some(handle) = session.consumer.take() {
                let _ = handle.join();
            }
            if let Some(error) = session.pipeline.last_error() {
                *self.last_error.lock().unwrap() = Some(error);
            }
            println!("[PLAY] Stopped {}", session.path);
        }
        self.paused.store(false, Ordering::Release);
    }

    pub fn pause(&self) {
        let guard = self.session.lock().unwrap();
        if guard.as_ref().is_some_and(|s| s.active.load(Ordering::Acquire)) {
            self.paused.store(true, Ordering::Release);
            println!("[PLAY] Paused");
        }
    }

    pub fn resume(&self) {
        if self.paused.swap(false, Ordering::AcqRel) {
            println!("[PLAY] Resumed");
        }
    }

    /// Seek to an absolute position in seconds.
    pub fn seek(&self, seconds: f32) -> Result<()> {
        let mut guard = self.session.lock().unwrap();
        let session = guard.as_mut().ok_or_else(|| anyhow!("no active track"))?;

        let target = (seconds.max(0.0) as f64 * BYTES_PER_SECOND as f64) as u64;
        session
            .control
            .seek(SeekFrom::Start(target))
            .map_err(|e| anyhow!("seek: {e}"))?;
        session
            .position
            .store(session.control.position(), Ordering::Relaxed);
        println!("[PLAY] Seeked to {seconds}s");
        Ok(())
    }

    pub fn set_volume(&self, volume: f32) {
        let clamped = volume.clamp(0.0, 1.0);
        self.volume_bits
            .store(clamped.to_bits(), Ordering::Relaxed);
        println!("[PLAY] Volume set to {}%", (clamped * 100.0).round() as i32);
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }

    pub fn is_playing(&self) -> bool {
        let guard = self.session.lock().unwrap();
        guard.as_ref().is_some_and(|s| s.active.load(Ordering::Acquire))
            && !self.paused.load(Ordering::Acquire)
    }

    /// One-line status for the control socket:
    /// `PLAYING [12s / 200s]`, `PAUSED [...]`, `STOPPED` or `ERROR: ...`.
    pub fn status(&self) -> String {
        let guard = self.session.lock().unwrap();
        if let Some(session) = &*guard {
            if let Some(error) = session.pipeline.last_error() {
                return format!("ERROR: {error}");
            }
            if session.active.load(Ordering::Acquire) {
                let current = session.position.load(Ordering::Relaxed) as usize / BYTES_PER_SECOND;
                let total = session.pipeline.total_chunks();
                return if self.paused.load(Ordering::Acquire) {
                    format!("PAUSED [{current}s / {total}s]")
                } else {
                    format!("PLAYING [{current}s / {total}s]")
                };
            }
        }
        drop(guard);

        match &*self.last_error.lock().unwrap() {
            Some(error) => format!("ERROR: {error}"),
            None => "STOPPED".to_string(),
        }
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn consume(
    mut reader: ChunkStreamReader,
    factory: &SinkFactory,
    paused: &AtomicBool,
    volume_bits: &AtomicU32,
    position: &AtomicU64,
) {
    let mut sink = match factory() {
        Ok(sink) => sink,
        Err(e) => {
            eprintln!("[ERR] sink init failed: {e:#}");
            return;
        }
    };

    let mut block = vec![0u8; CONSUME_BLOCK];
    loop {
        if reader.stopped() {
            break;
        }
        if paused.load(Ordering::Acquire) {
            thread::sleep(Duration::from_millis(20));
            continue;
        }

        let n = match reader.read(&mut block) {
            Ok(n) => n,
            Err(e) => {
                eprintln!("[ERR] stream read failed: {e}");
                break;
            }
        };
        if n == 0 {
            if reader.stopped() || reader.at_end() {
                break;
            }
            // Underrun: the bounded wait already happened inside read.
            continue;
        }

        let volume = f32::from_bits(volume_bits.load(Ordering::Relaxed));
        if let Err(e) = sink.write(&block[..n], volume) {
            eprintln!("[ERR] sink write failed: {e:#}");
            break;
        }
        position.store(reader.position(), Ordering::Relaxed);
    }
}
