//
// Copyright (c) 2025 Abby Project Contributors
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: abby — Hardware-bound audio delivery at the edge.
//

//! PCM sinks the consumer thread writes decrypted audio into.
//!
//! The pipeline treats the sink as opaque: it pulls bytes through the
//! core reader and hands them over here. The default [`NullSink`]
//! consumes at real-time rate without touching any audio hardware, so
//! headless devices and tests behave like a playing device. The `audio`
//! feature adds [`cpal_out::CpalSink`] for real output.

use anyhow::Result;
use std::time::Duration;

use abby_core::container::CHUNK_SIZE;

/// Bytes of PCM per second of playback (one container chunk).
pub const BYTES_PER_SECOND: usize = CHUNK_SIZE;

/// Destination for interleaved 16-bit LE stereo PCM at 44.1 kHz.
///
/// Constructed inside the consumer thread and never leaves it, so
/// platform audio handles that are not `Send` (cpal streams) still fit.
pub trait PcmSink {
    /// Write one block of PCM. `volume` is `0.0..=1.0`.
    fn write(&mut self, pcm: &[u8], volume: f32) -> Result<()>;
}

/// Factory invoked once per track start, inside the consumer thread.
pub type SinkFactory = Box<dyn Fn() -> Result<Box<dyn PcmSink>> + Send + Sync>;

/// A sink that discards samples, optionally pacing itself to wall-clock
/// playback speed.
pub struct NullSink {
    realtime: bool,
}

impl NullSink {
    /// Discard at real-time rate (the daemon default without `audio`).
    pub fn realtime() -> Self {
        Self { realtime: true }
    }

    /// Discard instantly (tests).
    pub fn instant() -> Self {
        Self { realtime: false }
    }

    pub fn factory(realtime: bool) -> SinkFactory {
        Box::new(move || {
            Ok(Box::new(NullSink { realtime }) as Box<dyn PcmSink>)
        })
    }
}

impl PcmSink for NullSink {
    fn write(&mut self, pcm: &[u8], _volume: f32) -> Result<()> {
        if self.realtime {
            let nanos = pcm.len() as u64 * 1_000_000_000 / BYTES_PER_SECOND as u64;
            std::thread::sleep(Duration::from_nanos(nanos));
        }
        Ok(())
    }
}

#[cfg(feature = "audio")]
pub mod cpal_out {
    //! Real audio output through cpal, mirroring how the rest of the
    //! stack gates hardware audio behind a feature.

    use super::PcmSink;
    use anyhow::{anyhow, Context, Result};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Upper bound on queued samples (about two seconds at 44.1 kHz
    /// stereo) before `write` backpressures.
    const QUEUE_LIMIT: usize = super::BYTES_PER_SECOND;

    pub struct CpalSink {
        queue: Arc<Mutex<VecDeque<i16>>>,
        _stream: cpal::Stream,
    }

    impl CpalSink {
        pub fn open() -> Result<Self> {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| anyhow!("no output audio device"))?;

            let config = cpal::StreamConfig {
                channels: 2,
                sample_rate: cpal::SampleRate(44_100),
                buffer_size: cpal::BufferSize::Default,
            };

            let queue = Arc::new(Mutex::new(VecDeque::<i16>::new()));
            let cb_queue = Arc::clone(&queue);

            let stream = device
                .build_output_stream(
                    &config,
                    move |out: &mut [i16], _| {
                        let mut q = cb_queue.lock().unwrap();
                        for sample in out.iter_mut() {
                            *sample = q.pop_front().unwrap_or(0);
                        }
                    },
                    |e| eprintln!("[ERR] audio stream error: {e}"),
                    None,
                )
                .context("build output stream")?;
            stream.play().context("start output stream")?;

            Ok(Self {
                queue,
                _stream: stream,
            })
        }
    }

    impl PcmSink for CpalSink {
        fn write(&mut self, pcm: &[u8], volume: f32) -> Result<()> {
            let samples = pcm.chunks_exact(2).map(|pair| {
                let sample = i16::from_le_bytes([pair[0], pair[1]]);
                (sample as f32 * volume) as i16
            });

            for sample in samples {
                loop {
                    {
                        let mut q = self.queue.lock().unwrap();
                        if q.len() < QUEUE_LIMIT {
                            q.push_back(sample);
                            break;
                        }
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn instant_sink_returns_immediately() {
        let mut sink = NullSink::instant();
        let started = Instant::now();
        sink.write(&vec![0u8; BYTES_PER_SECOND], 1.0).unwrap();
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn realtime_sink_paces_writes() {
        let mut sink = NullSink::realtime();
        let started = Instant::now();
        // A tenth of a second of audio takes about that long to drain.
        sink.write(&vec![0u8; BYTES_PER_SECOND / 10], 1.0).unwrap();
        assert!(started.elapsed() >= Duration::from_millis(90));
    }
}
