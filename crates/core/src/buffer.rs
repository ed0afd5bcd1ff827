//
// Copyright (c) 2025 Abby Project Contributors
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: abby — Hardware-bound audio delivery at the edge.
//

//! Bounded FIFO of decrypted chunks between producer and consumer.
//!
//! One producer (the decryption thread) pushes, one consumer (the audio
//! sink, through [`crate::reader::ChunkStreamReader`]) drains. The
//! buffer owns a single mutex/condvar pair and is the only
//! synchronization point between the two sides — the lock never leaks
//! to callers. Control flags (`stop`, pending seek, producer EOF) live
//! on the buffer and wake all waiters when set.
//!
//! Entries are ordered by `chunk_index`: strictly increasing, and the
//! front entry's read cursor never exceeds its length.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Capacity of the buffer in chunks (about twenty seconds of audio).
pub const MAX_BUFFERED_CHUNKS: usize = 20;

/// A decrypted chunk queued for consumption.
pub struct BufferedChunk {
    pub index: u32,
    pub data: Vec<u8>,
}

struct Entry {
    index: u32,
    data: Vec<u8>,
    cursor: usize,
}

/// A pending repositioning request from the consumer to the producer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SeekRequest {
    pub chunk: u32,
}

/// Result of a producer-side blocking call: either the producer may
/// proceed, or a control flag interrupted the wait.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BufferSignal {
    Ready,
    Stopped,
    SeekPending,
}

#[derive(Default)]
struct State {
    queue: VecDeque<Entry>,
    stop: bool,
    seek: Option<SeekRequest>,
    eof: bool,
}

/// The bounded producer/consumer queue. See module docs.
#[derive(Default)]
pub struct RollingBuffer {
    state: Mutex<State>,
    cond: Condvar,
}

impl RollingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().unwrap().queue.is_empty()
    }

    // ---- Producer side ------------------------------------------------

    /// Block until there is room for one more chunk, or a control flag
    /// interrupts the wait.
    pub fn wait_writable(&self) -> BufferSignal {
        let mut st = self.state.lock().unwrap();
        while st.queue.len() >= MAX_BUFFERED_CHUNKS && !st.stop && st.seek.is_none() {
            st = self.cond.wait(st).unwrap();
        }
        if st.stop {
            BufferSignal::Stopped
        } else if st.seek.is_some() {
            BufferSignal::SeekPending
        } else {
            BufferSignal::Ready
        }
    }

    /// Append a chunk, blocking while the buffer is full.
    ///
    /// Returns [`BufferSignal::Ready`] once the chunk is queued. Refuses
    /// the chunk when a stop or seek arrived in the meantime, since a
    /// post-seek queue must start at the seek target.
    pub fn push(&self, chunk: BufferedChunk) -> BufferSignal {
        let mut st = self.state.lock().unwrap();
        while st.queue.len() >= MAX_BUFFERED_CHUNKS && !st.stop && st.seek.is_none() {
            st = self.cond.wait(st).unwrap();
        }
        if st.stop {
            return BufferSignal::Stopped;
        }
        if st.seek.is_some() {
            return BufferSignal::SeekPending;
        }

        debug_assert!(
            st.queue.back().map_or(true, |back| back.index + 1 == chunk.index),
            "chunk indices must be contiguous"
        );

        st.queue.push_back(Entry {
            index: chunk.index,
            data: chunk.data,
            cursor: 0,
        });
        self.cond.notify_all();
        BufferSignal::Ready
    }

    /// Record that the producer reached end-of-file.
    pub fn mark_eof(&self) {
        let mut st = self.state.lock().unwrap();
        st.eof = true;
        self.cond.notify_all();
    }

    /// Park the producer after EOF until a seek or stop arrives.
    pub fn wait_for_work(&self) {
        let mut st = self.state.lock().unwrap();
        while !st.stop && st.seek.is_none() {
            st = self.cond.wait(st).unwrap();
        }
    }

    /// Claim the pending seek request, clearing it and the EOF flag.
    pub fn take_seek_request(&self) -> Option<SeekRequest> {
        let mut st = self.state.lock().unwrap();
        let req = st.seek.take();
        if req.is_some() {
            st.eof = false;
        }
        req
    }

    // ---- Consumer side ------------------------------------------------

    /// Copy bytes from the front of the queue without blocking.
    ///
    /// Advances the front entry's cursor, pops exhausted entries and
    /// notifies the producer of freed space. May span several entries.
    /// Returns the number of bytes copied, zero when drained.
    pub fn read_front(&self, dst: &mut [u8]) -> usize {
        let mut st = self.state.lock().unwrap();
        let mut copied = 0;
        let mut popped = false;

        while copied < dst.len() {
            let Some(front) = st.queue.front_mut() else {
                break;
            };
            let available = front.data.len() - front.cursor;
            let take = available.min(dst.len() - copied);
            dst[copied..copied + take]
                .copy_from_slice(&front.data[front.cursor..front.cursor + take]);
            front.cursor += take;
            copied += take;

            if front.cursor >= front.data.len() {
                st.queue.pop_front();
                popped = true;
            }
        }

        if popped {
            self.cond.notify_all();
        }
        copied
    }

    /// Remove and return the front chunk whole, ignoring its cursor.
    pub fn pop_front(&self) -> Option<BufferedChunk> {
        let mut st = self.state.lock().unwrap();
        let entry = st.queue.pop_front()?;
        self.cond.notify_all();
        Some(BufferedChunk {
            index: entry.index,
            data: entry.data,
        })
    }

    /// Index of the front chunk, if any.
    pub fn peek_front_index(&self) -> Option<u32> {
        self.state.lock().unwrap().queue.front().map(|e| e.index)
    }

    /// Front chunk index and read cursor, the consumer's stream position.
    pub fn front_position(&self) -> Option<(u32, usize)> {
        self.state
            .lock()
            .unwrap()
            .queue
            .front()
            .map(|e| (e.index, e.cursor))
    }

    /// Inclusive range of buffered chunk indices.
    pub fn buffered_range(&self) -> Option<(u32, u32)> {
        let st = self.state.lock().unwrap();
        match (st.queue.front(), st.queue.back()) {
            (Some(front), Some(back)) => Some((front.index, back.index)),
            _ => None,
        }
    }

    /// Block up to `timeout` for the queue to become non-empty.
    ///
    /// Also wakes on stop, seek or producer EOF. Returns whether data
    /// was available when the wait ended.
    pub fn wait_nonempty(&self, timeout: Duration) -> bool {
        let st = self.state.lock().unwrap();
        let (st, _) = self
            .cond
            .wait_timeout_while(st, timeout, |st| {
                st.queue.is_empty() && !st.stop && st.seek.is_none() && !st.eof
            })
            .unwrap();
        !st.queue.is_empty()
    }

    /// Fast-path seek: if `chunk` is already buffered, drop everything
    /// before it and place the cursor at `offset` (clamped to the entry
    /// length). No producer involvement. Returns whether it applied.
    pub fn seek_within(&self, chunk: u32, offset: usize) -> bool {
        let mut st = self.state.lock().unwrap();

        let in_range = match (st.queue.front(), st.queue.back()) {
            (Some(front), Some(back)) => chunk >= front.index && chunk <= back.index,
            _ => false,
        };
        if !in_range {
            return false;
        }

        while st.queue.front().is_some_and(|e| e.index < chunk) {
            st.queue.pop_front();
        }
        if let Some(front) = st.queue.front_mut() {
            front.cursor = offset.min(front.data.len());
        }
        self.cond.notify_all();
        true
    }

    /// Slow-path seek: clear the queue and hand the target to the
    /// producer. All waiters wake.
    pub fn request_seek(&self, chunk: u32) {
        let mut st = self.state.lock().unwrap();
        st.seek = Some(SeekRequest { chunk });
        st.eof = false;
        st.queue.clear();
        self.cond.notify_all();
    }

    /// Block up to `timeout` for the producer to place `chunk` at the
    /// front after a slow-path seek. False on stop or timeout.
    pub fn wait_for_chunk(&self, chunk: u32, timeout: Duration) -> bool {
        let st = self.state.lock().unwrap();
        let (st, _) = self
            .cond
            .wait_timeout_while(st, timeout, |st| {
                !st.stop && st.queue.front().map(|e| e.index) != Some(chunk)
            })
            .unwrap();
        st.queue.front().map(|e| e.index) == Some(chunk)
    }

    // ---- Control flags ------------------------------------------------

    /// Request shutdown. Idempotent; wakes every waiter.
    pub fn request_stop(&self) {
        let mut st = self.state.lock().unwrap();
        st.stop = true;
        self.cond.notify_all();
    }

    pub fn stop_requested(&self) -> bool {
        self.state.lock().unwrap().stop
    }

    pub fn seek_pending(&self) -> bool {
        self.state.lock().unwrap().seek.is_some()
    }

    /// True once the producer hit end-of-file and the queue is drained.
    pub fn at_end(&self) -> bool {
        let st = self.state.lock().unwrap();
        st.eof && st.queue.is_empty() && st.seek.is_none()
    }

    /// Drop all buffered entries.
    pub fn clear(&self) {
        let mut st = self.state.lock().unwrap();
        st.queue.clear();
        self.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    fn chunk(index: u32, len: usize) -> BufferedChunk {
        BufferedChunk {
            index,
            data: vec![index as u8; len],
        }
    }

    #[test]
    fn push_blocks_at_capacity_until_consumer_pops() {
        let buffer = Arc::new(RollingBuffer::new());
        for i in 0..MAX_BUFFERED_CHUNKS {
            assert_eq!(buffer.push(chunk(i as u32, 8)), BufferSignal::Ready);
        }
        assert_eq!(buffer.len(), MAX_BUFFERED_CHUNKS);

        let producer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || buffer.push(chunk(MAX_BUFFERED_CHUNKS as u32, 8)))
        };

        // Give the producer a moment to block, then free one slot.
        thread::sleep(Duration::from_millis(50));
        assert_eq!(buffer.len(), MAX_BUFFERED_CHUNKS);
        buffer.pop_front().unwrap();

        assert_eq!(producer.join().unwrap(), BufferSignal::Ready);
        assert!(buffer.len() <= MAX_BUFFERED_CHUNKS);
    }

    #[test]
    fn stop_interrupts_a_blocked_producer() {
        let buffer = Arc::new(RollingBuffer::new());
        for i in 0..MAX_BUFFERED_CHUNKS {
            buffer.push(chunk(i as u32, 1));
        }

        let producer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || buffer.push(chunk(MAX_BUFFERED_CHUNKS as u32, 1)))
        };
        thread::sleep(Duration::from_millis(50));
        buffer.request_stop();

        assert_eq!(producer.join().unwrap(), BufferSignal::Stopped);
    }

    #[test]
    fn read_front_spans_entries_and_notifies_pops() {
        let buffer = RollingBuffer::new();
        buffer.push(chunk(0, 4));
        buffer.push(chunk(1, 4));

        let mut out = [0u8; 6];
        assert_eq!(buffer.read_front(&mut out), 6);
        assert_eq!(&out, &[0, 0, 0, 0, 1, 1]);
        assert_eq!(buffer.front_position(), Some((1, 2)));

        let mut rest = [0u8; 8];
        assert_eq!(buffer.read_front(&mut rest), 2);
        assert!(buffer.is_empty());
        assert_eq!(buffer.read_front(&mut rest), 0);
    }

    #[test]
    fn wait_nonempty_times_out_when_idle() {
        let buffer = RollingBuffer::new();
        let started = Instant::now();
        assert!(!buffer.wait_nonempty(Duration::from_millis(100)));
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn wait_nonempty_wakes_on_push() {
        let buffer = Arc::new(RollingBuffer::new());
        let waiter = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || buffer.wait_nonempty(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(30));
        buffer.push(chunk(0, 1));
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn wait_nonempty_wakes_promptly_on_stop() {
        let buffer = Arc::new(RollingBuffer::new());
        let waiter = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                let started = Instant::now();
                let got = buffer.wait_nonempty(Duration::from_secs(5));
                (got, started.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(30));
        buffer.request_stop();
        let (got, waited) = waiter.join().unwrap();
        assert!(!got);
        assert!(waited < Duration::from_secs(1));
    }

    #[test]
    fn seek_within_pops_preceding_and_sets_cursor() {
        let buffer = RollingBuffer::new();
        for i in 3..=7 {
            buffer.push(chunk(i, 100));
        }

        assert!(buffer.seek_within(4, 42));
        assert_eq!(buffer.front_position(), Some((4, 42)));
        assert_eq!(buffer.buffered_range(), Some((4, 7)));
    }

    #[test]
    fn seek_within_refuses_targets_outside_the_buffered_range() {
        let buffer = RollingBuffer::new();
        for i in 3..=7 {
            buffer.push(chunk(i, 100));
        }

        assert!(!buffer.seek_within(2, 0));
        assert!(!buffer.seek_within(8, 0));
        assert_eq!(buffer.buffered_range(), Some((3, 7)));
    }

    #[test]
    fn seek_within_clamps_cursor_to_entry_length() {
        let buffer = RollingBuffer::new();
        buffer.push(chunk(0, 10));
        assert!(buffer.seek_within(0, 500));
        assert_eq!(buffer.front_position(), Some((0, 10)));
    }

    #[test]
    fn request_seek_clears_queue_and_hands_target_to_producer() {
        let buffer = RollingBuffer::new();
        for i in 0..5 {
            buffer.push(chunk(i, 8));
        }
        buffer.mark_eof();

        buffer.request_seek(9);
        assert!(buffer.is_empty());
        assert!(buffer.seek_pending());
        assert!(!buffer.at_end());

        assert_eq!(buffer.take_seek_request(), Some(SeekRequest { chunk: 9 }));
        assert!(!buffer.seek_pending());
        assert_eq!(buffer.take_seek_request(), None);
    }

    #[test]
    fn wait_for_chunk_succeeds_when_producer_delivers() {
        let buffer = Arc::new(RollingBuffer::new());
        buffer.request_seek(5);

        let producer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                let req = buffer.take_seek_request().unwrap();
                thread::sleep(Duration::from_millis(30));
                buffer.push(chunk(req.chunk, 8));
            })
        };

        assert!(buffer.wait_for_chunk(5, Duration::from_secs(3)));
        producer.join().unwrap();
    }

    #[test]
    fn wait_for_chunk_times_out_without_producer() {
        let buffer = RollingBuffer::new();
        buffer.request_seek(5);
        assert!(!buffer.wait_for_chunk(5, Duration::from_millis(100)));
    }

    #[test]
    fn consumer_observes_strictly_increasing_indices() {
        let buffer = Arc::new(RollingBuffer::new());
        let producer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                for i in 0..50 {
                    assert_eq!(buffer.push(chunk(i, 16)), BufferSignal::Ready);
                }
                buffer.mark_eof();
            })
        };

        let mut seen = Vec::new();
        loop {
            if let Some(c) = buffer.pop_front() {
                seen.push(c.index);
            } else if buffer.at_end() {
                break;
            } else {
                buffer.wait_nonempty(Duration::from_millis(200));
            }
        }
        producer.join().unwrap();

        assert_eq!(seen.len(), 50);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }
}
