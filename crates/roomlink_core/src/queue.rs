//! Drop-Oldest Frame Queue
//!
//! Bounded FIFO of audio frames for inter-thread hand-off, built on a
//! crossbeam bounded channel. `put` never blocks the producer: when the
//! queue is full the oldest frame is evicted so capture callbacks always
//! make progress. `get` blocks the consumer up to a timeout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::Frame;

/// Bounded frame queue with drop-oldest overflow semantics.
pub struct FrameQueue {
    tx: Sender<Frame>,
    rx: Receiver<Frame>,
    drops: AtomicU64,
}

impl FrameQueue {
    /// Create a queue holding up to `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            drops: AtomicU64::new(0),
        }
    }

    /// Enqueue a frame, evicting the oldest one when full.
    pub fn put(&self, frame: Frame) {
        match self.tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(frame)) => {
                // Evict the head and retry once. A concurrent consumer may
                // have drained in between, in which case the retry just
                // succeeds without eviction.
                if self.rx.try_recv().is_ok() {
                    self.drops.fetch_add(1, Ordering::Relaxed);
                }
                let _ = self.tx.try_send(frame);
            }
            // We hold both ends, so disconnection cannot happen.
            Err(TrySendError::Disconnected(_)) => unreachable!("queue holds its own receiver"),
        }
    }

    /// Dequeue a frame, waiting up to `timeout`.
    pub fn get(&self, timeout: Duration) -> Option<Frame> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Dequeue without waiting.
    pub fn try_get(&self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }

    /// Drain all queued frames.
    pub fn clear(&self) {
        while self.rx.try_recv().is_ok() {}
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Frames evicted due to overflow.
    pub fn drops(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let q = FrameQueue::new(4);
        q.put(vec![1]);
        q.put(vec![2]);
        q.put(vec![3]);

        assert_eq!(q.get(Duration::from_millis(10)), Some(vec![1]));
        assert_eq!(q.get(Duration::from_millis(10)), Some(vec![2]));
        assert_eq!(q.get(Duration::from_millis(10)), Some(vec![3]));
    }

    #[test]
    fn test_drop_oldest_when_full() {
        let q = FrameQueue::new(2);
        q.put(vec![1]);
        q.put(vec![2]);
        q.put(vec![3]);

        assert_eq!(q.len(), 2);
        assert_eq!(q.get(Duration::from_millis(10)), Some(vec![2]));
        assert_eq!(q.get(Duration::from_millis(10)), Some(vec![3]));
        assert_eq!(q.drops(), 1);
    }

    #[test]
    fn test_get_times_out_on_empty() {
        let q = FrameQueue::new(2);
        let started = std::time::Instant::now();
        assert_eq!(q.get(Duration::from_millis(30)), None);
        assert!(started.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn test_clear() {
        let q = FrameQueue::new(4);
        q.put(vec![1]);
        q.put(vec![2]);
        q.clear();
        assert!(q.is_empty());
        assert_eq!(q.get(Duration::from_millis(5)), None);
    }

    #[test]
    fn test_producer_never_blocks() {
        let q = FrameQueue::new(8);
        // Far more frames than capacity; must return promptly every time
        for i in 0..1000 {
            q.put(vec![i as i16]);
        }
        assert_eq!(q.len(), 8);
        assert_eq!(q.drops(), 992);
    }

    #[test]
    fn test_blocking_get_wakes_on_put() {
        use std::sync::Arc;

        let q = Arc::new(FrameQueue::new(4));
        let producer = Arc::clone(&q);

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            producer.put(vec![42]);
        });

        let frame = q.get(Duration::from_millis(500));
        assert_eq!(frame, Some(vec![42]));
        handle.join().unwrap();
    }
}
