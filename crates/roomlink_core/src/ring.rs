//! Lossy Ring Buffer
//!
//! Single-producer/single-consumer circular buffer of canonical int16
//! samples, shared between a network or capture thread and a real-time
//! playback callback.
//!
//! Two deliberate loss policies keep the real-time side moving:
//! - a write that would overflow silently overwrites the oldest samples,
//! - a read that finds too little data zero-pads the tail and consumes
//!   everything, so the playback callback never stalls.
//!
//! The mutex is held only across memcpy-sized critical sections.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

struct RingInner {
    buf: Box<[i16]>,
    write_pos: usize,
    read_pos: usize,
    /// Unread sample count. Invariant: `0 <= len <= buf.len()`.
    len: usize,
}

/// Fixed-capacity circular buffer of int16 samples.
pub struct RingBuffer {
    inner: Mutex<RingInner>,
    overwrites: AtomicU64,
}

impl RingBuffer {
    /// Create a ring holding up to `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be non-zero");
        Self {
            inner: Mutex::new(RingInner {
                buf: vec![0i16; capacity].into_boxed_slice(),
                write_pos: 0,
                read_pos: 0,
                len: 0,
            }),
            overwrites: AtomicU64::new(0),
        }
    }

    /// Append samples; the newest samples always survive.
    pub fn write(&self, samples: &[i16]) {
        if samples.is_empty() {
            return;
        }

        let mut inner = self.inner.lock();
        let cap = inner.buf.len();

        // A write larger than the ring reduces to its trailing window.
        let src = if samples.len() > cap {
            self.overwrites
                .fetch_add((samples.len() - cap) as u64, Ordering::Relaxed);
            &samples[samples.len() - cap..]
        } else {
            samples
        };
        let n = src.len();

        // Drop the oldest unread samples if this write would overflow.
        let free = cap - inner.len;
        if n > free {
            let dropped = n - free;
            inner.read_pos = (inner.read_pos + dropped) % cap;
            inner.len -= dropped;
            self.overwrites.fetch_add(dropped as u64, Ordering::Relaxed);
        }

        let write_pos = inner.write_pos;
        let first = (cap - write_pos).min(n);
        inner.buf[write_pos..write_pos + first].copy_from_slice(&src[..first]);
        if n > first {
            inner.buf[..n - first].copy_from_slice(&src[first..]);
        }

        inner.write_pos = (write_pos + n) % cap;
        inner.len += n;
    }

    /// Fill `out` completely; missing samples become zeros.
    ///
    /// When the ring holds fewer samples than requested, the available
    /// tail is returned, the remainder is zeroed, and the read position
    /// catches up to the write position.
    pub fn read_into(&self, out: &mut [i16]) {
        let mut inner = self.inner.lock();
        let cap = inner.buf.len();

        let available = inner.len.min(out.len());
        let read_pos = inner.read_pos;

        let first = (cap - read_pos).min(available);
        out[..first].copy_from_slice(&inner.buf[read_pos..read_pos + first]);
        if available > first {
            out[first..available].copy_from_slice(&inner.buf[..available - first]);
        }

        out[available..].fill(0);

        inner.read_pos = (read_pos + available) % cap;
        inner.len -= available;
    }

    /// Unread sample count.
    pub fn available(&self) -> usize {
        self.inner.lock().len
    }

    /// Total samples overwritten before being read.
    pub fn overwrites(&self) -> u64 {
        self.overwrites.load(Ordering::Relaxed)
    }

    /// Discard all unread samples.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.read_pos = inner.write_pos;
        inner.len = 0;
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let ring = RingBuffer::new(16);
        ring.write(&[1, 2, 3, 4]);
        assert_eq!(ring.available(), 4);

        let mut out = [0i16; 4];
        ring.read_into(&mut out);
        assert_eq!(out, [1, 2, 3, 4]);
        assert_eq!(ring.available(), 0);
    }

    #[test]
    fn test_short_read_zero_pads_and_drains() {
        let ring = RingBuffer::new(16);
        ring.write(&[5, 6]);

        let mut out = [99i16; 6];
        ring.read_into(&mut out);
        assert_eq!(out, [5, 6, 0, 0, 0, 0]);

        // Everything was consumed: the next read is all zeros until a write
        let mut again = [99i16; 4];
        ring.read_into(&mut again);
        assert_eq!(again, [0, 0, 0, 0]);

        ring.write(&[7]);
        let mut last = [99i16; 2];
        ring.read_into(&mut last);
        assert_eq!(last, [7, 0]);
    }

    #[test]
    fn test_overflow_keeps_newest() {
        let ring = RingBuffer::new(4);
        ring.write(&[1, 2, 3]);
        ring.write(&[4, 5, 6]);

        // Oldest samples (1, 2) were overwritten
        assert_eq!(ring.available(), 4);
        let mut out = [0i16; 4];
        ring.read_into(&mut out);
        assert_eq!(out, [3, 4, 5, 6]);
        assert_eq!(ring.overwrites(), 2);
    }

    #[test]
    fn test_write_larger_than_capacity() {
        let ring = RingBuffer::new(4);
        ring.write(&[1, 2, 3, 4, 5, 6, 7, 8, 9]);

        let mut out = [0i16; 4];
        ring.read_into(&mut out);
        assert_eq!(out, [6, 7, 8, 9]);
    }

    #[test]
    fn test_wraparound() {
        let ring = RingBuffer::new(8);
        ring.write(&[1, 2, 3, 4, 5, 6]);

        let mut out = [0i16; 4];
        ring.read_into(&mut out);
        assert_eq!(out, [1, 2, 3, 4]);

        // This write wraps past the end of the backing buffer
        ring.write(&[7, 8, 9, 10]);
        let mut rest = [0i16; 6];
        ring.read_into(&mut rest);
        assert_eq!(rest, [5, 6, 7, 8, 9, 10]);
    }

    #[test]
    fn test_unread_count_bounded_by_capacity() {
        let ring = RingBuffer::new(8);
        for i in 0..100 {
            ring.write(&[i as i16; 5]);
            assert!(ring.available() <= ring.capacity());
        }
    }

    #[test]
    fn test_clear() {
        let ring = RingBuffer::new(8);
        ring.write(&[1, 2, 3]);
        ring.clear();
        assert_eq!(ring.available(), 0);

        let mut out = [9i16; 3];
        ring.read_into(&mut out);
        assert_eq!(out, [0, 0, 0]);
    }

    #[test]
    fn test_empty_write_is_noop() {
        let ring = RingBuffer::new(8);
        ring.write(&[]);
        assert_eq!(ring.available(), 0);
        assert_eq!(ring.overwrites(), 0);
    }

    #[test]
    fn test_concurrent_producer_consumer() {
        use std::sync::Arc;

        let ring = Arc::new(RingBuffer::new(1024));
        let writer = Arc::clone(&ring);

        let handle = std::thread::spawn(move || {
            for i in 0..500i16 {
                writer.write(&[i; 8]);
            }
        });

        let mut out = [0i16; 64];
        for _ in 0..100 {
            ring.read_into(&mut out);
        }

        handle.join().unwrap();
        assert!(ring.available() <= ring.capacity());
    }
}
