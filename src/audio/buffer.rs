//! Mutex-guarded byte ring buffer between the network and render threads
//!
//! Two cursors plus an explicit `available` counter; the counter is the sole
//! source of truth for how much is readable, since equal cursors alone cannot
//! distinguish a full buffer from an empty one. The single mutex is held only
//! for cursor arithmetic and at most two contiguous copies per operation.
//! The read side runs on the hardware's real-time thread, so nothing that
//! can stall (I/O, allocation) is allowed inside the lock.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

struct RingInner {
    storage: Box<[u8]>,
    read_pos: usize,
    write_pos: usize,
    /// Bytes currently holding unread data, always in `0..=capacity`
    available: usize,
}

/// Fixed-capacity byte ring buffer for PCM data
///
/// Written by the ingestion thread, drained by the render callback. Writes
/// clamp to free space (overflow is counted, never corrupting); reads are
/// all-or-nothing so the render path either gets a full span or substitutes
/// silence.
pub struct RingBuffer {
    inner: Mutex<RingInner>,
    capacity: usize,
    overflow_count: AtomicUsize,
}

impl RingBuffer {
    /// Create a new ring buffer with the specified capacity in bytes
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            inner: Mutex::new(RingInner {
                storage: vec![0u8; capacity].into_boxed_slice(),
                read_pos: 0,
                write_pos: 0,
                available: 0,
            }),
            capacity,
            overflow_count: AtomicUsize::new(0),
        }
    }

    /// Write bytes into the buffer, clamping to the free space
    ///
    /// Returns the number of bytes actually written. A clamped write is an
    /// overflow event: the excess is discarded and the overflow counter is
    /// incremented. Never blocks, never grows the buffer.
    pub fn write(&self, bytes: &[u8]) -> usize {
        let mut inner = self.inner.lock();

        let free = self.capacity - inner.available;
        let to_write = bytes.len().min(free);
        if to_write < bytes.len() {
            self.overflow_count.fetch_add(1, Ordering::Relaxed);
        }
        if to_write == 0 {
            return 0;
        }

        let write_pos = inner.write_pos;
        if write_pos + to_write > self.capacity {
            // Span crosses the end of the storage: copy in two chunks
            let first = self.capacity - write_pos;
            inner.storage[write_pos..].copy_from_slice(&bytes[..first]);
            inner.storage[..to_write - first].copy_from_slice(&bytes[first..to_write]);
        } else {
            inner.storage[write_pos..write_pos + to_write].copy_from_slice(&bytes[..to_write]);
        }

        inner.write_pos = (write_pos + to_write) % self.capacity;
        inner.available += to_write;
        to_write
    }

    /// Read exactly `out.len()` bytes into `out`, or nothing at all
    ///
    /// Returns `false` without touching any state when fewer than
    /// `out.len()` bytes are available. The caller decides what
    /// "insufficient" means (pre-roll wait or underrun silence).
    pub fn read_into(&self, out: &mut [u8]) -> bool {
        let n = out.len();
        let mut inner = self.inner.lock();

        if inner.available < n {
            return false;
        }
        if n == 0 {
            return true;
        }

        let read_pos = inner.read_pos;
        if read_pos + n > self.capacity {
            let first = self.capacity - read_pos;
            out[..first].copy_from_slice(&inner.storage[read_pos..]);
            out[first..].copy_from_slice(&inner.storage[..n - first]);
        } else {
            out.copy_from_slice(&inner.storage[read_pos..read_pos + n]);
        }

        inner.read_pos = (read_pos + n) % self.capacity;
        inner.available -= n;
        true
    }

    /// Bytes currently buffered and unread
    pub fn available(&self) -> usize {
        self.inner.lock().available
    }

    /// Get buffer capacity in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of writes that had to be clamped
    pub fn overflow_count(&self) -> usize {
        self.overflow_count.load(Ordering::Relaxed)
    }

    /// Get fill level as a fraction of capacity
    pub fn fill_level(&self) -> f32 {
        self.available() as f32 / self.capacity as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let ring = RingBuffer::new(64);
        let data: Vec<u8> = (0..48).collect();

        assert_eq!(ring.write(&data), 48);
        assert_eq!(ring.available(), 48);

        let mut out = vec![0u8; 48];
        assert!(ring.read_into(&mut out));
        assert_eq!(out, data);
        assert_eq!(ring.available(), 0);
    }

    #[test]
    fn read_is_all_or_nothing() {
        let ring = RingBuffer::new(16);
        ring.write(&[1, 2, 3, 4]);

        let mut out = [0u8; 8];
        assert!(!ring.read_into(&mut out));
        // Failed read must not consume anything
        assert_eq!(ring.available(), 4);

        let mut out = [0u8; 4];
        assert!(ring.read_into(&mut out));
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn overflow_clamps_and_counts() {
        // The 16-byte worked example: 12 in, then 8 more clamps to 4
        let ring = RingBuffer::new(16);
        assert_eq!(ring.write(&[0xaa; 12]), 12);
        assert_eq!(ring.write(&[0xbb; 8]), 4);
        assert_eq!(ring.available(), 16);
        assert_eq!(ring.overflow_count(), 1);

        // Completely full: further writes are zero-length clamps
        assert_eq!(ring.write(&[0xcc; 1]), 0);
        assert_eq!(ring.overflow_count(), 2);
        assert_eq!(ring.available(), 16);
    }

    #[test]
    fn wraparound_round_trip() {
        let ring = RingBuffer::new(16);

        // Advance the cursors to near the end of the storage
        ring.write(&[0u8; 12]);
        let mut sink = [0u8; 12];
        assert!(ring.read_into(&mut sink));

        // This write crosses the end and wraps
        let data: Vec<u8> = (100..110).collect();
        assert_eq!(ring.write(&data), 10);

        let mut out = vec![0u8; 10];
        assert!(ring.read_into(&mut out));
        assert_eq!(out, data);
    }

    #[test]
    fn zero_length_ops_are_noops() {
        let ring = RingBuffer::new(8);
        assert_eq!(ring.write(&[]), 0);
        assert_eq!(ring.overflow_count(), 0);

        let mut empty = [0u8; 0];
        assert!(ring.read_into(&mut empty));
        assert_eq!(ring.available(), 0);
    }
}
