//! Lock-free ring buffer between the audio driver thread and the main thread
//!
//! Single producer (the cpal callback) and single consumer (the session on
//! the main thread). Cursors increase monotonically without bound; indexing
//! is modulo capacity. The producer publishes `write_pos` with release
//! ordering after copying data in, and the consumer acquires it before
//! reading, so the consumer always observes the bytes that a cursor update
//! covers. The mirror-image holds for `read_pos`.

use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Keeps the two cursors on separate cache lines.
#[repr(align(64))]
struct CacheAligned(AtomicUsize);

/// Lock-free single-producer single-consumer byte queue.
///
/// Shared via `Arc`: the capture callback writes, the session reads. The
/// SPSC discipline is a usage contract: at most one thread may call
/// [`write`](Self::write) and at most one may call the consuming operations
/// at any given time. [`reset`](Self::reset) is only safe while no producer
/// is active (the session resets before starting capture).
pub struct RingBuffer {
    buf: Box<[UnsafeCell<u8>]>,
    capacity: usize,
    write_pos: CacheAligned,
    read_pos: CacheAligned,
}

// The unsynchronized byte cells are only touched in the window between a
// cursor load and the matching cursor store, which the acquire/release pair
// orders across the two threads.
unsafe impl Send for RingBuffer {}
unsafe impl Sync for RingBuffer {}

impl RingBuffer {
    /// Create a buffer holding up to `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        let buf = (0..capacity).map(|_| UnsafeCell::new(0u8)).collect();
        Self {
            buf,
            capacity,
            write_pos: CacheAligned(AtomicUsize::new(0)),
            read_pos: CacheAligned(AtomicUsize::new(0)),
        }
    }

    /// Producer: append bytes, returning how many were written. Excess past
    /// the free space is dropped at the tail (a short write signals a slow
    /// consumer, not an error).
    pub fn write(&self, data: &[u8]) -> usize {
        let w = self.write_pos.0.load(Ordering::Relaxed);
        let r = self.read_pos.0.load(Ordering::Acquire);

        let free = self.capacity - w.wrapping_sub(r);
        let to_write = data.len().min(free);
        if to_write == 0 {
            return 0;
        }

        let offset = w % self.capacity;
        let first = to_write.min(self.capacity - offset);
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), self.buf[offset].get(), first);
            if first < to_write {
                ptr::copy_nonoverlapping(data.as_ptr().add(first), self.buf[0].get(), to_write - first);
            }
        }

        self.write_pos.0.store(w.wrapping_add(to_write), Ordering::Release);
        to_write
    }

    /// Consumer: drain up to `dst.len()` bytes from the head, returning how
    /// many were read.
    pub fn read(&self, dst: &mut [u8]) -> usize {
        let r = self.read_pos.0.load(Ordering::Relaxed);
        let w = self.write_pos.0.load(Ordering::Acquire);

        let avail = w.wrapping_sub(r);
        let to_read = dst.len().min(avail);
        if to_read == 0 {
            return 0;
        }

        let offset = r % self.capacity;
        let first = to_read.min(self.capacity - offset);
        unsafe {
            ptr::copy_nonoverlapping(self.buf[offset].get(), dst.as_mut_ptr(), first);
            if first < to_read {
                ptr::copy_nonoverlapping(self.buf[0].get(), dst.as_mut_ptr().add(first), to_read - first);
            }
        }

        self.read_pos.0.store(r.wrapping_add(to_read), Ordering::Release);
        to_read
    }

    /// Consumer: drain everything available as whole i16 samples. A trailing
    /// odd byte stays buffered for the next drain.
    pub fn drain_samples(&self) -> Vec<i16> {
        let r = self.read_pos.0.load(Ordering::Relaxed);
        let w = self.write_pos.0.load(Ordering::Acquire);

        let avail = w.wrapping_sub(r) & !1usize;
        if avail == 0 {
            return Vec::new();
        }

        let mut bytes = vec![0u8; avail];
        let n = self.read(&mut bytes);
        bytes.truncate(n);
        bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    }

    /// Bytes currently buffered.
    pub fn available(&self) -> usize {
        let w = self.write_pos.0.load(Ordering::Acquire);
        let r = self.read_pos.0.load(Ordering::Acquire);
        w.wrapping_sub(r)
    }

    /// Rearm both cursors. Only safe while no producer is active.
    pub fn reset(&self) {
        self.read_pos.0.store(0, Ordering::Relaxed);
        self.write_pos.0.store(0, Ordering::Relaxed);
    }

    /// Total buffer capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
