//! Fixed-capacity circular byte buffer.
//!
//! Decouples the asynchronous arrival of bytes (a reader thread filling the
//! buffer) from synchronous consumption by the application. The buffer never
//! grows and never blocks: `add` silently accepts only what fits, `get`
//! returns only what is buffered.
//!
//! One storage slot is sacrificed to tell a full buffer from an empty one, so
//! the storage holds `capacity + 1` bytes and at most `capacity` of them are
//! ever buffered.

use std::sync::{Mutex, PoisonError};

use log::trace;

/// A circular byte store shared between one producer and one consumer.
#[derive(Debug)]
pub struct RingBuffer {
    inner: Mutex<Ring>,
}

#[derive(Debug)]
struct Ring {
    storage: Vec<u8>,
    /// Write index.
    head: usize,
    /// Read index.
    tail: usize,
}

impl Ring {
    fn slots(&self) -> usize {
        self.storage.len()
    }

    fn len(&self) -> usize {
        (self.head + self.slots() - self.tail) % self.slots()
    }

    fn free(&self) -> usize {
        self.slots() - 1 - self.len()
    }
}

impl RingBuffer {
    /// Create a ring buffer able to hold `capacity` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is `usize::MAX`: the extra storage slot would not
    /// be addressable.
    pub fn new(capacity: usize) -> Self {
        let slots = match capacity.checked_add(1) {
            Some(slots) => slots,
            None => panic!("ring buffer capacity overflow: {}", capacity),
        };
        RingBuffer {
            inner: Mutex::new(Ring {
                storage: vec![0; slots],
                head: 0,
                tail: 0,
            }),
        }
    }

    /// Maximum number of bytes that can be buffered.
    pub fn capacity(&self) -> usize {
        self.lock().slots() - 1
    }

    /// Number of bytes currently buffered.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of bytes that can still be added.
    pub fn free(&self) -> usize {
        self.lock().free()
    }

    /// Copy as much of `data` as fits into the buffer and return the number
    /// of bytes actually added.
    pub fn add(&self, data: &[u8]) -> usize {
        let mut ring = self.lock();
        let count = data.len().min(ring.free());
        if count == 0 {
            return 0;
        }

        let head = ring.head;
        let slots = ring.slots();
        let first = count.min(slots - head);
        ring.storage[head..head + first].copy_from_slice(&data[..first]);
        let rest = count - first;
        if rest > 0 {
            // The write straddles the end of the storage: continue at the
            // beginning.
            ring.storage[..rest].copy_from_slice(&data[first..count]);
        }
        ring.head = (head + count) % slots;

        trace!(
            "add({}) : {} bytes, head = {}, tail = {}",
            data.len(),
            count,
            ring.head,
            ring.tail
        );
        count
    }

    /// Move up to `buf.len()` buffered bytes into `buf` and return how many
    /// were moved. Returns 0 when the buffer is empty.
    pub fn get(&self, buf: &mut [u8]) -> usize {
        let mut ring = self.lock();
        let count = buf.len().min(ring.len());
        if count == 0 {
            return 0;
        }

        let tail = ring.tail;
        let slots = ring.slots();
        let first = count.min(slots - tail);
        buf[..first].copy_from_slice(&ring.storage[tail..tail + first]);
        let rest = count - first;
        if rest > 0 {
            buf[first..count].copy_from_slice(&ring.storage[..rest]);
        }
        ring.tail = (tail + count) % slots;

        trace!(
            "get({}) : {} bytes, head = {}, tail = {}",
            buf.len(),
            count,
            ring.head,
            ring.tail
        );
        count
    }

    /// Drop all buffered bytes. Storage is not zeroed.
    pub fn clear(&self) {
        let mut ring = self.lock();
        ring.head = 0;
        ring.tail = 0;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Ring> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_empty() {
        let ring = RingBuffer::new(8);
        assert_eq!(ring.capacity(), 8);
        assert_eq!(ring.len(), 0);
        assert_eq!(ring.free(), 8);
        assert!(ring.is_empty());
    }

    #[test]
    fn get_on_empty_returns_zero() {
        let ring = RingBuffer::new(4);
        let mut buf = [0u8; 4];
        assert_eq!(ring.get(&mut buf), 0);
    }

    #[test]
    fn add_then_get() {
        let ring = RingBuffer::new(8);
        assert_eq!(ring.add(b"hello"), 5);
        assert_eq!(ring.len(), 5);

        let mut buf = [0u8; 8];
        assert_eq!(ring.get(&mut buf), 5);
        assert_eq!(&buf[..5], b"hello");
        assert!(ring.is_empty());
    }

    #[test]
    fn add_is_bounded_by_free_space() {
        let ring = RingBuffer::new(4);
        assert_eq!(ring.add(b"abcdef"), 4);
        assert_eq!(ring.free(), 0);
        assert_eq!(ring.add(b"x"), 0);

        let mut buf = [0u8; 8];
        assert_eq!(ring.get(&mut buf), 4);
        assert_eq!(&buf[..4], b"abcd");
    }

    #[test]
    fn partial_get() {
        let ring = RingBuffer::new(8);
        ring.add(b"abcdef");
        let mut buf = [0u8; 2];
        assert_eq!(ring.get(&mut buf), 2);
        assert_eq!(&buf, b"ab");
        assert_eq!(ring.len(), 4);
    }

    #[test]
    fn wraps_around_the_end() {
        let ring = RingBuffer::new(5);
        let mut buf = [0u8; 8];

        ring.add(b"1234");
        assert_eq!(ring.get(&mut buf[..3]), 3);

        // head = 4, tail = 3: this write straddles the end of the storage.
        assert_eq!(ring.add(b"56789"), 4);
        assert_eq!(ring.len(), 5);
        assert_eq!(ring.free(), 0);

        let n = ring.get(&mut buf);
        assert_eq!(n, 5);
        assert_eq!(&buf[..n], b"45678");
    }

    #[test]
    fn clear_resets_indices() {
        let ring = RingBuffer::new(4);
        ring.add(b"abc");
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.free(), 4);

        let mut buf = [0u8; 4];
        assert_eq!(ring.get(&mut buf), 0);
    }

    #[test]
    #[should_panic(expected = "capacity overflow")]
    fn max_capacity_is_rejected() {
        RingBuffer::new(usize::MAX);
    }

    #[test]
    fn zero_capacity_accepts_nothing() {
        let ring = RingBuffer::new(0);
        assert_eq!(ring.add(b"abc"), 0);
        assert!(ring.is_empty());
    }
}
