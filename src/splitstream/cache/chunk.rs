use std::alloc::{alloc, dealloc, Layout};
use std::ptr::NonNull;
use std::slice;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};
use std::sync::atomic::{AtomicPtr, AtomicUsize};

use crate::splitstream::common::{Error, Result};

/// A fixed-capacity segment of a cache entry's byte log.
///
/// Bytes below `filled` are immutable: the writer only appends past `filled`
/// and publishes them with a Release store of the new count, so a reader that
/// Acquire-loads `filled` can slice below it without any lock. `next` is
/// written at most once, when this chunk is full and a successor exists.
///
/// The buffer is allocated with the raw allocator so that allocation failure
/// is reportable (it fails the whole entry) instead of aborting the process.
pub struct Chunk {
    data: NonNull<u8>,
    capacity: usize,
    filled: AtomicUsize,
    next: AtomicPtr<Chunk>,
}

// Safety: the buffer is only written by the entry's single writer, always at
// offsets >= filled, and readers only touch offsets < an Acquire-loaded filled.
// Shared access therefore never overlaps a write.
unsafe impl Send for Chunk {}
unsafe impl Sync for Chunk {}

impl Chunk {
    pub fn new(capacity: usize) -> Result<Box<Chunk>> {
        assert!(capacity > 0);
        let layout = Layout::array::<u8>(capacity).map_err(|_| Error::low_mem())?;
        // Safety: layout has non-zero size, asserted above
        let data = match NonNull::new(unsafe { alloc(layout) }) {
            Some(p) => p,
            None => return Err(Error::low_mem()),
        };
        Ok(Box::new(Chunk {
            data,
            capacity,
            filled: AtomicUsize::new(0),
            next: AtomicPtr::default(),
        }))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// How many bytes have been published. Monotonic; a stale value is a safe
    /// lower bound on what's actually readable.
    pub fn filled(&self) -> usize {
        self.filled.load(Acquire)
    }

    pub fn next(&self) -> Option<&Chunk> {
        let p = self.next.load(Acquire);
        if p.is_null() {
            None
        } else {
            // Safety: successors are only freed when the owning entry drops,
            // which outlives any borrow of this chunk
            Some(unsafe { &*p })
        }
    }

    /// The published bytes in [from, to). `to` must not exceed filled().
    pub fn bytes(&self, from: usize, to: usize) -> &[u8] {
        debug_assert!(from <= to);
        assert!(to <= self.filled.load(Acquire));
        // Safety: everything below filled was published by a Release store and
        // is never written again
        unsafe { slice::from_raw_parts(self.data.as_ptr().add(from), to - from) }
    }

    /// Appends as much of src as fits, returning how many bytes were taken.
    /// Writer side only.
    pub(in crate::splitstream::cache) fn write(&self, src: &[u8]) -> usize {
        // Relaxed: only the single writer ever stores filled
        let filled = self.filled.load(Relaxed);
        let n = (self.capacity - filled).min(src.len());
        if n > 0 {
            // Safety: [filled, filled+n) is within capacity and not yet published to readers
            unsafe {
                std::ptr::copy_nonoverlapping(src.as_ptr(), self.data.as_ptr().add(filled), n);
            }
            // Release publishes the bytes copied above
            self.filled.store(filled + n, Release);
        }
        n
    }

    /// Links the successor chunk. Called once per chunk, by the writer, and
    /// only after this chunk is full.
    pub(in crate::splitstream::cache) fn link(&self, next: *mut Chunk) {
        debug_assert_eq!(self.filled.load(Relaxed), self.capacity);
        debug_assert!(self.next.load(Relaxed).is_null());
        self.next.store(next, Release);
    }

    pub(in crate::splitstream::cache) fn take_next(&mut self) -> *mut Chunk {
        *self.next.get_mut()
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        // Safety: data was allocated in new() with this exact size and align.
        // The successor is not ours to free, the entry walks the list itself.
        unsafe {
            dealloc(self.data.as_ptr(), Layout::from_size_align_unchecked(self.capacity, 1));
        }
    }
}
