use std::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};
use std::sync::atomic::{AtomicPtr, AtomicU8, AtomicUsize};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::splitstream::cache::{CacheStatus, Chunk};
use crate::splitstream::common::Result;

/// One cached response: the URL it's keyed by, an append-only chunk list, and
/// the download status. The producer appends through the entry's single
/// CacheWriter; any number of consumers walk the chunk list concurrently
/// without taking a lock, suspending on `progress` when they catch up.
///
/// Everyone holds the entry behind an Arc (the directory, the producer, each
/// consumer), so chunks stay valid for as long as anyone can reach them no
/// matter what order things shut down in.
pub struct CacheEntry {
    url: String,
    chunk_size: usize,
    head: AtomicPtr<Chunk>,
    tail: AtomicPtr<Chunk>,
    downloaded: AtomicUsize,
    status: AtomicU8,
    progress: Notify,
}

impl CacheEntry {
    /// Creates the entry and its one write handle. There is no other way to
    /// get a CacheWriter, which is what keeps producers unique per entry.
    pub fn new(url: &str, chunk_size: usize) -> (Arc<CacheEntry>, CacheWriter) {
        let entry = Arc::new(CacheEntry {
            url: url.to_string(),
            chunk_size,
            head: AtomicPtr::default(),
            tail: AtomicPtr::default(),
            downloaded: AtomicUsize::new(0),
            status: AtomicU8::new(CacheStatus::InProcess as u8),
            progress: Notify::new(),
        });
        let writer = CacheWriter {
            entry: entry.clone(),
            finished: false,
        };
        (entry, writer)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> CacheStatus {
        CacheStatus::from_u8(self.status.load(Acquire))
    }

    /// Total bytes appended so far. Grows while the download runs.
    pub fn downloaded(&self) -> usize {
        self.downloaded.load(Relaxed)
    }

    pub fn head_chunk(&self) -> Option<&Chunk> {
        let p = self.head.load(Acquire);
        if p.is_null() {
            None
        } else {
            // Safety: chunks are only freed when the entry drops, which
            // outlives this borrow
            Some(unsafe { &*p })
        }
    }

    /// Waits until the first chunk is published or the entry fails without
    /// producing any data. None means the download failed before the first byte.
    pub async fn first_chunk(&self) -> Option<&Chunk> {
        loop {
            let notified = self.progress.notified();
            tokio::pin!(notified);
            // register before checking, so a wake between the check and the
            // await below isn't lost
            notified.as_mut().enable();
            if let Some(head) = self.head_chunk() {
                return Some(head);
            }
            if self.status() == CacheStatus::Failed {
                return None;
            }
            notified.await;
        }
    }

    /// Waits while the download is still running AND chunk has no successor
    /// AND no bytes past `sent` have been published. Returns as soon as any of
    /// the three stops holding. Nothing is latched; callers re-read the state.
    pub async fn wait_progress(&self, chunk: &Chunk, sent: usize) {
        loop {
            let notified = self.progress.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.status() != CacheStatus::InProcess
                || chunk.next().is_some()
                || chunk.filled() != sent
            {
                return;
            }
            notified.await;
        }
    }

    fn tail_chunk(&self) -> Option<&Chunk> {
        // Relaxed: only the writer reads the tail
        let p = self.tail.load(Relaxed);
        if p.is_null() {
            None
        } else {
            // Safety: see head_chunk
            Some(unsafe { &*p })
        }
    }

    /// First InProcess -> terminal transition wins and wakes all waiters;
    /// anything after that is a no-op.
    fn try_finalize(&self, status: CacheStatus) {
        debug_assert!(status != CacheStatus::InProcess);
        if self
            .status
            .compare_exchange(CacheStatus::InProcess as u8, status as u8, AcqRel, Acquire)
            .is_ok()
        {
            self.progress.notify_waiters();
        }
    }
}

impl Drop for CacheEntry {
    fn drop(&mut self) {
        // Free the list iteratively; a chunk doesn't own its successor.
        let mut p = *self.head.get_mut();
        while !p.is_null() {
            // Safety: every pointer in the list came from Box::into_raw in push_chunk
            let mut chunk = unsafe { Box::from_raw(p) };
            p = chunk.take_next();
        }
    }
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("url", &self.url)
            .field("status", &self.status())
            .field("downloaded", &self.downloaded())
            .finish()
    }
}

/// The write half of a cache entry. Exactly one exists per entry; it is not
/// clonable. Dropping it without finalizing marks the entry Failed so readers
/// can't wait forever on a producer that died.
pub struct CacheWriter {
    entry: Arc<CacheEntry>,
    finished: bool,
}

impl CacheWriter {
    pub fn entry(&self) -> &Arc<CacheEntry> {
        &self.entry
    }

    /// Appends src to the entry, allocating and linking chunks as needed, and
    /// wakes all waiting consumers. Appending nothing is a no-op. If a chunk
    /// allocation fails the entry is finalized Failed, waiters are woken, and
    /// the error is returned.
    pub fn append(&mut self, src: &[u8]) -> Result<()> {
        if src.is_empty() {
            return Ok(());
        }
        debug_assert_eq!(self.entry.status(), CacheStatus::InProcess);
        match self.fill(src) {
            Ok(()) => {
                self.entry.downloaded.fetch_add(src.len(), Relaxed);
                self.entry.progress.notify_waiters();
                Ok(())
            }
            Err(e) => {
                // whatever was copied before the failed allocation stays
                // published; the Failed status tells readers not to expect more
                self.finished = true;
                self.entry.try_finalize(CacheStatus::Failed);
                Err(e)
            }
        }
    }

    fn fill(&self, mut src: &[u8]) -> Result<()> {
        let entry = &*self.entry;
        let mut tail = match entry.tail_chunk() {
            Some(tail) => tail,
            None => Self::push_chunk(entry)?,
        };
        loop {
            let n = tail.write(src);
            src = &src[n..];
            if src.is_empty() {
                return Ok(());
            }
            tail = Self::push_chunk(entry)?;
        }
    }

    fn push_chunk(entry: &CacheEntry) -> Result<&Chunk> {
        let chunk = Chunk::new(entry.chunk_size)?;
        let raw = Box::into_raw(chunk);
        let prev = entry.tail.load(Relaxed);
        if prev.is_null() {
            // publishing head is what wakes consumers out of first_chunk
            entry.head.store(raw, Release);
        } else {
            // Safety: prev stays valid until the entry drops
            unsafe { (*prev).link(raw) };
        }
        entry.tail.store(raw, Relaxed);
        // Safety: raw is valid until the entry drops, and the borrow can't outlive entry
        Ok(unsafe { &*raw })
    }

    /// Ends the download. The first terminal status sticks; waiters are woken.
    pub fn finalize(mut self, status: CacheStatus) {
        self.finished = true;
        self.entry.try_finalize(status);
    }
}

impl Drop for CacheWriter {
    fn drop(&mut self) {
        if !self.finished {
            self.entry.try_finalize(CacheStatus::Failed);
        }
    }
}
