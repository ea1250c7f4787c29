use std::future::Future;
use std::sync::Arc;

use fnv::FnvHashMap;
use tokio::sync::Mutex;

use crate::splitstream::cache::CacheEntry;

/// Outcome of a directory lookup. A miss carries whatever the starter produced.
pub enum Lookup<T> {
    Hit(Arc<CacheEntry>),
    Miss(T),
}

/// The URL -> entry map. Insertion only, no eviction: an entry lives until the
/// directory drops and the last producer/consumer lets go of its Arc.
pub struct CacheDirectory {
    entries: Mutex<FnvHashMap<String, Arc<CacheEntry>>>,
}

impl CacheDirectory {
    pub fn new() -> Self {
        CacheDirectory {
            entries: Mutex::new(FnvHashMap::default()),
        }
    }

    /// Returns the existing entry for url, or runs `start` and inserts the
    /// entry it returns (if any).
    ///
    /// The map lock is held across `start`. That is deliberate: it is the one
    /// point of serialization that makes a second concurrent request for the
    /// same URL wait here and then hit, instead of starting its own download.
    /// `start` talks to the origin but must never write to the requesting
    /// client; anything client-directed goes in the returned outcome and
    /// happens after the lock is released.
    pub async fn lookup_or_start<F, Fut, T>(&self, url: &str, start: F) -> Lookup<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = (Option<Arc<CacheEntry>>, T)>,
    {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get(url) {
            return Lookup::Hit(entry.clone());
        }
        let (entry, outcome) = start().await;
        if let Some(entry) = entry {
            entries.insert(url.to_string(), entry);
        }
        Lookup::Miss(outcome)
    }

    pub async fn get(&self, url: &str) -> Option<Arc<CacheEntry>> {
        self.entries.lock().await.get(url).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::splitstream::cache::CacheStatus;

    #[tokio::test]
    async fn test_second_lookup_hits() {
        let directory = CacheDirectory::new();
        let first = directory
            .lookup_or_start("http://o/p", || async {
                let (entry, writer) = CacheEntry::new("http://o/p", 8);
                writer.finalize(CacheStatus::Success);
                (Some(entry.clone()), entry)
            })
            .await;
        let started = match first {
            Lookup::Miss(entry) => entry,
            Lookup::Hit(_) => panic!("expected a miss on an empty directory"),
        };
        assert_eq!(directory.len().await, 1);

        let second = directory
            .lookup_or_start("http://o/p", || async { (None, "starter ran") })
            .await;
        match second {
            Lookup::Hit(entry) => assert!(Arc::ptr_eq(&entry, &started)),
            Lookup::Miss(ran) => panic!("expected a hit, but {}", ran),
        }
    }

    #[tokio::test]
    async fn test_uncacheable_miss_inserts_nothing() {
        let directory = CacheDirectory::new();
        let lookup = directory.lookup_or_start("http://o/p", || async { (None, 404) }).await;
        match lookup {
            Lookup::Miss(status) => assert_eq!(status, 404),
            Lookup::Hit(_) => panic!("expected a miss"),
        }
        assert_eq!(directory.len().await, 0);
        assert!(directory.get("http://o/p").await.is_none());
    }
}
