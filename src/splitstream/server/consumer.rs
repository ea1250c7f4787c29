use tokio::io::AsyncWrite;
use tracing::debug;

use crate::splitstream::cache::{CacheEntry, CacheStatus};
use crate::splitstream::common::{Error, Result};
use crate::splitstream::server::io;

/// Streams a cache entry to a client from byte 0, following the chunk list as
/// the producer grows it. Every consumer of an entry emits the same byte
/// sequence in the same order, however late it attached.
///
/// Returns the bytes written alongside the result, so the caller can tell a
/// client that got nothing from one that was cut off mid-stream.
pub async fn stream_entry<W: AsyncWrite + Unpin>(
    client: &mut W,
    entry: &CacheEntry,
) -> (u64, Result<()>) {
    let mut chunk = match entry.first_chunk().await {
        Some(chunk) => chunk,
        None => {
            return (0, Err(Error::new("cache entry failed before any data arrived")));
        }
    };
    let mut sent_total = 0u64;
    let mut sent = 0usize;
    loop {
        let status = entry.status();
        if status == CacheStatus::Failed {
            return (sent_total, Err(Error::new("cache entry failed during send")));
        }
        // next is loaded before filled: a successor only exists once this chunk
        // is full, and seeing it (Acquire) makes the final filled count visible,
        // so advancing below can never skip bytes.
        let next = chunk.next();
        let available = chunk.filled();
        if sent < available {
            if let Err(e) = io::write_all(client, chunk.bytes(sent, available)).await {
                debug!(%e, "client went away mid-stream");
                return (sent_total, Err(e));
            }
            sent_total += (available - sent) as u64;
            sent = available;
            continue;
        }
        if let Some(next) = next {
            chunk = next;
            sent = 0;
            continue;
        }
        if status != CacheStatus::InProcess {
            // the terminal status was read before filled, so nothing was
            // appended after what we've already sent
            return (sent_total, Ok(()));
        }
        entry.wait_progress(chunk, sent).await;
    }
}
