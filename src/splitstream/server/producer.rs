use bytes::BytesMut;
use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::splitstream::cache::{CacheStatus, CacheWriter};
use crate::splitstream::config::conf;
use crate::splitstream::server::io;

/// Spawns the detached download task for a cache entry. The writer was created
/// by the starter; this task is the entry's one producer.
pub fn spawn(writer: CacheWriter, origin: TcpStream) {
    tokio::spawn(run(writer, origin));
}

/// Reads the origin response until EOF and appends it to the cache entry.
/// There is no body framing: EOF finalizes Success, a read error or the socket
/// timeout finalizes Failed. The origin socket closes when it drops here,
/// whichever way we leave.
async fn run(mut writer: CacheWriter, mut origin: TcpStream) {
    let url = writer.entry().url().to_string();
    let mut buf = BytesMut::with_capacity(conf().recv_buffer_size());
    loop {
        buf.clear();
        match io::read_some(&mut origin, &mut buf).await {
            Ok(0) => {
                let downloaded = writer.entry().downloaded();
                writer.finalize(CacheStatus::Success);
                info!(url = %url, downloaded, "download completed");
                return;
            }
            Ok(_) => {
                if let Err(e) = writer.append(&buf) {
                    // append already marked the entry Failed and woke the readers
                    warn!(%e, url = %url, "failed to append to cache entry");
                    return;
                }
            }
            Err(e) => {
                warn!(%e, url = %url, "download failed");
                writer.finalize(CacheStatus::Failed);
                return;
            }
        }
    }
}
