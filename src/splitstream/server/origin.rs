use std::sync::Arc;

use bytes::BytesMut;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::splitstream::cache::CacheEntry;
use crate::splitstream::common::{Error, Result};
use crate::splitstream::config::conf;
use crate::splitstream::http::{is_response_200, HttpStatus, Url};
use crate::splitstream::server::{io, producer};

/// What came of starting a download inside the directory's critical section.
/// Everything that still has to talk to the requesting client is deferred to
/// the caller, after the directory lock is gone.
pub enum FetchOutcome {
    /// 200 response: the entry already holds the response head and a detached
    /// producer owns the origin socket.
    Cached(Arc<CacheEntry>),
    /// Non-200 response: forward head and body transparently, cache nothing.
    Uncached { origin: TcpStream, head: BytesMut },
    /// The origin couldn't be fetched; report `status` to the client.
    Failed {
        status: HttpStatus,
        message: &'static str,
    },
}

/// Dials host:port. Resolution and connect together are bounded by the socket
/// timeout.
pub async fn connect(host: &str, port: u16) -> Result<TcpStream> {
    debug!(host, port, "connecting to origin");
    match timeout(conf().socket_timeout(), TcpStream::connect((host, port))).await {
        Ok(result) => result.map_err(Error::from),
        Err(_) => Err(Error::timeout()),
    }
}

/// The cache-miss starter: fetch response headers from the origin and decide
/// whether this URL is cacheable. On a 200 the returned entry already contains
/// the head bytes and a producer task is downloading the rest.
pub async fn start_fetch(
    url_key: &str,
    url: &Url,
    request: &[u8],
) -> (Option<Arc<CacheEntry>>, FetchOutcome) {
    let mut origin = match connect(url.host(), url.port()).await {
        Ok(sock) => sock,
        Err(e) => {
            warn!(%e, host = url.host(), "failed to connect to origin");
            return (
                None,
                FetchOutcome::Failed {
                    status: HttpStatus::BadGateway,
                    message: "Failed to connect",
                },
            );
        }
    };

    if let Err(e) = io::write_all(&mut origin, request).await {
        warn!(%e, "failed to send request to origin");
        return (
            None,
            FetchOutcome::Failed {
                status: HttpStatus::BadGateway,
                message: "Failed to send request",
            },
        );
    }

    let mut head = BytesMut::with_capacity(conf().recv_buffer_size());
    match io::recv_until_header_end(&mut origin, &mut head).await {
        Ok(n) if n > 0 => {}
        Ok(_) => {
            warn!("origin closed before sending response headers");
            return (
                None,
                FetchOutcome::Failed {
                    status: HttpStatus::BadGateway,
                    message: "Failed to receive response",
                },
            );
        }
        Err(e) => {
            warn!(%e, "failed to receive response headers");
            return (
                None,
                FetchOutcome::Failed {
                    status: HttpStatus::BadGateway,
                    message: "Failed to receive response",
                },
            );
        }
    }

    if !is_response_200(&head) {
        debug!(url = url_key, "response is not 200 OK, forwarding without caching");
        return (None, FetchOutcome::Uncached { origin, head });
    }

    debug!(url = url_key, "response is 200 OK, starting cached download");
    let (entry, mut writer) = CacheEntry::new(url_key, conf().chunk_size());
    if let Err(e) = writer.append(&head) {
        warn!(%e, "failed to cache response headers");
        return (
            None,
            FetchOutcome::Failed {
                status: HttpStatus::InternalServerError,
                message: "Cache allocation failed",
            },
        );
    }
    producer::spawn(writer, origin);
    (Some(entry.clone()), FetchOutcome::Cached(entry))
}
