use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::net::TcpStream;
use tracing::debug;

use crate::splitstream::cache::{CacheDirectory, CacheEntry, Lookup};
use crate::splitstream::common::{Error, Result};
use crate::splitstream::config::conf;
use crate::splitstream::http::{find_header_end, parse_absolute_url, HttpStatus, RequestLine, Url};
use crate::splitstream::server::connections::ConnectionGuard;
use crate::splitstream::server::origin::{self, FetchOutcome};
use crate::splitstream::server::{consumer, io};

/// Drives one client connection: read and parse the request head, then either
/// serve through the cache (GET) or forward transparently (everything else).
pub struct ClientConn {
    stream: TcpStream,
    directory: Arc<CacheDirectory>,
    _guard: ConnectionGuard,
}

impl ClientConn {
    pub fn new(stream: TcpStream, directory: Arc<CacheDirectory>, guard: ConnectionGuard) -> Self {
        Self {
            stream,
            directory,
            _guard: guard,
        }
    }

    /// Handles the connection. The client socket closes when self drops,
    /// whichever path this returns through.
    pub async fn run(mut self) -> Result<()> {
        let mut buf = BytesMut::with_capacity(conf().recv_buffer_size());
        match io::recv_until_header_end(&mut self.stream, &mut buf).await {
            Ok(n) if n > 0 && find_header_end(&buf).is_some() => {}
            _ => {
                io::send_error_response(&mut self.stream, HttpStatus::BadRequest, "Failed to read request").await;
                return Err(Error::new("failed to read request head"));
            }
        }
        // the request is forwarded to the origin verbatim, including any body
        // bytes that arrived with the head
        let request = buf.freeze();

        let (is_get, target) = match RequestLine::parse(&request) {
            Ok(line) => (line.is_get(), line.target.to_string()),
            Err(e) => {
                io::send_error_response(&mut self.stream, HttpStatus::BadRequest, "Invalid request format").await;
                return Err(e);
            }
        };

        let url = match parse_absolute_url(&target) {
            Ok(url) => url,
            Err(e) => {
                io::send_error_response(&mut self.stream, HttpStatus::BadRequest, "Invalid URL").await;
                return Err(e);
            }
        };

        if is_get {
            self.handle_get(&target, &url, request).await
        } else {
            self.handle_other(&url, request).await
        }
    }

    /// The cache path. The directory lock spans the starter, so any URL is
    /// fetched from the origin at most once no matter how many clients ask at
    /// the same moment; everything that writes to our client runs after the
    /// lock is released.
    async fn handle_get(&mut self, target: &str, url: &Url, request: Bytes) -> Result<()> {
        let directory = self.directory.clone();
        let lookup = directory
            .lookup_or_start(target, || origin::start_fetch(target, url, &request))
            .await;
        match lookup {
            Lookup::Hit(entry) => {
                debug!(url = %target, "cache hit");
                self.consume(&entry).await
            }
            Lookup::Miss(FetchOutcome::Cached(entry)) => {
                debug!(url = %target, "cache miss, download started");
                self.consume(&entry).await
            }
            Lookup::Miss(FetchOutcome::Uncached { mut origin, head }) => {
                io::write_all(&mut self.stream, &head).await?;
                io::forward_body(&mut origin, &mut self.stream).await?;
                Ok(())
            }
            Lookup::Miss(FetchOutcome::Failed { status, message }) => {
                io::send_error_response(&mut self.stream, status, message).await;
                Err(Error::new(message))
            }
        }
    }

    async fn consume(&mut self, entry: &CacheEntry) -> Result<()> {
        let (sent, result) = consumer::stream_entry(&mut self.stream, entry).await;
        if let Err(e) = result {
            if sent == 0 {
                // the entry was poisoned before this client got a single byte;
                // tell it so, instead of just hanging up
                io::send_error_response(&mut self.stream, HttpStatus::BadGateway, "Cached download failed").await;
            }
            return Err(e);
        }
        Ok(())
    }

    /// The transparent path: non-GET requests are proxied with no cache
    /// interaction at all.
    async fn handle_other(&mut self, url: &Url, request: Bytes) -> Result<()> {
        debug!(host = url.host(), "handling non-GET request transparently");
        let mut origin = match origin::connect(url.host(), url.port()).await {
            Ok(sock) => sock,
            Err(e) => {
                io::send_error_response(&mut self.stream, HttpStatus::BadGateway, "Failed to connect").await;
                return Err(e);
            }
        };
        if let Err(e) = io::write_all(&mut origin, &request).await {
            io::send_error_response(&mut self.stream, HttpStatus::BadGateway, "Failed to send request").await;
            return Err(e);
        }
        let mut head = BytesMut::with_capacity(conf().recv_buffer_size());
        match io::recv_until_header_end(&mut origin, &mut head).await {
            Ok(n) if n > 0 => {}
            _ => {
                io::send_error_response(&mut self.stream, HttpStatus::BadGateway, "Failed to receive response").await;
                return Err(Error::new("failed to receive response from origin"));
            }
        }
        io::write_all(&mut self.stream, &head).await?;
        io::forward_body(&mut origin, &mut self.stream).await?;
        Ok(())
    }
}
