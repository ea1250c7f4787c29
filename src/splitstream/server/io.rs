use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::debug;

use crate::splitstream::common::{Error, Result};
use crate::splitstream::config::conf;
use crate::splitstream::http::{find_header_end, HttpStatus};

/// Reads some bytes into buf, growing it as needed. Ok(0) means EOF.
/// Like every socket operation here, bounded by the configured socket timeout.
pub async fn read_some<R: AsyncRead + Unpin>(r: &mut R, buf: &mut BytesMut) -> Result<usize> {
    match timeout(conf().socket_timeout(), r.read_buf(buf)).await {
        Ok(result) => result.map_err(Error::from),
        Err(_) => Err(Error::timeout()),
    }
}

pub async fn write_all<W: AsyncWrite + Unpin>(w: &mut W, bytes: &[u8]) -> Result<()> {
    match timeout(conf().socket_timeout(), w.write_all(bytes)).await {
        Ok(result) => result.map_err(Error::from),
        Err(_) => Err(Error::timeout()),
    }
}

/// Reads until the CRLFCRLF head terminator is buffered, the peer closes, or
/// the configured cap is hit (an error). Returns the total bytes buffered;
/// callers that require a complete head re-check with find_header_end.
pub async fn recv_until_header_end<R: AsyncRead + Unpin>(
    r: &mut R,
    buf: &mut BytesMut,
) -> Result<usize> {
    loop {
        if find_header_end(buf).is_some() {
            return Ok(buf.len());
        }
        if buf.len() >= conf().max_header_size() {
            return Err(Error::new("header exceeds maximum size"));
        }
        let n = read_some(r, buf).await?;
        if n == 0 {
            debug!("connection closed by peer");
            return Ok(buf.len());
        }
    }
}

/// Streams the rest of `from` into `to` until EOF. Transparent (non-cached)
/// path only. A read error just ends the body, the way origin EOF does; a
/// write error means the client is gone and is reported.
pub async fn forward_body<R, W>(from: &mut R, to: &mut W) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(conf().recv_buffer_size());
    let mut total = 0u64;
    loop {
        buf.clear();
        let n = match read_some(from, &mut buf).await {
            Ok(n) => n,
            Err(e) => {
                debug!(%e, "read error ended the transparent forward");
                return Ok(total);
            }
        };
        if n == 0 {
            return Ok(total);
        }
        write_all(to, &buf).await?;
        total += n as u64;
    }
}

/// Minimal HTTP/1.0 error response, the only thing the proxy ever says on its
/// own. A failure sending it is just logged, the connection is closing anyway.
pub async fn send_error_response<W: AsyncWrite + Unpin>(w: &mut W, status: HttpStatus, message: &str) {
    debug!(%status, message, "sending error response");
    let response = format!("HTTP/1.0 {}\r\n\r\n{}", status, message);
    if let Err(e) = write_all(w, response.as_bytes()).await {
        debug!(%e, "failed to send error response");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_recv_until_header_end_across_reads() {
        let (mut a, mut b) = duplex(64);
        let writer = tokio::spawn(async move {
            a.write_all(b"GET http://o/p HTTP/1.1\r\n").await.unwrap();
            a.write_all(b"Host: o\r\n\r\ntrailing").await.unwrap();
        });
        let mut buf = BytesMut::new();
        let n = recv_until_header_end(&mut b, &mut buf).await.unwrap();
        writer.await.unwrap();
        assert!(n >= b"GET http://o/p HTTP/1.1\r\nHost: o\r\n\r\n".len());
        assert!(find_header_end(&buf).is_some());
    }

    #[tokio::test]
    async fn test_recv_until_header_end_eof_without_terminator() {
        let (mut a, mut b) = duplex(64);
        a.write_all(b"GET http://o/p HTTP/1.1").await.unwrap();
        drop(a);
        let mut buf = BytesMut::new();
        let n = recv_until_header_end(&mut b, &mut buf).await.unwrap();
        assert_eq!(n, b"GET http://o/p HTTP/1.1".len());
        assert!(find_header_end(&buf).is_none());
    }

    #[tokio::test]
    async fn test_send_error_response_format() {
        let (mut a, mut b) = duplex(256);
        send_error_response(&mut a, HttpStatus::BadRequest, "Invalid URL").await;
        drop(a);
        let mut out = Vec::new();
        b.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"HTTP/1.0 400 Bad Request\r\n\r\nInvalid URL");
    }
}
