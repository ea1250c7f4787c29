use std::net::SocketAddr;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::splitstream::server::ProxyService;

/// A scripted origin server: accepts connections, reads a request head, sends
/// its canned response, then closes (or resets). Counts its connections so
/// tests can assert how often the proxy really fetched.
pub struct Origin {
    pub addr: SocketAddr,
    connections: Arc<AtomicUsize>,
}

impl Origin {
    pub fn connection_count(&self) -> usize {
        self.connections.load(Relaxed)
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn spawn_origin(
    response: &'static [u8],
    first_byte_delay: Duration,
    reset_after_send: bool,
) -> Origin {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("couldn't bind origin listener");
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = connections.clone();
    tokio::spawn(async move {
        loop {
            let (mut sock, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => return,
            };
            counter.fetch_add(1, Relaxed);
            tokio::spawn(async move {
                // read the request head; the script doesn't care what it says
                let mut head = Vec::new();
                let mut buf = [0u8; 4096];
                loop {
                    match sock.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            head.extend_from_slice(&buf[..n]);
                            if head.windows(4).any(|w| w == b"\r\n\r\n") {
                                break;
                            }
                        }
                    }
                }
                if !first_byte_delay.is_zero() {
                    tokio::time::sleep(first_byte_delay).await;
                }
                let _ = sock.write_all(response).await;
                if reset_after_send {
                    // give the response time to arrive, then reset the
                    // connection instead of closing it cleanly
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    let _ = sock.set_linger(Some(Duration::from_secs(0)));
                }
            });
        }
    });
    Origin { addr, connections }
}

/// Binds the proxy on an ephemeral port and runs it in the background.
pub async fn start_proxy() -> (SocketAddr, Arc<ProxyService>, JoinHandle<()>) {
    let service = Arc::new(
        ProxyService::new("127.0.0.1:0".to_string()).expect("couldn't create proxy service"),
    );
    let addr = service.local_addr().unwrap();
    let runner = service.clone();
    let handle = tokio::spawn(async move { runner.run().await });
    (addr, service, handle)
}

/// Sends raw request bytes and collects the complete response, however the
/// connection ends.
pub async fn send_request(proxy: SocketAddr, request: String) -> Vec<u8> {
    let mut sock = TcpStream::connect(proxy)
        .await
        .expect("couldn't connect to proxy");
    sock.write_all(request.as_bytes())
        .await
        .expect("couldn't send request");
    read_until_closed(&mut sock).await
}

pub async fn read_until_closed(sock: &mut TcpStream) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match sock.read(&mut buf).await {
            Ok(0) | Err(_) => return out,
            Ok(n) => out.extend_from_slice(&buf[..n]),
        }
    }
}
