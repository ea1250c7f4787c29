use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{info, warn};

use crate::splitstream::cache::CacheDirectory;
use crate::splitstream::common::Result;
use crate::splitstream::config::conf;
use crate::splitstream::server::client::ClientConn;
use crate::splitstream::server::connections::ActiveConnections;
use crate::splitstream::server::listener::Listener;

/// The accept loop plus everything it shares with its connections.
pub struct ProxyService {
    listener: Listener,
    directory: Arc<CacheDirectory>,
    connections: Arc<ActiveConnections>,
    shutdown: Notify,
}

impl ProxyService {
    pub fn new(address: String) -> Result<Self> {
        Ok(Self {
            listener: Listener::new(address)?,
            directory: Arc::new(CacheDirectory::new()),
            connections: ActiveConnections::new(conf().max_connections()),
            shutdown: Notify::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn directory(&self) -> &Arc<CacheDirectory> {
        &self.directory
    }

    /// Requests an orderly shutdown: stop accepting, let live connections
    /// finish. Callable from any task, even before run() starts accepting.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Accepts connections until shutdown is requested, then waits for the
    /// active connections to drain. Each connection runs as its own task.
    pub async fn run(&self) {
        info!(address = %self.listener.address.as_str(), "starting proxy service");
        // Use an explicit handle here rather than looking it up in thread local storage each time
        let tokio = tokio::runtime::Handle::current();
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => break,
                accepted = self.listener.accept() => {
                    let sock = match accepted {
                        Some(sock) => sock,
                        None => break,
                    };
                    // a refused connection closes when sock drops here
                    let guard = match self.connections.try_add() {
                        Some(guard) => guard,
                        None => continue,
                    };
                    let conn = ClientConn::new(sock, self.directory.clone(), guard);
                    tokio.spawn(async move {
                        if let Err(e) = conn.run().await {
                            warn!(%e, "error handling client connection");
                        }
                    });
                }
            }
        }
        info!(active = self.connections.len(), "waiting for connections to drain");
        self.connections.wait_drained().await;
        info!("proxy service stopped");
    }
}
