mod client;
mod connections;
mod consumer;
mod io;
mod listener;
mod origin;
mod producer;
mod service;

pub use self::client::ClientConn;
pub use self::connections::{ActiveConnections, ConnectionGuard};
pub use self::consumer::stream_entry;
pub use self::listener::Listener;
pub use self::origin::{connect, FetchOutcome};
pub use self::service::ProxyService;
