pub mod splitstream;
#[cfg(test)]
mod tests;

pub use crate::splitstream::*;

use std::io;

use tokio::runtime::{Builder, Runtime};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::splitstream::config::Settings;

pub fn init_tracing(max_level: Level) {
    let subscriber = FmtSubscriber::builder()
        // all spans/events with a level higher than TRACE (e.g, debug, info, warn, etc.)
        // will be written to stdout.
        .with_max_level(max_level)
        // completes the builder.
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");
}

pub fn init_runtime(conf: &'static Settings) -> io::Result<Runtime> {
    Builder::new_multi_thread()
        .worker_threads(conf.worker_threads())
        .enable_all()
        .build()
}
