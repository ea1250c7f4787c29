mod splitstream;

use std::env;
use std::process::exit;
use std::sync::Arc;

use tokio::runtime::Builder;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info_span, Level};
use tracing_subscriber::FmtSubscriber;

use crate::splitstream::config::load_config;
use crate::splitstream::server::ProxyService;

fn main() {
    let subscriber = FmtSubscriber::builder()
        // all spans/events with a level higher than TRACE (e.g, debug, info, warn, etc.)
        // will be written to stdout.
        .with_max_level(Level::TRACE)
        // completes the builder.
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    let _span = info_span!("startup").entered();

    let arg = match env::args().nth(1) {
        Some(arg) => arg,
        None => {
            eprintln!("Usage: splitstream <port>");
            exit(1);
        }
    };
    let port: u16 = match arg.parse() {
        Ok(port) if port != 0 => port,
        _ => {
            eprintln!("Invalid port number: {}", arg);
            exit(1);
        }
    };

    let conf = match load_config(port) {
        Ok(conf) => conf,
        Err(e) => {
            eprintln!("could not load config: {}", e);
            exit(1);
        }
    };

    let tokio = Builder::new_multi_thread()
        .worker_threads(conf.worker_threads())
        .enable_all()
        .build()
        .expect("could not create tokio runtime");

    tokio.block_on(async move {
        let service = match ProxyService::new(conf.listen_address()) {
            Ok(service) => Arc::new(service),
            Err(e) => {
                error!(%e, "could not start proxy service");
                exit(1);
            }
        };

        // SIGINT (ctrl-c) and SIGTERM both request an orderly shutdown: stop
        // accepting and let the connections in flight finish
        let signal_target = service.clone();
        tokio::spawn(async move {
            #[cfg(unix)]
            match signal(SignalKind::terminate()) {
                Ok(mut terminate) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = terminate.recv() => {}
                    }
                }
                Err(e) => {
                    error!(%e, "could not install SIGTERM handler");
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
            #[cfg(not(unix))]
            {
                let _ = tokio::signal::ctrl_c().await;
            }
            signal_target.shutdown();
        });

        service.run().await;
    });
}
