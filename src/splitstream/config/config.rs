use std::env;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::splitstream::common::{Error, Result};

pub const CONFIG_NAME: &str = "splitstream.yaml";
pub const LISTEN_BACKLOG: u32 = 1024;

#[derive(Deserialize)]
pub struct Settings {
    /// port to listen on, always taken from the command line
    #[serde(skip)]
    port: u16,
    /// host to listen on, defaults to 0.0.0.0
    #[serde(default = "default_host")]
    host: String,
    /// socket_timeout_seconds bounds every socket read and write, client and origin side. Default 30.
    #[serde(default = "default_socket_timeout_seconds")]
    socket_timeout_seconds: u32,
    /// chunk_size is the capacity of each cache chunk. Default 1MB.
    #[serde(default = "default_chunk_size")]
    chunk_size: u32,
    /// recv_buffer_size is the default size for (user-space) buffers used to read from TCP sockets
    #[serde(default = "default_recv_buffer_size")]
    recv_buffer_size: u32,
    /// max_header_size caps how many bytes we'll buffer looking for the end of an HTTP head.
    /// A request head over the cap is answered 400, an origin response head over it 502. Default 64KB.
    #[serde(default = "default_max_header_size")]
    max_header_size: u32,
    /// max_connections to allow before rejecting new connections. Important to introduce back-pressure. Default 10,000.
    #[serde(default = "default_max_connections")]
    max_connections: u32,
    /// num_workers is the number of tokio worker threads. 0 (the default) means one per CPU.
    #[serde(default)]
    num_workers: u32,
}

fn default_host() -> String { "0.0.0.0".to_string() }
const fn default_socket_timeout_seconds() -> u32 { 30 }
const fn default_chunk_size() -> u32 { 1024 * 1024 }
const fn default_recv_buffer_size() -> u32 { 32 * 1024 }
const fn default_max_header_size() -> u32 { 64 * 1024 }
const fn default_max_connections() -> u32 { 10000 }

static SETTINGS: OnceLock<Settings> = OnceLock::new();

impl Default for Settings {
    fn default() -> Self {
        Settings {
            port: 0,
            host: default_host(),
            socket_timeout_seconds: default_socket_timeout_seconds(),
            chunk_size: default_chunk_size(),
            recv_buffer_size: default_recv_buffer_size(),
            max_header_size: default_max_header_size(),
            max_connections: default_max_connections(),
            num_workers: 0,
        }
    }
}

pub fn conf() -> &'static Settings {
    SETTINGS.get_or_init(Settings::default)
}

/// Loads splitstream.yaml if present (see find_config_file), applies the
/// listen port from the command line, and installs the result globally.
/// Must be called before the server starts; later calls keep the first settings.
pub fn load_config(port: u16) -> Result<&'static Settings> {
    let mut settings = match find_config_file(CONFIG_NAME) {
        Some(config_path) => {
            info!(config_path = %config_path.to_string_lossy().into_owned(), "found config file");
            let file = File::open(&config_path)?;
            serde_yaml::from_reader(file)?
        }
        None => Settings::default(),
    };
    settings.port = port;
    settings.load()?;
    Ok(SETTINGS.get_or_init(move || settings))
}

impl Settings {
    fn load(&mut self) -> Result<()> {
        if self.recv_buffer_size < 4096 {
            self.recv_buffer_size = default_recv_buffer_size();
        }
        if self.recv_buffer_size > 1024 * 1024 {
            return Err(Error::new("recv_buffer_size cannot be > 1MB"));
        }
        self.recv_buffer_size = self.recv_buffer_size.next_power_of_two();
        if self.chunk_size < 4096 {
            return Err(Error::new("chunk_size cannot be < 4KB"));
        }
        if self.max_header_size < self.recv_buffer_size {
            return Err(Error::new("max_header_size cannot be < recv_buffer_size"));
        }
        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn socket_timeout(&self) -> Duration {
        Duration::from_secs(self.socket_timeout_seconds as u64)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size as usize
    }

    pub fn recv_buffer_size(&self) -> usize {
        self.recv_buffer_size as usize
    }

    pub fn max_header_size(&self) -> usize {
        self.max_header_size as usize
    }

    pub fn max_connections(&self) -> u32 {
        self.max_connections
    }

    pub fn worker_threads(&self) -> usize {
        if self.num_workers == 0 {
            num_cpus::get()
        } else {
            self.num_workers as usize
        }
    }
}

/// Looks for the config file in the places an operator would put one: next to
/// where the proxy was started, then the user config directory, then the
/// system-wide one. First match wins; none at all means defaults.
fn find_config_file(config_name: &str) -> Option<PathBuf> {
    let mut candidates = vec![PathBuf::from(config_name)];
    if let Ok(home) = env::var("HOME") {
        let mut user_conf = PathBuf::from(home);
        user_conf.push(".config/splitstream");
        user_conf.push(config_name);
        candidates.push(user_conf);
    }
    candidates.push(Path::new("/etc/splitstream").join(config_name));

    candidates.into_iter().find(|candidate| {
        debug!("checking for config file at {}", candidate.to_string_lossy());
        candidate.exists()
    })
}
