//! Server configuration.
//!
//! The listen port is the only externally meaningful setting; the bind host
//! is exposed for convenience. Log verbosity comes from `RUST_LOG`.

use crate::{DEFAULT_HOST, DEFAULT_PORT};
use clap::Parser;

/// Command-line configuration for the server binary.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "respkv")]
#[command(about = "In-memory key-value server speaking RESP (SET/GET)")]
#[command(version)]
pub struct Config {
    /// Host to bind to
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Config {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
