//! # respkv - A Minimal RESP Key-Value Server
//!
//! respkv is an in-memory key-value server that speaks the Redis
//! Serialization Protocol (RESP) over TCP. It supports two commands,
//! `SET` and `GET`, so it works with `redis-cli` and any Redis client
//! that sticks to them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                             respkv                               │
//! │                                                                  │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐           │
//! │  │   Server    │───>│ Connection  │───>│  Command    │           │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │           │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘           │
//! │                            │                  │                  │
//! │                            ▼                  ▼                  │
//! │                     ┌─────────────┐    ┌──────────────────────┐  │
//! │                     │ RespDecoder │    │    StorageEngine     │  │
//! │                     │ (per conn)  │    │ (shared, sharded     │  │
//! │                     └─────────────┘    │  RwLocks)            │  │
//! │                                        └──────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use respkv::Server;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = Server::bind(("0.0.0.0", respkv::DEFAULT_PORT)).await?;
//!     server.run().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `SET key value` → `+Ok`
//! - `GET key` → `$<n>\r\n<value>\r\n`, or `$-1` if the key was never set
//!
//! Names are case-insensitive. Unknown commands get an `-ERR` reply.
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP decoder, command and reply types
//! - [`storage`]: Thread-safe in-memory store
//! - [`commands`]: SET/GET execution
//! - [`connection`]: Per-client connection loop
//! - [`server`]: TCP listener
//! - [`config`]: Command-line configuration

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use config::Config;
pub use connection::{handle_connection, ConnectionStats, ConnectionStatsSnapshot};
pub use protocol::{Command, ParseError, RespDecoder, RespValue};
pub use server::Server;
pub use storage::StorageEngine;

/// The default port respkv listens on
pub const DEFAULT_PORT: u16 = 8314;

/// The default host respkv binds to (all interfaces)
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Version of respkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
