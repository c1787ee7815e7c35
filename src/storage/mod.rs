//! Storage Engine Module
//!
//! This module provides the shared in-memory key-value store. The store is
//! volatile: it lives for the lifetime of the server process and is never
//! persisted.
//!
//! ## Example
//!
//! ```
//! use respkv::storage::StorageEngine;
//! use bytes::Bytes;
//! use std::sync::Arc;
//!
//! let engine = Arc::new(StorageEngine::new());
//!
//! engine.set(Bytes::from("name"), Bytes::from("respkv"));
//! assert_eq!(engine.get(b"name"), Some(Bytes::from("respkv")));
//! ```

pub mod engine;

pub use engine::{StorageEngine, StorageStats};
