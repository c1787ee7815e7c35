//! RESP Protocol Implementation
//!
//! This module implements the subset of the Redis Serialization Protocol (RESP)
//! the server speaks: requests framed as arrays of bulk strings, and replies
//! as simple strings, errors, bulk strings or null.
//!
//! ## Modules
//!
//! - `types`: Defines the `RespValue` reply enum and its serialization
//! - `command`: The decoded `Command` and its client-side encoding
//! - `decoder`: Resumable decoder for incoming request bytes
//!
//! ## Example
//!
//! ```
//! use respkv::protocol::{RespDecoder, RespValue};
//! use bytes::Bytes;
//!
//! // Decoding incoming data
//! let mut decoder = RespDecoder::new();
//! decoder.feed(b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n");
//! let command = decoder.next_command().unwrap().unwrap();
//! assert_eq!(command.args(), &[Bytes::from("foo")]);
//!
//! // Creating responses
//! let response = RespValue::bulk_string(Bytes::from("bar"));
//! assert_eq!(response.serialize(), b"$3\r\nbar\r\n");
//! ```

pub mod command;
pub mod decoder;
pub mod types;

// Re-export commonly used types for convenience
pub use command::Command;
pub use decoder::{ParseError, ParseResult, RespDecoder};
pub use types::RespValue;
