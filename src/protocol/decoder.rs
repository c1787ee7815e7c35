//! Incremental RESP Request Decoder
//!
//! Clients send commands as arrays of bulk strings:
//!
//! ```text
//! *<argc>\r\n
//! $<len>\r\n<len bytes>\r\n      (repeated argc times)
//! ```
//!
//! TCP delivers these bytes in arbitrary chunks. A single read may hold half
//! a command, or several commands back to back. [`RespDecoder`] owns an
//! accumulation buffer that persists across reads:
//!
//! 1. `feed()` appends whatever the socket produced
//! 2. `next_command()` extracts one complete command, or returns `Ok(None)`
//!    when the buffer ends in the middle of one
//! 3. Each header and argument is consumed from the front of the buffer as
//!    soon as it is complete. A command that spans reads keeps its decoded
//!    arguments and remaining count, so earlier bytes are never re-scanned
//!
//! Bulk payloads are read by declared length, so CR/LF bytes inside a value
//! are never treated as delimiters.
//!
//! ## Error Recovery
//!
//! A framing error discards everything currently buffered, including the
//! arguments of a partially decoded command. The decoder is
//! then empty and ready for the next well-formed command; commands that were
//! extracted before the error are unaffected.

use crate::protocol::command::Command;
use crate::protocol::types::{prefix, CRLF};
use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

/// Errors that can occur while decoding a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A type prefix other than the one the framing requires
    #[error("expected '{expected}', found byte {found:#04x}")]
    UnexpectedPrefix { expected: char, found: u8 },

    /// A length header that is not a decimal integer
    #[error("invalid length: {0}")]
    InvalidLength(String),

    /// Negative argument count
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// Negative bulk string length (requests never carry nulls)
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Bulk payload not followed by CRLF
    #[error("bulk string missing trailing CRLF")]
    MissingCrlf,

    /// A declared size beyond the decoder's limits
    #[error("{what} too large: {size} (max: {max})")]
    TooLarge {
        what: &'static str,
        size: i64,
        max: i64,
    },
}

/// Result type for decoding operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: i64 = 512 * 1024 * 1024;

/// Maximum number of arguments in one command
pub const MAX_ARGS: i64 = 1024 * 1024;

/// Longest accepted `*<n>` / `$<n>` header, excluding the prefix and CRLF
const MAX_HEADER_LEN: usize = 32;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Per-connection decoder state.
///
/// # Example
///
/// ```
/// use respkv::protocol::{Command, RespDecoder};
///
/// let mut decoder = RespDecoder::new();
/// decoder.feed(b"*2\r\n$3\r\nGET\r\n$3\r\nf");
/// assert_eq!(decoder.next_command(), Ok(None));
///
/// decoder.feed(b"oo\r\n");
/// let cmd = decoder.next_command().unwrap().unwrap();
/// assert_eq!(cmd, Command::from(&["GET", "foo"][..]));
/// assert!(decoder.is_empty());
/// ```
#[derive(Debug)]
pub struct RespDecoder {
    /// Bytes received but not yet consumed
    buffer: BytesMut,

    /// Command whose header and leading arguments are already consumed
    pending: Option<PartialCommand>,
}

/// Parse position inside a command that spans several reads.
#[derive(Debug)]
struct PartialCommand {
    /// Arguments still to decode
    remaining: usize,
    /// Arguments decoded so far
    args: Vec<Bytes>,
}

impl PartialCommand {
    fn new(count: usize) -> Self {
        Self {
            remaining: count,
            args: Vec::with_capacity(count.min(16)),
        }
    }
}

impl Default for RespDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RespDecoder {
    /// Creates a decoder with an empty buffer.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            pending: None,
        }
    }

    /// Appends raw bytes from one network read. Empty input is a no-op.
    pub fn feed(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.buffer.extend_from_slice(data);
    }

    /// Extracts the next complete command from the buffer.
    ///
    /// Each header and argument is consumed as soon as it is complete, so
    /// bytes are examined once no matter how many reads a command spans.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(command))` - A command was decoded and its bytes consumed
    /// - `Ok(None)` - The buffer holds no complete command yet
    /// - `Err(e)` - Malformed framing; all buffered input has been discarded
    pub fn next_command(&mut self) -> ParseResult<Option<Command>> {
        let result = self.resume_command();
        if result.is_err() {
            self.clear();
        }
        result
    }

    /// Feeds a chunk and drains every complete command, in arrival order.
    ///
    /// Decoding stops at the first error, which is returned as the last item.
    pub fn decode(&mut self, data: &[u8]) -> Vec<ParseResult<Command>> {
        self.feed(data);

        let mut out = Vec::new();
        loop {
            match self.next_command() {
                Ok(Some(command)) => out.push(Ok(command)),
                Ok(None) => break,
                Err(e) => {
                    out.push(Err(e));
                    break;
                }
            }
        }
        out
    }

    /// Number of received bytes not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// True when no part of a command is held.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty() && self.pending.is_none()
    }

    /// Drops any partially received command.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.pending = None;
    }

    fn resume_command(&mut self) -> ParseResult<Option<Command>> {
        let mut partial = match self.pending.take() {
            Some(partial) => partial,
            None => match parse_array_header(&self.buffer)? {
                Some((count, consumed)) => {
                    self.buffer.advance(consumed);
                    PartialCommand::new(count)
                }
                None => return Ok(None),
            },
        };

        while partial.remaining > 0 {
            match parse_bulk_string(&self.buffer)? {
                Some((data_start, length)) => {
                    let data_end = data_start + length;
                    partial
                        .args
                        .push(Bytes::copy_from_slice(&self.buffer[data_start..data_end]));
                    self.buffer.advance(data_end + CRLF.len());
                    partial.remaining -= 1;
                }
                None => {
                    self.pending = Some(partial);
                    return Ok(None);
                }
            }
        }

        Ok(Some(Command::new(partial.args)))
    }
}

/// Parses `*<count>\r\n` at the start of `buf`.
///
/// Returns the argument count and the header length.
fn parse_array_header(buf: &[u8]) -> ParseResult<Option<(usize, usize)>> {
    if buf.is_empty() {
        return Ok(None);
    }

    if buf[0] != prefix::ARRAY {
        return Err(ParseError::UnexpectedPrefix {
            expected: prefix::ARRAY as char,
            found: buf[0],
        });
    }

    let (count, consumed) = match parse_length(buf, 1)? {
        Some(header) => header,
        None => return Ok(None),
    };

    if count < 0 {
        return Err(ParseError::InvalidArrayLength(count));
    }
    if count > MAX_ARGS {
        return Err(ParseError::TooLarge {
            what: "argument count",
            size: count,
            max: MAX_ARGS,
        });
    }

    Ok(Some((count as usize, consumed)))
}

/// Checks for a complete `$<len>\r\n<data>\r\n` at the start of `buf`.
///
/// Returns the payload offset and length once the trailing CRLF has arrived.
/// Nothing is copied until then.
fn parse_bulk_string(buf: &[u8]) -> ParseResult<Option<(usize, usize)>> {
    if buf.is_empty() {
        return Ok(None);
    }

    if buf[0] != prefix::BULK_STRING {
        return Err(ParseError::UnexpectedPrefix {
            expected: prefix::BULK_STRING as char,
            found: buf[0],
        });
    }

    let (length, data_start) = match parse_length(buf, 1)? {
        Some(header) => header,
        None => return Ok(None),
    };

    if length < 0 {
        return Err(ParseError::InvalidBulkLength(length));
    }
    if length > MAX_BULK_SIZE {
        return Err(ParseError::TooLarge {
            what: "bulk string",
            size: length,
            max: MAX_BULK_SIZE,
        });
    }

    let length = length as usize;
    let data_end = data_start + length;
    let total_needed = data_end + CRLF.len();

    if buf.len() < total_needed {
        // Fail early when the byte after the payload is already wrong
        if buf.len() > data_end && buf[data_end] != b'\r' {
            return Err(ParseError::MissingCrlf);
        }
        return Ok(None);
    }

    if &buf[data_end..total_needed] != CRLF {
        return Err(ParseError::MissingCrlf);
    }

    Ok(Some((data_start, length)))
}

/// Parses the decimal integer of a `*<n>\r\n` or `$<n>\r\n` header.
///
/// `start` points just past the prefix byte. Returns the value and the
/// position after the CRLF. An incomplete header is checked for garbage so
/// malformed input is rejected without waiting for a terminator that may
/// never come.
fn parse_length(buf: &[u8], start: usize) -> ParseResult<Option<(i64, usize)>> {
    let rest = &buf[start..];
    // A header never needs more than MAX_HEADER_LEN digits plus CRLF
    let line = &rest[..rest.len().min(MAX_HEADER_LEN + CRLF.len())];

    match find_crlf(line) {
        Some(end) => {
            if end > MAX_HEADER_LEN {
                return Err(ParseError::InvalidLength("header too long".to_string()));
            }
            let n = parse_integer(&line[..end])?;
            Ok(Some((n, start + end + CRLF.len())))
        }
        None => {
            let pending = line.strip_suffix(b"\r").unwrap_or(line);
            if pending.len() > MAX_HEADER_LEN {
                return Err(ParseError::InvalidLength("header too long".to_string()));
            }
            if !is_integer_prefix(pending) {
                return Err(ParseError::InvalidLength(
                    String::from_utf8_lossy(pending).into_owned(),
                ));
            }
            Ok(None)
        }
    }
}

/// Parses an optionally negative decimal integer.
fn parse_integer(digits: &[u8]) -> ParseResult<i64> {
    let invalid = || ParseError::InvalidLength(String::from_utf8_lossy(digits).into_owned());

    let unsigned = digits.strip_prefix(b"-").unwrap_or(digits);
    if unsigned.is_empty() || !unsigned.iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }

    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(invalid)
}

/// True if `bytes` could still become a valid integer once more input arrives.
fn is_integer_prefix(bytes: &[u8]) -> bool {
    let unsigned = bytes.strip_prefix(b"-").unwrap_or(bytes);
    unsigned.iter().all(u8::is_ascii_digit)
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|window| window == CRLF)
}
