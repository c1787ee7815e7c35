//! Decoded client commands.

use crate::protocol::types::{prefix, CRLF};
use bytes::Bytes;

/// A client request: an ordered list of binary-safe arguments.
///
/// Argument 0 is the command name. A command with no arguments can be
/// decoded (`*0\r\n`) and is rejected by the command handler.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Command {
    args: Vec<Bytes>,
}

impl Command {
    /// Creates a command from its raw arguments.
    pub fn new(args: Vec<Bytes>) -> Self {
        Self { args }
    }

    /// The command name, if any.
    pub fn name(&self) -> Option<&Bytes> {
        self.args.first()
    }

    /// Arguments following the command name.
    pub fn args(&self) -> &[Bytes] {
        self.args.get(1..).unwrap_or(&[])
    }

    /// Number of arguments including the command name.
    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Encodes the command the way a client sends it: an array of bulk strings.
    ///
    /// # Example
    /// ```
    /// use respkv::protocol::Command;
    /// let cmd = Command::from(&["GET", "foo"][..]);
    /// assert_eq!(cmd.encode(), b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n");
    /// ```
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(prefix::ARRAY);
        buf.extend_from_slice(self.args.len().to_string().as_bytes());
        buf.extend_from_slice(CRLF);
        for arg in &self.args {
            buf.push(prefix::BULK_STRING);
            buf.extend_from_slice(arg.len().to_string().as_bytes());
            buf.extend_from_slice(CRLF);
            buf.extend_from_slice(arg);
            buf.extend_from_slice(CRLF);
        }
        buf
    }
}

impl From<Vec<Bytes>> for Command {
    fn from(args: Vec<Bytes>) -> Self {
        Self::new(args)
    }
}

impl From<&[&str]> for Command {
    fn from(args: &[&str]) -> Self {
        Self::new(
            args.iter()
                .map(|s| Bytes::copy_from_slice(s.as_bytes()))
                .collect(),
        )
    }
}
