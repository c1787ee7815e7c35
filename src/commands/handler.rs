//! Command Handler
//!
//! Executes decoded commands against the storage engine and produces the
//! reply for each one.
//!
//! ## Supported Commands
//!
//! - `SET key value` - Store a value, replying `+Ok`
//! - `GET key` - Fetch a value, replying with a bulk string or null
//!
//! Command names are matched case-insensitively. Arguments beyond the ones a
//! command needs are ignored. Anything else is answered with an error reply
//! rather than silence, so a client never waits on a reply that will not come.

use crate::protocol::{Command, RespValue};
use crate::storage::StorageEngine;
use bytes::Bytes;
use std::sync::Arc;

/// Longest command name echoed back in an unknown-command error
const MAX_ECHOED_NAME_LEN: usize = 128;

/// Dispatches commands to the storage engine.
///
/// Cheap to clone; every connection gets its own handle onto the same store.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    storage: Arc<StorageEngine>,
}

impl CommandHandler {
    /// Creates a new command handler with the given storage engine.
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage }
    }

    /// Executes a command and returns the response.
    ///
    /// # Example
    ///
    /// ```
    /// use respkv::commands::CommandHandler;
    /// use respkv::protocol::{Command, RespValue};
    /// use respkv::storage::StorageEngine;
    /// use std::sync::Arc;
    ///
    /// let handler = CommandHandler::new(Arc::new(StorageEngine::new()));
    /// let reply = handler.execute(Command::from(&["SET", "foo", "bar"][..]));
    /// assert_eq!(reply, RespValue::ok());
    /// ```
    pub fn execute(&self, command: Command) -> RespValue {
        let name = match command.name() {
            // Known names are short; longer ones only feed the error reply
            Some(name) => {
                let name = &name[..name.len().min(MAX_ECHOED_NAME_LEN)];
                String::from_utf8_lossy(name).to_ascii_lowercase()
            }
            None => return RespValue::error("ERR empty command"),
        };

        self.dispatch(&name, command.args())
    }

    fn dispatch(&self, cmd: &str, args: &[Bytes]) -> RespValue {
        match cmd {
            "set" => self.cmd_set(args),
            "get" => self.cmd_get(args),
            _ => RespValue::error(format!("ERR unknown command '{}'", printable_name(cmd))),
        }
    }

    /// SET key value
    fn cmd_set(&self, args: &[Bytes]) -> RespValue {
        let [key, value, ..] = args else {
            return wrong_arity("set");
        };

        self.storage.set(key.clone(), value.clone());
        RespValue::ok()
    }

    /// GET key
    fn cmd_get(&self, args: &[Bytes]) -> RespValue {
        let [key, ..] = args else {
            return wrong_arity("get");
        };

        match self.storage.get(key) {
            Some(value) => RespValue::bulk_string(value),
            None => RespValue::null(),
        }
    }
}

/// Makes a client-supplied name safe to embed in a single-line error reply.
///
/// Control characters (CR and LF included) become spaces and the result is
/// cut to at most `MAX_ECHOED_NAME_LEN` bytes on a char boundary.
fn printable_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len().min(MAX_ECHOED_NAME_LEN));
    for c in name.chars() {
        let c = if c.is_control() { ' ' } else { c };
        if out.len() + c.len_utf8() > MAX_ECHOED_NAME_LEN {
            break;
        }
        out.push(c);
    }
    out
}

fn wrong_arity(cmd: &str) -> RespValue {
    RespValue::error(format!(
        "ERR wrong number of arguments for '{}' command",
        cmd
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_handler() -> CommandHandler {
        let storage = Arc::new(StorageEngine::new());
        CommandHandler::new(storage)
    }

    fn make_command(args: &[&str]) -> Command {
        Command::from(args)
    }

    #[test]
    fn test_set_get() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["set", "foo", "bar"]));
        assert_eq!(response, RespValue::ok());

        let response = handler.execute(make_command(&["get", "foo"]));
        assert_eq!(response, RespValue::bulk_string(Bytes::from("bar")));
    }

    #[test]
    fn test_get_nonexistent() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["get", "baz"]));
        assert_eq!(response, RespValue::null());
    }

    #[test]
    fn test_overwrite() {
        let handler = create_handler();

        handler.execute(make_command(&["set", "k", "v1"]));
        handler.execute(make_command(&["set", "k", "v2"]));

        let response = handler.execute(make_command(&["get", "k"]));
        assert_eq!(response, RespValue::bulk_string(Bytes::from("v2")));
    }

    #[test]
    fn test_case_insensitive_names() {
        let handler = create_handler();

        assert_eq!(
            handler.execute(make_command(&["SET", "foo", "bar"])),
            RespValue::ok()
        );
        assert_eq!(
            handler.execute(make_command(&["Get", "foo"])),
            RespValue::bulk_string(Bytes::from("bar"))
        );
    }

    #[test]
    fn test_empty_and_zero_values_round_trip() {
        let handler = create_handler();

        handler.execute(make_command(&["set", "empty", ""]));
        handler.execute(make_command(&["set", "zero", "0"]));

        assert_eq!(
            handler.execute(make_command(&["get", "empty"])),
            RespValue::bulk_string(Bytes::new())
        );
        assert_eq!(
            handler.execute(make_command(&["get", "zero"])),
            RespValue::bulk_string(Bytes::from("0"))
        );
    }

    #[test]
    fn test_binary_value_round_trip() {
        let handler = create_handler();
        let value = Bytes::from_static(b"line1\r\nline2\x00\xff");

        let set = Command::new(vec![Bytes::from("set"), Bytes::from("bin"), value.clone()]);
        assert_eq!(handler.execute(set), RespValue::ok());

        let response = handler.execute(make_command(&["get", "bin"]));
        assert_eq!(response, RespValue::BulkString(value));
    }

    #[test]
    fn test_extra_arguments_ignored() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["set", "k", "v", "EX", "10"]));
        assert_eq!(response, RespValue::ok());

        let response = handler.execute(make_command(&["get", "k", "ignored"]));
        assert_eq!(response, RespValue::bulk_string(Bytes::from("v")));
    }

    #[test]
    fn test_wrong_arity_applies_nothing() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["set", "k"]));
        assert_eq!(
            response,
            RespValue::error("ERR wrong number of arguments for 'set' command")
        );
        assert_eq!(
            handler.execute(make_command(&["get", "k"])),
            RespValue::null()
        );

        let response = handler.execute(make_command(&["get"]));
        assert!(response.is_error());
    }

    #[test]
    fn test_unknown_command() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["FOOBAR"]));
        assert_eq!(response, RespValue::error("ERR unknown command 'foobar'"));
    }

    #[test]
    fn test_unknown_command_name_cannot_break_framing() {
        let handler = create_handler();
        let response = handler.execute(Command::new(vec![Bytes::from_static(b"x\r\n+Ok")]));

        let wire = response.serialize();
        assert_eq!(wire, b"-ERR unknown command 'x  +ok'\r\n");
        assert_eq!(wire.windows(2).filter(|w| *w == b"\r\n").count(), 1);
    }

    #[test]
    fn test_unknown_command_name_is_truncated() {
        let handler = create_handler();
        let name = "z".repeat(100_000);
        let response = handler.execute(make_command(&[name.as_str()]));

        let expected = format!("ERR unknown command '{}'", "z".repeat(MAX_ECHOED_NAME_LEN));
        assert_eq!(response, RespValue::error(expected));
    }

    #[test]
    fn test_printable_name() {
        assert_eq!(printable_name("get\tfoo\x00"), "get foo ");
        assert_eq!(printable_name("héllo"), "héllo");

        let long = "é".repeat(MAX_ECHOED_NAME_LEN);
        let printed = printable_name(&long);
        assert_eq!(printed.len(), MAX_ECHOED_NAME_LEN);
        assert!(printed.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_empty_command() {
        let handler = create_handler();

        let response = handler.execute(Command::default());
        assert_eq!(response, RespValue::error("ERR empty command"));
    }

    #[test]
    fn test_handlers_share_storage() {
        let handler = create_handler();
        let other = handler.clone();

        handler.execute(make_command(&["set", "shared", "yes"]));
        assert_eq!(
            other.execute(make_command(&["get", "shared"])),
            RespValue::bulk_string(Bytes::from("yes"))
        );
    }
}
