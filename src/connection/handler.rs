//! Connection Handler
//!
//! This module handles individual client connections.
//! Each client gets its own handler task that runs in a loop,
//! reading bytes and sending replies.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  Read bytes from socket      │
//!    │              │               │
//!    │              ▼               │
//!    │  Feed RespDecoder            │
//!    │              │               │
//!    │              ▼               │
//!    │  For each complete command:  │
//!    │    execute, encode reply     │
//!    │              │               │
//!    │              ▼               │
//!    │  Flush replies in order      │
//!    │              │               │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. Client disconnects / I/O error
//!        │
//!        ▼
//! 5. Handler task ends, decoder state dropped
//! ```
//!
//! ## Buffer Management
//!
//! TCP is a stream protocol: a read may carry a partial command or several
//! commands at once. The [`RespDecoder`] keeps unconsumed bytes between
//! reads, and replies are queued in a `BufWriter` and flushed once per read
//! so a pipelined batch goes out in a single write, in command order.
//!
//! A protocol error is not fatal. It is logged, the buffered input is
//! discarded, and the connection keeps serving later well-formed commands.

use crate::commands::CommandHandler;
use crate::protocol::{RespDecoder, RespValue};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info, trace, warn};

/// Size of each socket read
const READ_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Total malformed requests discarded
    pub protocol_errors: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Reads every counter at once.
    ///
    /// Counters are loaded one by one, so a snapshot taken while clients are
    /// active may mix slightly different instants.
    pub fn snapshot(&self) -> ConnectionStatsSnapshot {
        ConnectionStatsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            commands_processed: self.commands_processed.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ConnectionStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionStatsSnapshot {
    pub connections_accepted: u64,
    pub active_connections: u64,
    pub commands_processed: u64,
    pub protocol_errors: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

/// Handles a single client connection.
///
/// Generic over the byte stream so the same loop serves a `TcpStream` in
/// production and an in-memory mock in tests.
pub struct ConnectionHandler<S> {
    /// The client stream, with buffered writes
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Scratch buffer for socket reads
    read_buf: BytesMut,

    /// Incremental request decoder, lives as long as the connection
    decoder: RespDecoder,

    /// The command handler (shares the store with every connection)
    command_handler: CommandHandler,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `stream` - The byte stream for this connection
    /// * `addr` - The client's socket address
    /// * `command_handler` - The command handler for executing commands
    /// * `stats` - Shared connection statistics
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            read_buf: BytesMut::with_capacity(READ_BUFFER_SIZE),
            decoder: RespDecoder::new(),
            command_handler,
            stats,
        }
    }

    /// Runs the main connection loop.
    ///
    /// Reads commands from the client, executes them, and sends back replies
    /// until the client disconnects or an I/O error occurs.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    info!(client = %self.addr, "Client disconnected")
                }
                ConnectionError::IoError(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %self.addr, "Connection reset by client")
                }
                _ => warn!(client = %self.addr, error = %e, "Connection error"),
            },
        }

        self.stats.connection_closed();
        result
    }

    /// The main read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            self.read_more_data().await?;
            self.process_buffered().await?;
        }
    }

    /// Executes every complete command in the decoder and flushes the replies.
    async fn process_buffered(&mut self) -> Result<(), ConnectionError> {
        let mut replied = false;

        loop {
            match self.decoder.next_command() {
                Ok(Some(command)) => {
                    trace!(
                        client = %self.addr,
                        args = command.len(),
                        remaining = self.decoder.buffered(),
                        "Decoded command"
                    );
                    let response = self.command_handler.execute(command);
                    self.stats.command_processed();
                    if response.is_error() {
                        debug!(client = %self.addr, reply = %response, "Command rejected");
                    }
                    self.queue_response(&response).await?;
                    replied = true;
                }
                Ok(None) => {
                    trace!(
                        client = %self.addr,
                        buffered = self.decoder.buffered(),
                        "Incomplete command, need more data"
                    );
                    break;
                }
                Err(e) => {
                    warn!(client = %self.addr, error = %e, "Protocol error, discarding input");
                    self.stats.protocol_error();
                    break;
                }
            }
        }

        if replied {
            self.stream.flush().await?;
        }

        Ok(())
    }

    /// Reads more data from the stream into the decoder.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        self.read_buf.clear();
        let n = self.stream.get_mut().read_buf(&mut self.read_buf).await?;

        if n == 0 {
            // Connection closed by client
            if self.decoder.is_empty() {
                return Err(ConnectionError::ClientDisconnected);
            } else {
                return Err(ConnectionError::UnexpectedEof);
            }
        }

        self.decoder.feed(&self.read_buf);
        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(())
    }

    /// Queues a reply in the write buffer.
    async fn queue_response(&mut self, response: &RespValue) -> Result<(), ConnectionError> {
        let bytes = response.serialize();
        self.stream.write_all(&bytes).await?;
        self.stats.bytes_written(bytes.len());
        trace!(client = %self.addr, bytes = bytes.len(), "Queued response");
        Ok(())
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Client disconnected in the middle of a command
    #[error("Unexpected end of stream")]
    UnexpectedEof,
}

/// Handles a client connection.
///
/// This is a convenience function that creates a ConnectionHandler
/// and runs it to completion. Errors stay inside the connection.
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler = ConnectionHandler::new(stream, addr, command_handler, stats);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageEngine;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_test::io::Builder;

    const SET_FOO_BAR: &[u8] = b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n";
    const GET_FOO: &[u8] = b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n";
    const GET_BAZ: &[u8] = b"*2\r\n$3\r\nGET\r\n$3\r\nbaz\r\n";

    fn test_addr() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn new_handler<S>(stream: S, stats: Arc<ConnectionStats>) -> ConnectionHandler<S>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let storage = Arc::new(StorageEngine::new());
        ConnectionHandler::new(stream, test_addr(), CommandHandler::new(storage), stats)
    }

    #[tokio::test]
    async fn test_example_session() {
        let mock = Builder::new()
            .read(SET_FOO_BAR)
            .write(b"+Ok\r\n")
            .read(GET_FOO)
            .write(b"$3\r\nbar\r\n")
            .read(GET_BAZ)
            .write(b"$-1\r\n")
            .build();

        let result = new_handler(mock, Arc::new(ConnectionStats::new())).run().await;
        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
    }

    #[tokio::test]
    async fn test_command_split_across_reads() {
        let mock = Builder::new()
            .read(&SET_FOO_BAR[..5])
            .read(&SET_FOO_BAR[5..17])
            .read(&SET_FOO_BAR[17..])
            .write(b"+Ok\r\n")
            .build();

        let result = new_handler(mock, Arc::new(ConnectionStats::new())).run().await;
        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
    }

    #[tokio::test]
    async fn test_pipelined_replies_in_order() {
        let mut batch = SET_FOO_BAR.to_vec();
        batch.extend_from_slice(GET_BAZ);
        batch.extend_from_slice(GET_FOO);
        batch.extend_from_slice(b"*3\r\n$3\r\nset\r\n$3\r\nfoo\r\n$3\r\nqux\r\n");
        batch.extend_from_slice(GET_FOO);

        let mock = Builder::new()
            .read(&batch)
            .write(b"+Ok\r\n$-1\r\n$3\r\nbar\r\n+Ok\r\n$3\r\nqux\r\n")
            .build();

        let stats = Arc::new(ConnectionStats::new());
        let result = new_handler(mock, Arc::clone(&stats)).run().await;
        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 5);
    }

    #[tokio::test]
    async fn test_protocol_error_keeps_connection_open() {
        let mock = Builder::new()
            .read(b"*1\r\n$abc\r\n")
            .read(SET_FOO_BAR)
            .write(b"+Ok\r\n")
            .build();

        let stats = Arc::new(ConnectionStats::new());
        let result = new_handler(mock, Arc::clone(&stats)).run().await;
        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
        assert_eq!(stats.protocol_errors.load(Ordering::Relaxed), 1);
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_unknown_command_gets_error_reply() {
        let mock = Builder::new()
            .read(b"*1\r\n$4\r\nPING\r\n")
            .write(b"-ERR unknown command 'ping'\r\n")
            .build();

        let result = new_handler(mock, Arc::new(ConnectionStats::new())).run().await;
        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
    }

    #[tokio::test]
    async fn test_unknown_command_with_crlf_gets_single_reply() {
        let mock = Builder::new()
            .read(b"*1\r\n$6\r\nx\r\n+Ok\r\n")
            .write(b"-ERR unknown command 'x  +ok'\r\n")
            .build();

        let result = new_handler(mock, Arc::new(ConnectionStats::new())).run().await;
        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
    }

    #[tokio::test]
    async fn test_stats_snapshot() {
        let mock = Builder::new()
            .read(SET_FOO_BAR)
            .write(b"+Ok\r\n")
            .read(b"*1\r\n$abc\r\n")
            .read(GET_FOO)
            .write(b"$3\r\nbar\r\n")
            .build();

        let stats = Arc::new(ConnectionStats::new());
        let _ = new_handler(mock, Arc::clone(&stats)).run().await;

        let read = SET_FOO_BAR.len() + b"*1\r\n$abc\r\n".len() + GET_FOO.len();
        assert_eq!(
            stats.snapshot(),
            ConnectionStatsSnapshot {
                connections_accepted: 1,
                active_connections: 0,
                commands_processed: 2,
                protocol_errors: 1,
                bytes_read: read as u64,
                bytes_written: 14,
            }
        );
    }

    #[tokio::test]
    async fn test_eof_with_partial_command() {
        let mock = Builder::new().read(&GET_FOO[..10]).build();

        let stats = Arc::new(ConnectionStats::new());
        let result = new_handler(mock, Arc::clone(&stats)).run().await;
        assert!(matches!(result, Err(ConnectionError::UnexpectedEof)));
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }

    async fn create_test_server() -> (SocketAddr, Arc<StorageEngine>, Arc<ConnectionStats>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let storage = Arc::new(StorageEngine::new());
        let stats = Arc::new(ConnectionStats::new());

        let storage_clone = Arc::clone(&storage);
        let stats_clone = Arc::clone(&stats);

        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                let handler = CommandHandler::new(Arc::clone(&storage_clone));
                let stats = Arc::clone(&stats_clone);
                tokio::spawn(handle_connection(stream, client_addr, handler, stats));
            }
        });

        (addr, storage, stats)
    }

    async fn read_exactly(client: &mut TcpStream, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        tokio::time::timeout(
            tokio::time::Duration::from_secs(2),
            client.read_exact(&mut buf),
        )
        .await
        .expect("timed out waiting for reply")
        .unwrap();
        buf
    }

    #[tokio::test]
    async fn test_set_get_over_tcp() {
        let (addr, storage, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(SET_FOO_BAR).await.unwrap();
        assert_eq!(read_exactly(&mut client, 5).await, b"+Ok\r\n");

        client.write_all(GET_FOO).await.unwrap();
        assert_eq!(read_exactly(&mut client, 9).await, b"$3\r\nbar\r\n");

        client.write_all(GET_BAZ).await.unwrap();
        assert_eq!(read_exactly(&mut client, 5).await, b"$-1\r\n");

        assert_eq!(storage.get(b"foo"), Some(bytes::Bytes::from("bar")));
    }

    #[tokio::test]
    async fn test_connection_stats() {
        let (addr, _, stats) = create_test_server().await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);

        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(SET_FOO_BAR).await.unwrap();
        let _ = read_exactly(&mut client, 5).await;

        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 1);
        assert!(stats.commands_processed.load(Ordering::Relaxed) >= 1);
        assert!(stats.bytes_read.load(Ordering::Relaxed) > 0);
        assert!(stats.bytes_written.load(Ordering::Relaxed) > 0);

        // Close connection
        drop(client);

        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }
}
