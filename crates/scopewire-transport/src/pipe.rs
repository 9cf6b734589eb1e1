//! Pipe transport over arbitrary byte streams.
//!
//! Wraps any inbound/outbound stream pair in a session, which covers
//! child-process stdio, anonymous pipes, and in-memory duplex streams
//! alike. Unlike sockets there is no handshake; the session is opened
//! immediately.

use scopewire_peer::Connection;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

/// Open a session over an existing stream pair.
pub fn pipe_connection(
    reader: impl AsyncRead + Send + Unpin + 'static,
    writer: impl AsyncWrite + Send + Unpin + 'static,
) -> Connection {
    let connection = Connection::new(reader, writer);
    connection.open();
    debug!("opened pipe connection");
    connection
}

/// Open a session over this process's stdin and stdout.
///
/// Used by worker processes spawned by a supervisor that speaks the
/// framed protocol over the child's standard streams. Nothing else may
/// write to stdout once the session is open; route diagnostics to stderr.
pub fn stdio_connection() -> Connection {
    pipe_connection(tokio::io::stdin(), tokio::io::stdout())
}
