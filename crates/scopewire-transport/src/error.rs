use std::path::PathBuf;
use std::time::Duration;

use scopewire_peer::PeerError;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind a listening socket.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// Failed to establish an outbound connection. Covers refused
    /// connections when no server is listening on the port.
    #[error("failed to connect to port {port}: {source}")]
    ConnectionFailed { port: u16, source: std::io::Error },

    /// The connect attempt did not complete within the deadline.
    #[error("connect to port {port} timed out after {timeout:?}")]
    Timeout { port: u16, timeout: Duration },

    /// No server is reachable for the identifier: the port file is absent,
    /// or it names a port nobody listens on (stale file from a dead
    /// server).
    #[error("no server running for {identifier:?}")]
    ServerNotRunning { identifier: String },

    /// No port file appeared for the identifier within the deadline.
    #[error("no server published a port for {identifier:?} within {timeout:?}")]
    DiscoveryTimeout {
        identifier: String,
        timeout: Duration,
    },

    /// A port file existed but did not contain a valid port number.
    #[error("invalid port file {path}: {reason}")]
    InvalidPortFile { path: PathBuf, reason: String },

    /// Session-layer error from the connection.
    #[error(transparent)]
    Peer(#[from] PeerError),

    /// An I/O error occurred on the transport.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
