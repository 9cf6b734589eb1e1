//! Transports for framed sessions.
//!
//! Two ways to get a [`Connection`](scopewire_peer::Connection) talking to
//! a peer:
//! - [`socket`]: loopback TCP with optional file-based port discovery, for
//!   unrelated local processes that rendezvous by service identifier.
//! - [`pipe`]: any byte-stream pair, typically a child process's stdio.

pub mod discovery;
pub mod error;
pub mod pipe;
pub mod socket;

pub use error::{Result, TransportError};
pub use pipe::{pipe_connection, stdio_connection};
pub use socket::{connect, connect_discover, ConnectConfig, SocketServer};
