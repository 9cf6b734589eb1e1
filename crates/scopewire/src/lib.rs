//! Framed request/response sessions over local sockets and pipes.
//!
//! scopewire connects cooperating local processes with a small framed
//! protocol: 4-byte big-endian length prefixes around JSON envelopes, with
//! replies matched to requests in FIFO order.
//!
//! # Crate Structure
//!
//! - [`frame`] — Length-prefixed frame codec and envelope types
//! - [`peer`] — Connections, handler registry, connection lifecycle
//! - [`transport`] — Loopback TCP with port discovery, and pipe/stdio
//!
//! # Quick start
//!
//! A server binds a discoverable port and registers handlers; a client
//! finds it by identifier:
//!
//! ```no_run
//! use scopewire::transport::{ConnectConfig, SocketServer};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let server = SocketServer::bind_discoverable("com.example.inspector").await?;
//! let conn = server.accept().await?;
//! conn.set_source_handler("ping", || async { Ok("pong".to_string()) });
//! # Ok(())
//! # }
//!
//! # async fn client() -> Result<(), Box<dyn std::error::Error>> {
//! let conn =
//!     scopewire::transport::connect_discover("com.example.inspector", &ConnectConfig::default())
//!         .await?;
//! let pong: String = conn.send_request_empty("ping").await?;
//! # Ok(())
//! # }
//! ```

/// Re-export frame codec types.
pub mod frame {
    pub use scopewire_frame::*;
}

/// Re-export connection and handler types.
pub mod peer {
    pub use scopewire_peer::*;
}

/// Re-export transport types.
pub mod transport {
    pub use scopewire_transport::*;
}

pub use scopewire_peer::{Connection, ConnectionState, PeerError, ServiceRequest};
pub use scopewire_transport::TransportError;
