//! Duplex request/response connections with handler dispatch.
//!
//! This is the "just works" layer. A [`Connection`] wraps one inbound and
//! one outbound byte stream (a socket, or a pipe pair), sends outbound
//! requests and awaits their replies, and concurrently dispatches inbound
//! requests to registered handlers.
//!
//! Replies are matched to pending requests in the order requests were
//! sent; a connection therefore never has more than one request in flight
//! at a time (overlapping `send_request` calls queue internally).

pub mod connection;
pub mod error;
pub mod handler;
pub mod request;
pub mod state;

pub use connection::{Connection, ConnectionBuilder};
pub use error::{PeerError, Result};
pub use handler::{HandlerError, HandlerRegistry, HandlerResult, MessageHandler, NullPayload};
pub use request::{ServiceRequest, VoidResponse};
pub use state::ConnectionState;
