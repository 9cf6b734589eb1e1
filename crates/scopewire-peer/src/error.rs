use scopewire_frame::FrameError;

/// Errors that can occur in connection operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// A send was attempted while the connection was not `Open`.
    #[error("connection is not open")]
    NotConnected,

    /// The peer closed the connection, or it was torn down while a
    /// request was still pending.
    #[error("connection closed")]
    ConnectionClosed,

    /// The task driving the connection was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// A request or response body could not be serialized.
    #[error("encoding failed: {0}")]
    EncodingFailed(#[source] serde_json::Error),

    /// A request or response body did not match the expected schema.
    #[error("decoding failed: {0}")]
    DecodingFailed(#[source] serde_json::Error),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// An I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PeerError>;
