/// Errors that can occur while encoding, decoding, or transferring frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The length header is outside the valid range `0 < len < 10_000_000`.
    #[error("invalid frame length {0} (must be > 0 and < 10_000_000)")]
    InvalidFrameLength(u32),

    /// The peer closed the stream, either between frames or mid-frame.
    #[error("connection closed")]
    ConnectionClosed,

    /// A read returned fewer bytes than requested without a clean EOF.
    ///
    /// Treated as a transport fault, never retried.
    #[error("incomplete read ({got} of {expected} bytes)")]
    IncompleteRead { got: usize, expected: usize },

    /// An envelope or payload could not be serialized to JSON.
    #[error("encoding failed: {0}")]
    EncodingFailed(#[source] serde_json::Error),

    /// A frame payload did not match any expected envelope or payload schema.
    #[error("decoding failed: {0}")]
    DecodingFailed(#[source] serde_json::Error),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
