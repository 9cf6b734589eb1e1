/// The lifecycle state of a [`Connection`](crate::Connection).
///
/// ```text
/// Connecting ──> Open ──> Closing ──> Closed
///      │           │
///      └───────────┴──────> Failed
/// ```
///
/// `Closed` and `Failed` are terminal; all further sends fail with
/// [`PeerError::NotConnected`](crate::PeerError::NotConnected).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport-specific handshake in progress.
    Connecting,
    /// The receive loop is running; sends are permitted.
    Open,
    /// Explicit stop in progress; pending replies are being failed.
    Closing,
    /// Terminated normally.
    Closed,
    /// Terminated by an unrecoverable I/O error.
    Failed,
}

impl ConnectionState {
    /// Whether the connection is established and ready to send.
    pub fn is_open(self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// Whether the connection has reached a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_is_the_only_sendable_state() {
        assert!(ConnectionState::Open.is_open());
        for state in [
            ConnectionState::Connecting,
            ConnectionState::Closing,
            ConnectionState::Closed,
            ConnectionState::Failed,
        ] {
            assert!(!state.is_open());
        }
    }

    #[test]
    fn closed_and_failed_are_terminal() {
        assert!(ConnectionState::Closed.is_terminal());
        assert!(ConnectionState::Failed.is_terminal());
        assert!(!ConnectionState::Open.is_terminal());
        assert!(!ConnectionState::Connecting.is_terminal());
        assert!(!ConnectionState::Closing.is_terminal());
    }
}
