use std::time::Duration;

/// Errors that can occur in duplex transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote end closed the stream.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// An operation needed an open connection but none was established.
    #[error("not connected")]
    NotConnected,

    /// No data arrived within the receive timeout.
    #[error("no data received within {0:?}")]
    Timeout(Duration),

    /// A layer stacked on top of another connection (e.g. a nested tunnel)
    /// failed with its own error.
    #[error("{0}")]
    Upstream(Box<dyn std::error::Error + Send + Sync>),
}

impl TransportError {
    /// Returns true if this error only reports an elapsed receive timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            TransportError::Timeout(_) => true,
            TransportError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
