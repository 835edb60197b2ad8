use mpstunnel_transport::TransportError;

/// Errors that can occur while framing, classifying, or buffering MPS traffic.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The downstream buffer cannot take the offered bytes.
    #[error("downstream buffer overflow ({requested} bytes offered, {free} free, capacity {capacity})")]
    BufferOverflow {
        capacity: usize,
        requested: usize,
        free: usize,
    },

    /// Outbound data violates the framing contract of the codec.
    #[error("invalid argument: {reason} (data '{fragment}')")]
    InvalidArgument { reason: String, fragment: String },

    /// A line from the master is malformed or unexpected.
    #[error("protocol violation: {reason} (line '{line}')")]
    ProtocolViolation { reason: String, line: String },

    /// The underlying connection failed.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
}

impl FrameError {
    pub(crate) fn invalid(reason: impl Into<String>, data: &[u8]) -> Self {
        FrameError::InvalidArgument {
            reason: reason.into(),
            fragment: crate::codec::display_line(data),
        }
    }

    pub(crate) fn violation(reason: impl Into<String>, line: &[u8]) -> Self {
        FrameError::ProtocolViolation {
            reason: reason.into(),
            line: crate::codec::display_line(line),
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
