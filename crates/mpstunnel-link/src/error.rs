use std::time::Duration;

use mpstunnel_frame::{display_line, FrameError};
use mpstunnel_transport::TransportError;

/// What the tunnel was waiting for when a deadline passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPhase {
    FrameAck,
    Downstream,
    Unlink,
    Link,
}

impl std::fmt::Display for WaitPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            WaitPhase::FrameAck => "frame acknowledgment",
            WaitPhase::Downstream => "downstream frame",
            WaitPhase::Unlink => "ULK response",
            WaitPhase::Link => "LNK response",
        })
    }
}

/// Errors that can occur in tunnel operations.
#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    /// The master answered with something malformed or unexpected.
    #[error("protocol violation: {reason} (line '{line}')")]
    ProtocolViolation { reason: String, line: String },

    /// A deadline passed while waiting on the master.
    #[error("timed out after {after:?} waiting for {phase}")]
    Timeout {
        phase: WaitPhase,
        after: Duration,
        /// Last ignored line seen during the wait, if any.
        last_line: Option<String>,
    },

    /// The master reported `TOE`: the link to the slave is gone.
    #[error("broken link to slave device (line '{line}')")]
    LinkBroken { line: String },

    /// The downstream buffer could not take a decoded frame.
    #[error("downstream buffer overflow: {requested} bytes offered, {free} free (line '{line}')")]
    BufferOverflow {
        requested: usize,
        free: usize,
        line: String,
    },

    /// The wrapped master connection failed.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// Caller data violates the framing contract of the codec.
    #[error("invalid argument: {reason} (data '{fragment}')")]
    InvalidArgument { reason: String, fragment: String },
}

impl TunnelError {
    /// Returns true if only a deadline passed.
    pub fn is_timeout(&self) -> bool {
        match self {
            TunnelError::Timeout { .. } => true,
            TunnelError::Transport(err) => err.is_timeout(),
            _ => false,
        }
    }

    pub(crate) fn violation(reason: impl Into<String>, line: &[u8]) -> Self {
        TunnelError::ProtocolViolation {
            reason: reason.into(),
            line: display_line(line),
        }
    }

    pub(crate) fn link_broken(line: &[u8]) -> Self {
        TunnelError::LinkBroken {
            line: display_line(line),
        }
    }

    /// Convert into the error type of the [`DuplexConnection`] contract so a
    /// tunnel can stand in for any other connection.
    ///
    /// [`DuplexConnection`]: mpstunnel_transport::DuplexConnection
    pub fn into_transport(self) -> TransportError {
        match self {
            TunnelError::Transport(err) => err,
            TunnelError::Timeout { after, .. } => TransportError::Timeout(after),
            other => TransportError::Upstream(Box::new(other)),
        }
    }
}

impl From<FrameError> for TunnelError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::BufferOverflow {
                requested, free, ..
            } => TunnelError::BufferOverflow {
                requested,
                free,
                line: String::new(),
            },
            FrameError::InvalidArgument { reason, fragment } => {
                TunnelError::InvalidArgument { reason, fragment }
            }
            FrameError::ProtocolViolation { reason, line } => {
                TunnelError::ProtocolViolation { reason, line }
            }
            FrameError::Transport(err) => TunnelError::Transport(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, TunnelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_maps_to_transport_timeout() {
        let err = TunnelError::Timeout {
            phase: WaitPhase::FrameAck,
            after: Duration::from_millis(20),
            last_line: None,
        };
        assert!(err.is_timeout());
        assert!(matches!(
            err.into_transport(),
            TransportError::Timeout(d) if d == Duration::from_millis(20)
        ));
    }

    #[test]
    fn protocol_errors_become_upstream() {
        let err = TunnelError::violation("unexpected", b"BINXT ERR\r");
        let transport = err.into_transport();
        assert!(matches!(transport, TransportError::Upstream(_)));
        assert!(transport.to_string().contains("BINXT ERR\\r"));
    }

    #[test]
    fn frame_errors_keep_their_kind() {
        let err: TunnelError = FrameError::InvalidArgument {
            reason: "no CR".to_string(),
            fragment: "abc".to_string(),
        }
        .into();
        assert!(matches!(err, TunnelError::InvalidArgument { .. }));
    }
}
