use std::fmt;
use std::io;

use mpstunnel_link::TunnelError;
use mpstunnel_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::AddrInUse
        | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
        io::ErrorKind::NotFound | io::ErrorKind::InvalidInput => USAGE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        TransportError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn tunnel_error(context: &str, err: TunnelError) -> CliError {
    match err {
        TunnelError::Transport(err) => transport_error(context, err),
        TunnelError::Timeout { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        TunnelError::InvalidArgument { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        TunnelError::ProtocolViolation { .. }
        | TunnelError::LinkBroken { .. }
        | TunnelError::BufferOverflow { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use mpstunnel_link::WaitPhase;

    #[test]
    fn tunnel_timeouts_map_to_timeout() {
        let err = TunnelError::Timeout {
            phase: WaitPhase::FrameAck,
            after: Duration::from_secs(2),
            last_line: None,
        };
        assert_eq!(tunnel_error("send", err).code, TIMEOUT);

        let err = TunnelError::Transport(TransportError::Timeout(Duration::from_secs(1)));
        assert_eq!(tunnel_error("recv", err).code, TIMEOUT);
    }

    #[test]
    fn protocol_errors_map_to_data_invalid() {
        let err = TunnelError::ProtocolViolation {
            reason: "frame rejected by master: BINXT ERR-FOO".to_string(),
            line: "BINXT ERR-FOO\\r".to_string(),
        };
        assert_eq!(tunnel_error("send", err).code, DATA_INVALID);
    }

    #[test]
    fn refused_connection_is_transport_error() {
        let err = TransportError::Connect {
            addr: "127.0.0.1:1".to_string(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        assert_eq!(transport_error("connect", err).code, TRANSPORT_ERROR);
        assert_eq!(
            transport_error("recv", TransportError::NotConnected).code,
            TRANSPORT_ERROR
        );
    }
}
