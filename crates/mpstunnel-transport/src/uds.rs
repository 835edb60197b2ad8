use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::DuplexConnection;

const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Unix domain socket connection.
///
/// Useful for masters exposed through a local socket bridge (e.g. a serial
/// multiplexer daemon) and for in-process socket pairs in tests.
pub struct UnixConnection {
    path: Option<PathBuf>,
    recv_timeout: Duration,
    reader: Option<BufReader<UnixStream>>,
    writer: Option<BufWriter<UnixStream>>,
    read_timeout: Duration,
}

impl UnixConnection {
    /// Default receive timeout: 2s.
    pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(2);

    /// Create an unconnected client for the socket at `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            recv_timeout: Self::DEFAULT_RECV_TIMEOUT,
            reader: None,
            writer: None,
            read_timeout: Duration::ZERO,
        }
    }

    /// Wrap an already connected stream. Such a connection cannot be
    /// reopened after `disconnect`.
    pub fn from_stream(stream: UnixStream) -> Result<Self> {
        let mut conn = Self {
            path: None,
            recv_timeout: Self::DEFAULT_RECV_TIMEOUT,
            reader: None,
            writer: None,
            read_timeout: Duration::ZERO,
        };
        conn.install(stream)?;
        Ok(conn)
    }

    /// A connected pair, mainly for tests.
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = UnixStream::pair()?;
        Ok((Self::from_stream(left)?, Self::from_stream(right)?))
    }

    /// Socket path, if this connection was created from one.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn install(&mut self, stream: UnixStream) -> Result<()> {
        let timeout = self.recv_timeout.max(MIN_READ_TIMEOUT);
        stream.set_read_timeout(Some(timeout))?;
        self.read_timeout = timeout;
        self.reader = Some(BufReader::new(stream.try_clone()?));
        self.writer = Some(BufWriter::new(stream));
        Ok(())
    }

    fn lost(&mut self, reason: impl Into<String>) -> TransportError {
        self.reader = None;
        if let Some(writer) = self.writer.take() {
            let _ = writer.get_ref().shutdown(std::net::Shutdown::Both);
        }
        TransportError::ConnectionLost(reason.into())
    }
}

impl DuplexConnection for UnixConnection {
    fn connect(&mut self) -> Result<()> {
        if self.writer.is_some() {
            return Ok(());
        }
        let path = self.path.clone().ok_or_else(|| TransportError::Connect {
            addr: "<unnamed>".to_string(),
            source: std::io::Error::new(
                ErrorKind::Unsupported,
                "socket pair connections cannot be reopened",
            ),
        })?;
        let stream = UnixStream::connect(&path).map_err(|e| TransportError::Connect {
            addr: path.display().to_string(),
            source: e,
        })?;
        self.install(stream)?;
        debug!(?path, "connected to unix domain socket");
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
            let _ = writer.get_ref().shutdown(std::net::Shutdown::Both);
        }
        self.reader = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.writer.is_some()
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(TransportError::NotConnected)?;
        if let Err(err) = writer.write_all(bytes) {
            return Err(self.lost(err.to_string()));
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(TransportError::NotConnected)?;
        if let Err(err) = writer.flush() {
            return Err(self.lost(err.to_string()));
        }
        Ok(())
    }

    fn read_raw_byte(&mut self, timeout: Duration) -> Result<Option<u8>> {
        let reader = self.reader.as_mut().ok_or(TransportError::NotConnected)?;
        let timeout = timeout.max(MIN_READ_TIMEOUT);
        if self.read_timeout != timeout {
            reader.get_ref().set_read_timeout(Some(timeout))?;
            self.read_timeout = timeout;
        }

        let mut byte = [0u8; 1];
        loop {
            match reader.read(&mut byte) {
                Ok(0) => return Err(self.lost("socket closed")),
                Ok(_) => return Ok(Some(byte[0])),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
                {
                    return Ok(None);
                }
                Err(err) => return Err(self.lost(err.to_string())),
            }
        }
    }

    fn recv_timeout(&self) -> Duration {
        self.recv_timeout
    }

    fn set_recv_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.recv_timeout = timeout;
        Ok(())
    }

    fn describe(&self) -> String {
        match &self.path {
            Some(path) => format!("unix://{}", path.display()),
            None => "unix://<pair>".to_string(),
        }
    }
}

impl std::fmt::Debug for UnixConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnixConnection")
            .field("path", &self.path)
            .field("connected", &self.writer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::net::UnixListener;
    use std::thread;

    use super::*;

    #[test]
    fn pair_roundtrip() {
        let (mut left, mut right) = UnixConnection::pair().unwrap();
        left.send(b"BINXT OK\r").unwrap();
        assert_eq!(right.recv_until(b"\r").unwrap(), b"BINXT OK\r");
        assert!(right.read_raw_byte(Duration::from_millis(5)).unwrap().is_none());
    }

    #[test]
    fn connect_by_path() {
        let dir = std::env::temp_dir().join(format!("mpstunnel-uds-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let sock_path = dir.join("master.sock");
        let _ = std::fs::remove_file(&sock_path);
        let listener = UnixListener::bind(&sock_path).unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"TOE\r").unwrap();
        });

        let mut conn = UnixConnection::new(&sock_path);
        conn.connect().unwrap();
        assert_eq!(conn.recv_until(b"\r").unwrap(), b"TOE\r");
        server.join().unwrap();

        let err = conn.read_raw_byte(Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, TransportError::ConnectionLost(_)));
        assert!(!conn.is_connected());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn pair_cannot_reconnect() {
        let (mut left, _right) = UnixConnection::pair().unwrap();
        left.disconnect().unwrap();
        assert!(matches!(
            left.connect(),
            Err(TransportError::Connect { .. })
        ));
    }
}
