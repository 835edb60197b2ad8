use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::{Result, TransportError};
use crate::traits::DuplexConnection;

/// Smallest read timeout handed to the socket; a zero timeout would block forever.
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Configuration for TCP connections.
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Timeout for establishing the connection. Default: 1s.
    pub connect_timeout: Duration,
    /// Receive timeout for blocking reads. Default: 2s.
    pub recv_timeout: Duration,
    /// Disable Nagle's algorithm. Default: true.
    pub nodelay: bool,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(1),
            recv_timeout: Duration::from_secs(2),
            nodelay: true,
        }
    }
}

struct Streams {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    read_timeout: Duration,
}

/// A TCP client (or server-accepted) connection.
pub struct TcpConnection {
    addr: String,
    config: TcpConfig,
    streams: Option<Streams>,
    /// Accepted by a server; cannot be re-opened once closed.
    accepted: bool,
}

impl TcpConnection {
    /// Create an unconnected client for `addr` (`host:port`).
    pub fn new(addr: impl Into<String>) -> Self {
        Self::with_config(addr, TcpConfig::default())
    }

    /// Create an unconnected client with explicit configuration.
    pub fn with_config(addr: impl Into<String>, config: TcpConfig) -> Self {
        Self {
            addr: addr.into(),
            config,
            streams: None,
            accepted: false,
        }
    }

    /// Wrap an already connected stream, e.g. one returned by `accept`.
    pub fn from_stream(stream: TcpStream, config: TcpConfig) -> Result<Self> {
        let addr = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let mut conn = Self {
            addr,
            config,
            streams: None,
            accepted: true,
        };
        conn.install(stream)?;
        Ok(conn)
    }

    /// Remote address this connection targets.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Peer socket address of the open connection.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.streams
            .as_ref()
            .and_then(|s| s.writer.get_ref().peer_addr().ok())
    }

    /// Handle that can shut the socket down from another thread, unblocking
    /// any read in progress with a fatal error.
    pub fn shutdown_handle(&self) -> Result<Option<ShutdownHandle>> {
        match &self.streams {
            Some(streams) => Ok(Some(ShutdownHandle {
                stream: streams.writer.get_ref().try_clone()?,
            })),
            None => Ok(None),
        }
    }

    fn install(&mut self, stream: TcpStream) -> Result<()> {
        stream.set_nodelay(self.config.nodelay)?;
        let read_timeout = self.config.recv_timeout.max(MIN_READ_TIMEOUT);
        stream.set_read_timeout(Some(read_timeout))?;
        let reader = BufReader::new(stream.try_clone()?);
        self.streams = Some(Streams {
            reader,
            writer: BufWriter::new(stream),
            read_timeout,
        });
        Ok(())
    }

    fn drop_streams(&mut self) {
        if let Some(streams) = self.streams.take() {
            let _ = streams.writer.get_ref().shutdown(Shutdown::Both);
        }
    }

    fn lost(&mut self, reason: impl Into<String>) -> TransportError {
        self.drop_streams();
        TransportError::ConnectionLost(reason.into())
    }
}

impl DuplexConnection for TcpConnection {
    fn connect(&mut self) -> Result<()> {
        if self.streams.is_some() {
            return Ok(());
        }
        if self.accepted {
            return Err(TransportError::Connect {
                addr: self.addr.clone(),
                source: std::io::Error::new(
                    ErrorKind::Unsupported,
                    "connection was accepted by a server and cannot be reopened",
                ),
            });
        }

        let addrs = self
            .addr
            .to_socket_addrs()
            .map_err(|e| TransportError::Connect {
                addr: self.addr.clone(),
                source: e,
            })?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.config.connect_timeout) {
                Ok(stream) => {
                    self.install(stream)?;
                    debug!(addr = %self.addr, "connected to tcp endpoint");
                    return Ok(());
                }
                Err(err) => last_err = Some(err),
            }
        }

        Err(TransportError::Connect {
            addr: self.addr.clone(),
            source: last_err.unwrap_or_else(|| {
                std::io::Error::new(ErrorKind::NotFound, "address resolved to nothing")
            }),
        })
    }

    fn disconnect(&mut self) -> Result<()> {
        if let Some(mut streams) = self.streams.take() {
            let _ = streams.writer.flush();
            if let Err(err) = streams.writer.get_ref().shutdown(Shutdown::Both) {
                trace!(addr = %self.addr, error = %err, "shutdown warning");
            }
            debug!(addr = %self.addr, "disconnected tcp endpoint");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.streams.is_some()
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        let streams = self.streams.as_mut().ok_or(TransportError::NotConnected)?;
        if let Err(err) = streams.writer.write_all(bytes) {
            return Err(self.lost(err.to_string()));
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let streams = self.streams.as_mut().ok_or(TransportError::NotConnected)?;
        if let Err(err) = streams.writer.flush() {
            return Err(self.lost(err.to_string()));
        }
        Ok(())
    }

    fn read_raw_byte(&mut self, timeout: Duration) -> Result<Option<u8>> {
        let streams = self.streams.as_mut().ok_or(TransportError::NotConnected)?;

        let timeout = timeout.max(MIN_READ_TIMEOUT);
        if streams.read_timeout != timeout {
            streams.reader.get_ref().set_read_timeout(Some(timeout))?;
            streams.read_timeout = timeout;
        }

        let mut byte = [0u8; 1];
        loop {
            match streams.reader.read(&mut byte) {
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
        self.config.recv_timeout
    }

    fn set_recv_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.config.recv_timeout = timeout;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.addr)
    }
}

impl std::fmt::Debug for TcpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpConnection")
            .field("addr", &self.addr)
            .field("connected", &self.streams.is_some())
            .field("accepted", &self.accepted)
            .finish()
    }
}

/// Shuts down a [`TcpConnection`]'s socket from another thread.
#[derive(Debug)]
pub struct ShutdownHandle {
    stream: TcpStream,
}

impl ShutdownHandle {
    /// Shut down both directions. Blocked reads fail with `ConnectionLost`.
    pub fn shutdown(&self) -> Result<()> {
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(TransportError::Io(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::thread;

    use super::*;

    fn loopback() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    #[test]
    fn connect_send_and_read_bytes() {
        let (listener, addr) = loopback();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).unwrap();
            assert_eq!(&buf, b"ULK\r");
            stream.write_all(b"ULK OK\r").unwrap();
        });

        let mut conn = TcpConnection::new(addr);
        conn.connect().unwrap();
        conn.connect().unwrap();
        assert!(conn.is_connected());
        conn.send(b"ULK\r").unwrap();
        assert_eq!(conn.recv_until(b"\r").unwrap(), b"ULK OK\r");

        server.join().unwrap();
        conn.disconnect().unwrap();
        conn.disconnect().unwrap();
        assert!(!conn.is_connected());
    }

    #[test]
    fn read_times_out_with_none() {
        let (listener, addr) = loopback();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_millis(100));
            drop(stream);
        });

        let mut conn = TcpConnection::new(addr);
        conn.connect().unwrap();
        let got = conn.read_raw_byte(Duration::from_millis(10)).unwrap();
        assert!(got.is_none());
        server.join().unwrap();
    }

    #[test]
    fn remote_close_is_connection_lost() {
        let (listener, addr) = loopback();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            drop(stream);
        });

        let mut conn = TcpConnection::new(addr);
        conn.connect().unwrap();
        server.join().unwrap();

        let err = conn.read_raw_byte(Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, TransportError::ConnectionLost(_)));
        assert!(!conn.is_connected());
    }

    #[test]
    fn shutdown_handle_unblocks_reader() {
        let (listener, addr) = loopback();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_millis(500));
            drop(stream);
        });

        let mut conn = TcpConnection::with_config(
            addr,
            TcpConfig {
                recv_timeout: Duration::from_secs(5),
                ..TcpConfig::default()
            },
        );
        conn.connect().unwrap();
        let handle = conn.shutdown_handle().unwrap().unwrap();

        let closer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            handle.shutdown().unwrap();
        });

        let err = conn.read_raw_byte(Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, TransportError::ConnectionLost(_)));
        closer.join().unwrap();
        server.join().unwrap();
    }

    #[test]
    fn connect_refused_reports_address() {
        let (listener, addr) = loopback();
        drop(listener);

        let mut conn = TcpConnection::new(addr.clone());
        match conn.connect() {
            Err(TransportError::Connect { addr: reported, .. }) => assert_eq!(reported, addr),
            other => panic!("expected connect error, got {other:?}"),
        }
    }

    #[test]
    fn io_without_connect_fails() {
        let mut conn = TcpConnection::new("127.0.0.1:1");
        assert!(matches!(
            conn.write_raw(b"x"),
            Err(TransportError::NotConnected)
        ));
        assert!(conn.shutdown_handle().unwrap().is_none());
    }
}
