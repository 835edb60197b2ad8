use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::tcp::{TcpConfig, TcpConnection};

/// How often the accept loop re-checks its stop flag.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// A minimal TCP accept loop.
///
/// Each accepted socket is wrapped in a [`TcpConnection`] and handed to a
/// handler running on its own thread.
pub struct TcpServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    client_config: TcpConfig,
    running: Arc<AtomicBool>,
}

impl TcpServer {
    /// Bind to `addr` (`host:port`, port 0 picks an ephemeral port).
    pub fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(|e| TransportError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "listening on tcp");
        Ok(Self {
            listener,
            local_addr,
            client_config: TcpConfig::default(),
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Configuration applied to accepted connections.
    pub fn with_client_config(mut self, config: TcpConfig) -> Self {
        self.client_config = config;
        self
    }

    /// Address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle that stops [`serve`](Self::serve) from another thread.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            running: Arc::clone(&self.running),
        }
    }

    /// Accept one connection (blocking).
    pub fn accept(&self) -> Result<TcpConnection> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(%peer, "accepted connection");
        TcpConnection::from_stream(stream, self.client_config.clone())
    }

    fn client(&self, stream: TcpStream) -> Result<TcpConnection> {
        stream.set_nonblocking(false)?;
        TcpConnection::from_stream(stream, self.client_config.clone())
    }

    /// Run the accept loop until stopped, spawning `handler` per client.
    ///
    /// Handler threads are detached; a failing client never stops the loop.
    pub fn serve<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(TcpConnection) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        self.listener.set_nonblocking(true)?;

        while self.running.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    let conn = match self.client(stream) {
                        Ok(conn) => conn,
                        Err(err) => {
                            warn!(%peer, error = %err, "failed to set up client connection");
                            continue;
                        }
                    };
                    debug!(%peer, "accepted connection");
                    let handler = Arc::clone(&handler);
                    thread::spawn(move || handler(conn));
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Accept(err)),
            }
        }

        self.listener.set_nonblocking(false)?;
        debug!(local_addr = %self.local_addr, "accept loop stopped");
        Ok(())
    }
}

/// Stops a running [`TcpServer::serve`] loop.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    running: Arc<AtomicBool>,
}

impl ServerHandle {
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
