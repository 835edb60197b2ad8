//! Duplex connection abstraction for device links.
//!
//! Provides one [`DuplexConnection`] capability over different byte-stream
//! transports:
//! - TCP (client and server-accepted sockets)
//! - Unix domain sockets (Linux/macOS)
//! - an in-memory scripted connection for protocol tests
//!
//! This is the lowest layer of mpstunnel. The tunnel engine consumes any
//! [`DuplexConnection`] and is itself one, so tunnels can be nested.

pub mod error;
pub mod scripted;
pub mod server;
pub mod tcp;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use scripted::ScriptedConnection;
pub use server::{ServerHandle, TcpServer};
pub use tcp::{ShutdownHandle, TcpConfig, TcpConnection};
pub use traits::DuplexConnection;

#[cfg(unix)]
pub use uds::UnixConnection;
