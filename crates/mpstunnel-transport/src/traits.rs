use std::time::Duration;

use crate::error::{Result, TransportError};

/// A bidirectional byte channel to a device.
///
/// Every transport binding (TCP, Unix sockets, a scripted test double, or a
/// tunnel layered over another connection) implements this one capability so
/// callers can swap them freely.
///
/// `connect` and `disconnect` are idempotent. `read_raw_byte` reports an
/// elapsed timeout as `Ok(None)`; any other failure is fatal for the
/// connection.
pub trait DuplexConnection: Send {
    /// Open the connection. Does nothing if already connected.
    fn connect(&mut self) -> Result<()>;

    /// Close the connection. Does nothing if already closed.
    fn disconnect(&mut self) -> Result<()>;

    /// Whether the connection is currently open.
    fn is_connected(&self) -> bool;

    /// Write all of `bytes` or fail.
    fn write_raw(&mut self, bytes: &[u8]) -> Result<()>;

    /// Push buffered output to the device.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Read a single byte, waiting at most `timeout`.
    ///
    /// Returns `Ok(None)` if nothing arrived in time.
    fn read_raw_byte(&mut self, timeout: Duration) -> Result<Option<u8>>;

    /// Configured receive timeout.
    fn recv_timeout(&self) -> Duration;

    /// Update the receive timeout used by subsequent reads.
    fn set_recv_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Short human-readable description for logs.
    fn describe(&self) -> String;

    /// Write `bytes` and flush.
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_raw(bytes)?;
        self.flush()
    }

    /// Receive one byte within the configured receive timeout.
    fn recv_byte(&mut self) -> Result<u8> {
        let timeout = self.recv_timeout();
        match self.read_raw_byte(timeout)? {
            Some(byte) => Ok(byte),
            None => Err(TransportError::Timeout(timeout)),
        }
    }

    /// Fill `buf` completely, failing with `Timeout` if a byte does not
    /// arrive within the receive timeout.
    fn recv_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        for slot in buf.iter_mut() {
            *slot = self.recv_byte()?;
        }
        Ok(())
    }

    /// Receive until one of `terminators` is read. The terminator is
    /// included in the returned bytes.
    fn recv_until(&mut self, terminators: &[u8]) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        loop {
            let byte = self.recv_byte()?;
            data.push(byte);
            if terminators.contains(&byte) {
                return Ok(data);
            }
        }
    }
}

impl<C: DuplexConnection + ?Sized> DuplexConnection for &mut C {
    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn disconnect(&mut self) -> Result<()> {
        (**self).disconnect()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write_raw(bytes)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn read_raw_byte(&mut self, timeout: Duration) -> Result<Option<u8>> {
        (**self).read_raw_byte(timeout)
    }

    fn recv_timeout(&self) -> Duration {
        (**self).recv_timeout()
    }

    fn set_recv_timeout(&mut self, timeout: Duration) -> Result<()> {
        (**self).set_recv_timeout(timeout)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

impl<C: DuplexConnection + ?Sized> DuplexConnection for Box<C> {
    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn disconnect(&mut self) -> Result<()> {
        (**self).disconnect()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write_raw(bytes)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn read_raw_byte(&mut self, timeout: Duration) -> Result<Option<u8>> {
        (**self).read_raw_byte(timeout)
    }

    fn recv_timeout(&self) -> Duration {
        (**self).recv_timeout()
    }

    fn set_recv_timeout(&mut self, timeout: Duration) -> Result<()> {
        (**self).set_recv_timeout(timeout)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
