//! A scripted in-memory connection for exercising protocol layers.
//!
//! Every CR-terminated line written to the connection pops the next queued
//! reply (or asks the responder closure) and makes those bytes readable.

use std::collections::VecDeque;
use std::time::Duration;

use tracing::trace;

use crate::error::{Result, TransportError};
use crate::traits::DuplexConnection;

type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

/// In-memory [`DuplexConnection`] driven by a reply script.
pub struct ScriptedConnection {
    connected: bool,
    recv_timeout: Duration,
    inbound: VecDeque<u8>,
    replies: VecDeque<Vec<u8>>,
    responder: Option<Responder>,
    written: Vec<u8>,
    pending_line: Vec<u8>,
    remote_closed: bool,
    connect_calls: usize,
    disconnect_calls: usize,
}

impl Default for ScriptedConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedConnection {
    pub fn new() -> Self {
        Self {
            connected: false,
            recv_timeout: Duration::from_millis(50),
            inbound: VecDeque::new(),
            replies: VecDeque::new(),
            responder: None,
            written: Vec::new(),
            pending_line: Vec::new(),
            remote_closed: false,
            connect_calls: 0,
            disconnect_calls: 0,
        }
    }

    /// Set the initial receive timeout.
    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }

    /// Queue the reply sent back after the next unanswered outbound line.
    pub fn reply(mut self, bytes: impl AsRef<[u8]>) -> Self {
        self.replies.push_back(bytes.as_ref().to_vec());
        self
    }

    /// Answer every outbound line not covered by [`reply`](Self::reply)
    /// with whatever `responder` returns for it.
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Vec<u8> + Send + 'static,
    {
        self.responder = Some(Box::new(responder));
        self
    }

    /// Make `bytes` readable right away, independent of any outbound line.
    pub fn push_inbound(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes.iter().copied());
    }

    /// Simulate the remote end closing the stream once buffered input is
    /// drained.
    pub fn close_remote(&mut self) {
        self.remote_closed = true;
    }

    /// All bytes written so far.
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Written bytes split into CR-terminated lines (CR included).
    pub fn written_lines(&self) -> Vec<Vec<u8>> {
        self.written
            .split_inclusive(|b| *b == b'\r')
            .map(<[u8]>::to_vec)
            .collect()
    }

    /// Number of `connect` calls observed.
    pub fn connect_calls(&self) -> usize {
        self.connect_calls
    }

    /// Number of `disconnect` calls observed.
    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls
    }

    /// Bytes still waiting to be read.
    pub fn pending_inbound(&self) -> usize {
        self.inbound.len()
    }

    fn answer(&mut self, line: &[u8]) {
        let reply = match self.replies.pop_front() {
            Some(reply) => Some(reply),
            None => self.responder.as_mut().map(|responder| responder(line)),
        };
        if let Some(reply) = reply {
            trace!(
                line = %String::from_utf8_lossy(line).trim_end(),
                reply = %String::from_utf8_lossy(&reply).trim_end(),
                "scripted reply"
            );
            self.inbound.extend(reply);
        }
    }
}

impl DuplexConnection for ScriptedConnection {
    fn connect(&mut self) -> Result<()> {
        self.connect_calls += 1;
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.disconnect_calls += 1;
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        self.written.extend_from_slice(bytes);
        for &byte in bytes {
            self.pending_line.push(byte);
            if byte == b'\r' {
                let line = std::mem::take(&mut self.pending_line);
                self.answer(&line);
            }
        }
        Ok(())
    }

    fn read_raw_byte(&mut self, timeout: Duration) -> Result<Option<u8>> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if let Some(byte) = self.inbound.pop_front() {
            return Ok(Some(byte));
        }
        if self.remote_closed {
            self.connected = false;
            return Err(TransportError::ConnectionLost(
                "scripted remote closed".to_string(),
            ));
        }
        std::thread::sleep(timeout);
        Ok(None)
    }

    fn recv_timeout(&self) -> Duration {
        self.recv_timeout
    }

    fn set_recv_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.recv_timeout = timeout;
        Ok(())
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replies_follow_outbound_lines() {
        let mut conn = ScriptedConnection::new()
            .reply("ULK OK\r")
            .reply("LNK 0123456789ABCDEF OK\r");
        conn.connect().unwrap();

        assert_eq!(conn.pending_inbound(), 0);
        conn.write_raw(b"UL").unwrap();
        assert_eq!(conn.pending_inbound(), 0, "no reply before CR");
        conn.write_raw(b"K\r").unwrap();
        assert_eq!(conn.recv_until(b"\r").unwrap(), b"ULK OK\r");

        conn.send(b"LNK 0123456789ABCDEF\r").unwrap();
        assert_eq!(
            conn.recv_until(b"\r").unwrap(),
            b"LNK 0123456789ABCDEF OK\r"
        );
        assert_eq!(conn.written_lines().len(), 2);
    }

    #[test]
    fn responder_answers_after_script_runs_out() {
        let mut conn = ScriptedConnection::new()
            .reply("first\r")
            .with_responder(|_| b"again\r".to_vec());
        conn.connect().unwrap();

        conn.send(b"a\r").unwrap();
        conn.send(b"b\r").unwrap();
        assert_eq!(conn.recv_until(b"\r").unwrap(), b"first\r");
        assert_eq!(conn.recv_until(b"\r").unwrap(), b"again\r");
    }

    #[test]
    fn empty_input_times_out_without_error() {
        let mut conn = ScriptedConnection::new();
        conn.connect().unwrap();
        let got = conn.read_raw_byte(Duration::from_millis(1)).unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn closed_remote_is_fatal() {
        let mut conn = ScriptedConnection::new();
        conn.connect().unwrap();
        conn.push_inbound(b"x");
        conn.close_remote();

        assert_eq!(conn.read_raw_byte(Duration::from_millis(1)).unwrap(), Some(b'x'));
        let err = conn.read_raw_byte(Duration::from_millis(1)).unwrap_err();
        assert!(matches!(err, TransportError::ConnectionLost(_)));
        assert!(!conn.is_connected());
    }

    #[test]
    fn io_requires_connect() {
        let mut conn = ScriptedConnection::new();
        assert!(matches!(
            conn.write_raw(b"x"),
            Err(TransportError::NotConnected)
        ));
    }
}
