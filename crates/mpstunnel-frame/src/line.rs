use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use mpstunnel_transport::DuplexConnection;
use tracing::trace;

use crate::codec::{display_line, CR};
use crate::error::{FrameError, Result};

/// Default upper bound on one received line, CR included.
pub const DEFAULT_MAX_LINE_LEN: usize = 4096;

const INITIAL_LINE_CAPACITY: usize = 256;

/// Longest wait a deadline is allowed to express; larger timeouts are clamped.
pub const MAX_WAIT: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Deadline `timeout` from now. Saturates instead of overflowing `Instant`.
pub fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout.min(MAX_WAIT))
        .or_else(|| now.checked_add(Duration::from_secs(24 * 60 * 60)))
        .unwrap_or(now)
}

/// Line reader configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineConfig {
    /// Longest accepted line. Longer input is a protocol violation.
    pub max_line_len: usize,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}

impl LineConfig {
    pub fn with_max_line_len(mut self, max_line_len: usize) -> Self {
        self.max_line_len = max_line_len.max(1);
        self
    }
}

/// Outcome of one [`LineReader::read_line`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    /// A complete line, trailing CR included.
    Line(Bytes),
    /// The deadline passed before a CR arrived.
    NoLine,
}

/// Assembles CR-terminated lines from a [`DuplexConnection`], one byte at a
/// time.
///
/// Bytes of an unfinished line survive a `NoLine` result and are completed by
/// the next call, so a slow master never loses data.
#[derive(Debug)]
pub struct LineReader {
    partial: BytesMut,
    config: LineConfig,
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new(LineConfig::default())
    }
}

impl LineReader {
    pub fn new(config: LineConfig) -> Self {
        Self {
            partial: BytesMut::with_capacity(INITIAL_LINE_CAPACITY),
            config,
        }
    }

    /// Read until CR or until `deadline` passes.
    ///
    /// Each raw read waits at most the connection's receive timeout or the
    /// time left until `deadline`, whichever is shorter.
    pub fn read_line<C>(&mut self, conn: &mut C, deadline: Instant) -> Result<LineRead>
    where
        C: DuplexConnection + ?Sized,
    {
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(LineRead::NoLine);
            }
            let wait = conn.recv_timeout().min(deadline - now).max(Duration::from_millis(1));

            let Some(byte) = conn.read_raw_byte(wait)? else {
                continue;
            };

            if self.partial.len() >= self.config.max_line_len {
                let err = FrameError::ProtocolViolation {
                    reason: format!("line exceeds {} bytes", self.config.max_line_len),
                    line: display_line(&self.partial[..self.partial.len().min(64)]),
                };
                self.partial.clear();
                return Err(err);
            }
            self.partial.extend_from_slice(&[byte]);

            if byte == CR {
                let line = self.partial.split().freeze();
                trace!(line = %display_line(&line), "line received");
                return Ok(LineRead::Line(line));
            }
        }
    }

    /// Bytes of the unfinished line held so far.
    pub fn pending(&self) -> &[u8] {
        &self.partial
    }

    /// Drop any unfinished line.
    pub fn clear(&mut self) {
        self.partial.clear();
    }

    pub fn config(&self) -> &LineConfig {
        &self.config
    }
}
