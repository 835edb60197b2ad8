use std::sync::Arc;

use mpstunnel_frame::{display_line, FrameCodec, FrameError, LinkMode, RingBuffer};
use parking_lot::Mutex;
use tracing::trace;

use crate::error::{Result, TunnelError};

/// Shared view of a tunnel's downstream queue.
///
/// Clones share one buffer. A handle only drains bytes the tunnel already
/// decoded; it never touches the master connection, so it can be used from
/// another thread while the tunnel owner is blocked in `send`.
#[derive(Clone)]
pub struct DownstreamHandle {
    ring: Arc<Mutex<RingBuffer>>,
}

impl DownstreamHandle {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            ring: Arc::new(Mutex::new(RingBuffer::new(capacity))),
        }
    }

    /// Bytes buffered and ready to read.
    pub fn available(&self) -> usize {
        self.ring.lock().available()
    }

    pub fn capacity(&self) -> usize {
        self.ring.lock().capacity()
    }

    /// Pop one buffered byte.
    pub fn read_byte(&self) -> Option<u8> {
        self.ring.lock().read()
    }

    /// Pop up to `dst.len()` buffered bytes.
    pub fn read_into(&self, dst: &mut [u8]) -> usize {
        self.ring.lock().read_into(dst)
    }

    /// Take everything currently buffered.
    pub fn drain(&self) -> Vec<u8> {
        let mut ring = self.ring.lock();
        let mut out = vec![0u8; ring.available()];
        let n = ring.read_into(&mut out);
        out.truncate(n);
        out
    }

    /// Decode a downstream line and queue its payload.
    pub(crate) fn absorb(&self, codec: &dyn FrameCodec, line: &[u8], mode: LinkMode) -> Result<()> {
        let payload = codec.decode_downstream(line, mode)?;
        trace!(len = payload.len(), "downstream frame");
        self.ring.lock().write(&payload).map_err(|err| match err {
            FrameError::BufferOverflow {
                requested, free, ..
            } => TunnelError::BufferOverflow {
                requested,
                free,
                line: display_line(line),
            },
            other => other.into(),
        })
    }
}

impl std::fmt::Debug for DownstreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DownstreamHandle")
            .field(&*self.ring.lock())
            .finish()
    }
}
