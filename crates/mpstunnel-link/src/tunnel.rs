use std::time::Duration;

use mpstunnel_frame::{FrameAddress, FrameCodec, LineReader, LinkMode, SlaveEid};
use mpstunnel_transport::{DuplexConnection, TransportError};
use tracing::{debug, info, warn};

use crate::config::{RecvTimeoutPolicy, TunnelConfig};
use crate::downstream::DownstreamHandle;
use crate::error::{Result, TunnelError, WaitPhase};
use crate::link::LinkManager;
use crate::recv::RecvEngine;
use crate::send::SendEngine;

/// Session lifecycle of a tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Handshaking,
    Ready,
}

#[derive(Debug, Clone)]
struct Poison {
    requested: usize,
    free: usize,
    line: String,
}

/// A duplex channel to a slave device, tunneled through an MPS master.
///
/// Wraps any [`DuplexConnection`] to the master. Pass `&mut conn` to keep
/// ownership of the master connection; the tunnel never reconnects it on its
/// own. The tunnel is itself a [`DuplexConnection`], so it can stand in for a
/// direct device connection or carry another tunnel.
///
/// # Example
///
/// ```no_run
/// use mpstunnel_link::MpsTunnel;
/// use mpstunnel_transport::TcpConnection;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let eid = "0123456789ABCDEF".parse()?;
/// let mut tunnel = MpsTunnel::new(TcpConnection::new("192.168.2.239:10001"), Some(eid));
/// tunnel.connect()?;
/// tunnel.send(b"REV\r")?;
/// let reply = tunnel.recv_until(b"\r")?;
/// println!("{}", String::from_utf8_lossy(&reply));
/// tunnel.disconnect()?;
/// # Ok(())
/// # }
/// ```
pub struct MpsTunnel<C> {
    master: C,
    codec: Box<dyn FrameCodec>,
    eid: Option<SlaveEid>,
    config: TunnelConfig,
    reader: LineReader,
    downstream: DownstreamHandle,
    state: SessionState,
    poison: Option<Poison>,
}

impl<C: DuplexConnection> MpsTunnel<C> {
    /// Standard (`BINXT`) tunnel. With an EID, `connect` links the master to
    /// that slave; without one the link must already exist.
    pub fn new(master: C, eid: Option<SlaveEid>) -> Self {
        Self::with_config(master, eid, TunnelConfig::default())
    }

    /// Legacy (`DAT`) tunnel sending EID-addressed frames.
    pub fn legacy(master: C, eid: Option<SlaveEid>) -> Self {
        Self::with_config(master, eid, TunnelConfig::legacy())
    }

    pub fn with_config(master: C, eid: Option<SlaveEid>, config: TunnelConfig) -> Self {
        let codec = config.variant.codec(config.max_frame_size);
        Self::with_codec(master, eid, codec, config)
    }

    /// Tunnel speaking a custom codec. `config.variant` and
    /// `config.max_frame_size` are ignored in favor of `codec`.
    pub fn with_codec(
        master: C,
        eid: Option<SlaveEid>,
        codec: Box<dyn FrameCodec>,
        config: TunnelConfig,
    ) -> Self {
        Self {
            master,
            codec,
            eid,
            reader: LineReader::new(config.line),
            downstream: DownstreamHandle::new(config.downstream_capacity),
            state: SessionState::Disconnected,
            poison: None,
            config,
        }
    }

    /// Connect the master if needed and run the link handshake.
    ///
    /// Does nothing when the session is already ready. On failure the
    /// session is left disconnected; the master connection is not closed.
    pub fn connect(&mut self) -> Result<()> {
        self.check_poison()?;
        if self.config.link_mode == LinkMode::Unlinked && !self.codec.addresses_frames() {
            return Err(TunnelError::InvalidArgument {
                reason: format!(
                    "{} frames carry no slave address; unlinked mode needs an addressing codec",
                    self.codec.name()
                ),
                fragment: String::new(),
            });
        }
        if self.state == SessionState::Ready && self.master.is_connected() {
            return Ok(());
        }
        if !self.master.is_connected() {
            self.master.connect()?;
        }

        self.state = SessionState::Handshaking;
        self.reader.clear();
        debug!(
            master = %self.master.describe(),
            codec = self.codec.name(),
            mode = ?self.config.link_mode,
            "starting handshake"
        );

        match self.handshake() {
            Ok(()) => {
                self.state = SessionState::Ready;
                info!(master = %self.master.describe(), eid = ?self.eid, "tunnel ready");
                Ok(())
            }
            Err(err) => {
                self.state = SessionState::Disconnected;
                warn!(error = %err, "handshake failed");
                Err(err)
            }
        }
    }

    /// Unlink first when in linked mode, then disconnect the master.
    ///
    /// If unlinking fails the error is returned and the master stays
    /// connected.
    pub fn disconnect(&mut self) -> Result<()> {
        let unlink = self.state == SessionState::Ready
            && self.config.link_mode == LinkMode::Linked
            && self.master.is_connected();
        if unlink {
            self.link_manager().unlink()?;
        }

        self.state = SessionState::Disconnected;
        self.reader.clear();
        self.master.disconnect()?;
        debug!(master = %self.master.describe(), "tunnel disconnected");
        Ok(())
    }

    /// Tunnel `payload` to the slave.
    ///
    /// With the standard codec this returns once every frame is
    /// acknowledged. The legacy codec has no acknowledgment; success only
    /// means the frames were written.
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.check_poison()?;
        self.ensure_ready()?;

        let mut engine = SendEngine {
            master: &mut self.master,
            reader: &mut self.reader,
            codec: self.codec.as_ref(),
            downstream: &self.downstream,
            addr: FrameAddress {
                eid: self.eid.as_ref(),
                mode: self.config.link_mode,
            },
        };
        let result = engine.send(payload);
        let frames = self.track(result)?;
        debug!(frames, bytes = payload.len(), "payload tunneled");
        Ok(())
    }

    /// Receive one byte from the slave.
    ///
    /// Buffered bytes are served without I/O. Otherwise this waits up to the
    /// master's receive timeout for a downstream frame; what happens when
    /// none arrives depends on [`RecvTimeoutPolicy`].
    pub fn recv(&mut self) -> Result<Option<u8>> {
        let timeout = self.master.recv_timeout();
        match self.recv_within(timeout)? {
            Some(byte) => Ok(Some(byte)),
            None => match self.config.recv_timeout_policy {
                RecvTimeoutPolicy::Surface => Err(recv_timeout(timeout)),
                RecvTimeoutPolicy::EmptyRead => Ok(None),
            },
        }
    }

    /// Fill `buf` completely. Each byte may take up to the receive timeout.
    pub fn recv_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let timeout = self.master.recv_timeout();
        for slot in buf.iter_mut() {
            *slot = self.recv_within(timeout)?.ok_or_else(|| recv_timeout(timeout))?;
        }
        Ok(())
    }

    /// Receive until one of `terminators`, which is included in the result.
    pub fn recv_until(&mut self, terminators: &[u8]) -> Result<Vec<u8>> {
        let timeout = self.master.recv_timeout();
        let mut data = Vec::new();
        loop {
            let byte = self.recv_within(timeout)?.ok_or_else(|| recv_timeout(timeout))?;
            data.push(byte);
            if terminators.contains(&byte) {
                return Ok(data);
            }
        }
    }

    /// Bytes already decoded and waiting to be read.
    pub fn available(&self) -> usize {
        self.downstream.available()
    }

    /// Handle for draining buffered downstream bytes from another thread.
    pub fn downstream_handle(&self) -> DownstreamHandle {
        self.downstream.clone()
    }

    pub fn session_state(&self) -> SessionState {
        self.state
    }

    pub fn eid(&self) -> Option<&SlaveEid> {
        self.eid.as_ref()
    }

    pub fn config(&self) -> &TunnelConfig {
        &self.config
    }

    pub fn codec(&self) -> &dyn FrameCodec {
        self.codec.as_ref()
    }

    /// Whether a buffer overflow has made the tunnel unusable.
    pub fn is_poisoned(&self) -> bool {
        self.poison.is_some()
    }

    pub fn master(&self) -> &C {
        &self.master
    }

    pub fn master_mut(&mut self) -> &mut C {
        &mut self.master
    }

    /// Give back the master connection as it is. No unlink is sent.
    pub fn into_inner(self) -> C {
        self.master
    }

    fn recv_within(&mut self, timeout: Duration) -> Result<Option<u8>> {
        self.check_poison()?;
        if let Some(byte) = self.downstream.read_byte() {
            return Ok(Some(byte));
        }
        self.ensure_ready()?;

        let mut engine = RecvEngine {
            master: &mut self.master,
            reader: &mut self.reader,
            codec: self.codec.as_ref(),
            downstream: &self.downstream,
            mode: self.config.link_mode,
        };
        let result = engine.read(timeout);
        self.track(result)
    }

    fn handshake(&mut self) -> Result<()> {
        let mut links = LinkManager {
            master: &mut self.master,
            reader: &mut self.reader,
            codec: self.codec.as_ref(),
            link_timeout: self.config.link_timeout,
        };
        match (self.config.link_mode, self.eid.as_ref()) {
            (LinkMode::Linked, Some(eid)) => {
                links.unlink()?;
                links.link(eid)
            }
            (LinkMode::Linked, None) => Ok(()),
            (LinkMode::Unlinked, _) => links.unlink(),
        }
    }

    fn link_manager(&mut self) -> LinkManager<'_, C> {
        LinkManager {
            master: &mut self.master,
            reader: &mut self.reader,
            codec: self.codec.as_ref(),
            link_timeout: self.config.link_timeout,
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.state == SessionState::Ready {
            Ok(())
        } else {
            Err(TunnelError::Transport(TransportError::NotConnected))
        }
    }

    fn check_poison(&self) -> Result<()> {
        match &self.poison {
            Some(poison) => Err(TunnelError::BufferOverflow {
                requested: poison.requested,
                free: poison.free,
                line: poison.line.clone(),
            }),
            None => Ok(()),
        }
    }

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(TunnelError::BufferOverflow {
            requested,
            free,
            line,
        }) = &result
        {
            warn!(requested, free, "downstream overflow, tunnel poisoned");
            self.poison = Some(Poison {
                requested: *requested,
                free: *free,
                line: line.clone(),
            });
        }
        result
    }
}

fn recv_timeout(after: Duration) -> TunnelError {
    TunnelError::Timeout {
        phase: WaitPhase::Downstream,
        after,
        last_line: None,
    }
}

impl<C: DuplexConnection> DuplexConnection for MpsTunnel<C> {
    fn connect(&mut self) -> mpstunnel_transport::Result<()> {
        MpsTunnel::connect(self).map_err(TunnelError::into_transport)
    }

    fn disconnect(&mut self) -> mpstunnel_transport::Result<()> {
        MpsTunnel::disconnect(self).map_err(TunnelError::into_transport)
    }

    fn is_connected(&self) -> bool {
        self.state == SessionState::Ready && self.master.is_connected()
    }

    fn write_raw(&mut self, bytes: &[u8]) -> mpstunnel_transport::Result<()> {
        MpsTunnel::send(self, bytes).map_err(TunnelError::into_transport)
    }

    fn read_raw_byte(&mut self, timeout: Duration) -> mpstunnel_transport::Result<Option<u8>> {
        self.recv_within(timeout).map_err(TunnelError::into_transport)
    }

    fn recv_timeout(&self) -> Duration {
        self.master.recv_timeout()
    }

    fn set_recv_timeout(&mut self, timeout: Duration) -> mpstunnel_transport::Result<()> {
        self.master.set_recv_timeout(timeout)
    }

    fn describe(&self) -> String {
        match &self.eid {
            Some(eid) => format!(
                "{} tunnel to {} via {}",
                self.codec.name(),
                eid,
                self.master.describe()
            ),
            None => format!("{} tunnel via {}", self.codec.name(), self.master.describe()),
        }
    }
}

impl<C: DuplexConnection> std::fmt::Debug for MpsTunnel<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MpsTunnel")
            .field("master", &self.master.describe())
            .field("codec", &self.codec.name())
            .field("eid", &self.eid)
            .field("state", &self.state)
            .field("available", &self.downstream.available())
            .field("poisoned", &self.poison.is_some())
            .finish()
    }
}
