use bytes::BytesMut;
use mpstunnel_frame::{
    deadline_after, display_line, ControlLine, FrameAddress, FrameCodec, LineRead, LineReader,
};
use mpstunnel_transport::DuplexConnection;
use tracing::{debug, trace};

use crate::downstream::DownstreamHandle;
use crate::error::{Result, TunnelError, WaitPhase};

/// Splits outbound payload into frames and pushes them through the master.
///
/// With an acknowledging codec every frame waits for its ACK before the next
/// one goes out. Downstream frames that arrive during the wait are decoded
/// into the shared queue.
pub(crate) struct SendEngine<'a, C: ?Sized> {
    pub master: &'a mut C,
    pub reader: &'a mut LineReader,
    pub codec: &'a dyn FrameCodec,
    pub downstream: &'a DownstreamHandle,
    pub addr: FrameAddress<'a>,
}

impl<C: DuplexConnection + ?Sized> SendEngine<'_, C> {
    /// Send all of `payload`; returns the number of frames written.
    ///
    /// Frame boundaries are validated before the first write, so a payload
    /// the codec cannot frame causes no I/O. A failure after that aborts the
    /// remaining frames; earlier frames were already delivered.
    pub fn send(&mut self, payload: &[u8]) -> Result<usize> {
        self.codec.check_payload(payload)?;
        let frames = self.split(payload)?;

        let mut wire = BytesMut::with_capacity(self.codec.max_frame_size() * 2 + 32);
        for frame in &frames {
            wire.clear();
            self.codec.encode(frame, &self.addr, &mut wire)?;
            trace!(codec = self.codec.name(), line = %display_line(&wire), "send frame");
            self.master.write_raw(&wire)?;
            self.master.flush()?;

            if self.codec.awaits_ack() {
                self.await_ack()?;
            }
        }
        Ok(frames.len())
    }

    fn split<'p>(&self, payload: &'p [u8]) -> Result<Vec<&'p [u8]>> {
        let mut frames = Vec::with_capacity(payload.len() / self.codec.max_frame_size() + 1);
        let mut rest = payload;
        while !rest.is_empty() {
            let len = self.codec.frame_len(rest)?;
            let (frame, tail) = rest.split_at(len);
            frames.push(frame);
            rest = tail;
        }
        Ok(frames)
    }

    fn await_ack(&mut self) -> Result<()> {
        let timeout = self.master.recv_timeout();
        let deadline = deadline_after(timeout);
        let mut last_line = None;

        loop {
            let line = match self.reader.read_line(&mut *self.master, deadline)? {
                LineRead::Line(line) => line,
                LineRead::NoLine => {
                    return Err(TunnelError::Timeout {
                        phase: WaitPhase::FrameAck,
                        after: timeout,
                        last_line,
                    })
                }
            };

            match self.codec.classify(&line) {
                ControlLine::FrameAck => return Ok(()),
                ControlLine::FrameError(text) => {
                    return Err(TunnelError::violation(
                        format!("frame rejected by master: {text}"),
                        &line,
                    ))
                }
                ControlLine::LinkBroken => return Err(TunnelError::link_broken(&line)),
                ControlLine::DownstreamFrame => {
                    self.downstream.absorb(self.codec, &line, self.addr.mode)?;
                }
                other => {
                    debug!(kind = ?other, line = %display_line(&line), "ignoring line while awaiting ack");
                    last_line = Some(display_line(&line));
                }
            }
        }
    }
}
