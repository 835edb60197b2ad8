use std::time::Duration;

use mpstunnel_frame::{
    deadline_after, display_line, ControlLine, FrameCodec, LineRead, LineReader, LinkMode,
};
use mpstunnel_transport::DuplexConnection;
use tracing::{debug, warn};

use crate::downstream::DownstreamHandle;
use crate::error::{Result, TunnelError};

/// Serves downstream bytes, pulling frames from the master when the queue
/// runs dry.
pub(crate) struct RecvEngine<'a, C: ?Sized> {
    pub master: &'a mut C,
    pub reader: &'a mut LineReader,
    pub codec: &'a dyn FrameCodec,
    pub downstream: &'a DownstreamHandle,
    pub mode: LinkMode,
}

impl<C: DuplexConnection + ?Sized> RecvEngine<'_, C> {
    /// Pop one byte, waiting at most `timeout` for a downstream frame.
    ///
    /// Returns `Ok(None)` once the wait expires without data.
    pub fn read(&mut self, timeout: Duration) -> Result<Option<u8>> {
        if let Some(byte) = self.downstream.read_byte() {
            return Ok(Some(byte));
        }

        let deadline = deadline_after(timeout);
        loop {
            let line = match self.reader.read_line(&mut *self.master, deadline)? {
                LineRead::Line(line) => line,
                LineRead::NoLine => return Ok(None),
            };

            match self.codec.classify(&line) {
                ControlLine::LinkBroken => return Err(TunnelError::link_broken(&line)),
                ControlLine::DownstreamFrame => {
                    self.downstream.absorb(self.codec, &line, self.mode)?;
                    if let Some(byte) = self.downstream.read_byte() {
                        return Ok(Some(byte));
                    }
                }
                ControlLine::FrameAck | ControlLine::FrameError(_) => {
                    warn!(line = %display_line(&line), "stray frame response while receiving");
                }
                other => {
                    debug!(kind = ?other, line = %display_line(&line), "ignoring line while receiving");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use mpstunnel_frame::{LegacyCodec, StandardCodec};
    use mpstunnel_transport::ScriptedConnection;

    use super::*;

    fn master(inbound: &[u8]) -> ScriptedConnection {
        let mut conn = ScriptedConnection::new().with_recv_timeout(Duration::from_millis(20));
        conn.connect().unwrap();
        conn.push_inbound(inbound);
        conn
    }

    fn read_all(
        conn: &mut ScriptedConnection,
        codec: &dyn FrameCodec,
        mode: LinkMode,
        downstream: &DownstreamHandle,
        max: usize,
    ) -> Result<Vec<u8>> {
        let mut reader = LineReader::default();
        let mut engine = RecvEngine {
            master: conn,
            reader: &mut reader,
            codec,
            downstream,
            mode,
        };
        let mut out = Vec::new();
        while out.len() < max {
            match engine.read(Duration::from_millis(40))? {
                Some(byte) => out.push(byte),
                None => break,
            }
        }
        Ok(out)
    }

    #[test]
    fn skips_unrelated_lines_until_downstream() {
        let mut conn = master(b"HBT\rLNK 0123456789ABCDEF OK\rBINXR 6869\r");
        let downstream = DownstreamHandle::new(64);

        let got = read_all(
            &mut conn,
            &StandardCodec::default(),
            LinkMode::Linked,
            &downstream,
            2,
        )
        .unwrap();
        assert_eq!(got, b"hi");
    }

    #[test]
    fn buffered_bytes_need_no_io() {
        let mut conn = master(b"");
        let downstream = DownstreamHandle::new(64);
        downstream
            .absorb(&StandardCodec::default(), b"BINXR 41\r", LinkMode::Linked)
            .unwrap();
        conn.close_remote();

        let got = read_all(
            &mut conn,
            &StandardCodec::default(),
            LinkMode::Linked,
            &downstream,
            1,
        )
        .unwrap();
        assert_eq!(got, b"A");
        assert!(conn.is_connected());
    }

    #[test]
    fn toe_fails_read() {
        let mut conn = master(b"TOE\r");
        let downstream = DownstreamHandle::new(64);

        let err = read_all(
            &mut conn,
            &StandardCodec::default(),
            LinkMode::Linked,
            &downstream,
            1,
        )
        .unwrap_err();
        assert!(matches!(err, TunnelError::LinkBroken { .. }));
    }

    #[test]
    fn empty_frame_keeps_waiting() {
        let mut conn = master(b"BINXR \rBINXR 7A\r");
        let downstream = DownstreamHandle::new(64);

        let got = read_all(
            &mut conn,
            &StandardCodec::default(),
            LinkMode::Linked,
            &downstream,
            1,
        )
        .unwrap();
        assert_eq!(got, b"z");
    }

    #[test]
    fn silence_yields_none() {
        let mut conn = master(b"");
        let downstream = DownstreamHandle::new(64);

        let got = read_all(
            &mut conn,
            &StandardCodec::default(),
            LinkMode::Linked,
            &downstream,
            1,
        )
        .unwrap();
        assert!(got.is_empty());
    }

    #[test]
    fn legacy_only_takes_dat_lines() {
        let mut conn = master(b"BINXR 41\rDAT 00112233AABBCCDD pong -xxx\r");
        let downstream = DownstreamHandle::new(64);

        let got = read_all(
            &mut conn,
            &LegacyCodec::default(),
            LinkMode::Unlinked,
            &downstream,
            5,
        )
        .unwrap();
        assert_eq!(got, b"pong\r");
    }
}
