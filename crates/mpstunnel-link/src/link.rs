use std::time::Duration;

use bytes::Bytes;
use mpstunnel_frame::{
    deadline_after, display_line, link_request, ControlLine, FrameCodec, LineRead, LineReader,
    SlaveEid, UNLINK_REQUEST,
};
use mpstunnel_transport::DuplexConnection;
use tracing::{debug, info, trace};

use crate::error::{Result, TunnelError, WaitPhase};

/// Runs the `ULK`/`LNK` exchange that tears down or establishes a session
/// between the master and one slave.
///
/// Each wait is bounded by `link_timeout`. Lines that are not the expected
/// reply are dropped; no session exists yet, so downstream frames seen here
/// have nowhere to go.
pub(crate) struct LinkManager<'a, C: ?Sized> {
    pub master: &'a mut C,
    pub reader: &'a mut LineReader,
    pub codec: &'a dyn FrameCodec,
    pub link_timeout: Duration,
}

impl<C: DuplexConnection + ?Sized> LinkManager<'_, C> {
    /// Drop whatever link the master holds. `ULK ERR` (nothing was linked)
    /// counts as success.
    pub fn unlink(&mut self) -> Result<()> {
        self.request(UNLINK_REQUEST)?;
        let (line, reply) = self.await_reply(WaitPhase::Unlink, |reply| {
            matches!(reply, ControlLine::UnlinkOk | ControlLine::UnlinkErr(_))
        })?;

        match reply {
            ControlLine::UnlinkOk => {
                debug!("unlinked");
                Ok(())
            }
            ControlLine::UnlinkErr(text) if text == "ERR" => {
                debug!("no link to drop");
                Ok(())
            }
            ControlLine::UnlinkErr(text) => Err(TunnelError::violation(
                format!("unexpected ULK response: {text}"),
                &line,
            )),
            _ => Err(TunnelError::violation("expected ULK response", &line)),
        }
    }

    /// Link the master to `eid`. Only `LNK <eid> OK` succeeds.
    pub fn link(&mut self, eid: &SlaveEid) -> Result<()> {
        self.request(&link_request(eid))?;
        let (line, reply) = self.await_reply(WaitPhase::Link, |reply| {
            matches!(reply, ControlLine::LinkOk(_) | ControlLine::LinkErr(_))
        })?;

        match reply {
            ControlLine::LinkOk(linked) if linked == eid.as_str() => {
                info!(eid = %eid, "linked to slave");
                Ok(())
            }
            ControlLine::LinkOk(linked) => Err(TunnelError::violation(
                format!("master linked {linked} instead of {eid}"),
                &line,
            )),
            ControlLine::LinkErr(text) => Err(TunnelError::violation(
                format!("unexpected LNK response: {text}"),
                &line,
            )),
            _ => Err(TunnelError::violation("expected LNK response", &line)),
        }
    }

    fn request(&mut self, line: &[u8]) -> Result<()> {
        trace!(line = %display_line(line), "send");
        self.master.write_raw(line)?;
        self.master.flush()?;
        Ok(())
    }

    fn await_reply(
        &mut self,
        phase: WaitPhase,
        wanted: fn(&ControlLine) -> bool,
    ) -> Result<(Bytes, ControlLine)> {
        let deadline = deadline_after(self.link_timeout);
        let mut last_line = None;

        loop {
            let line = match self.reader.read_line(&mut *self.master, deadline)? {
                LineRead::Line(line) => line,
                LineRead::NoLine => {
                    return Err(TunnelError::Timeout {
                        phase,
                        after: self.link_timeout,
                        last_line,
                    })
                }
            };

            let reply = self.codec.classify(&line);
            if wanted(&reply) {
                return Ok((line, reply));
            }
            match reply {
                ControlLine::DownstreamFrame => {
                    debug!(line = %display_line(&line), "discarding downstream frame during handshake");
                }
                other => {
                    debug!(kind = ?other, line = %display_line(&line), "ignoring line during handshake");
                }
            }
            last_line = Some(display_line(&line));
        }
    }
}

#[cfg(test)]
mod tests {
    use mpstunnel_frame::{LegacyCodec, StandardCodec};
    use mpstunnel_transport::ScriptedConnection;

    use super::*;

    const EID: &str = "0123456789ABCDEF";

    fn master() -> ScriptedConnection {
        let mut conn = ScriptedConnection::new().with_recv_timeout(Duration::from_millis(10));
        conn.connect().unwrap();
        conn
    }

    fn run<T>(
        conn: &mut ScriptedConnection,
        f: impl FnOnce(&mut LinkManager<'_, ScriptedConnection>) -> Result<T>,
    ) -> Result<T> {
        let mut reader = LineReader::default();
        let codec = StandardCodec::default();
        let mut links = LinkManager {
            master: conn,
            reader: &mut reader,
            codec: &codec,
            link_timeout: Duration::from_millis(60),
        };
        f(&mut links)
    }

    #[test]
    fn unlink_accepts_ok_and_err() {
        for reply in ["ULK OK\r", "ULK ERR\r"] {
            let mut conn = master().reply(reply);
            run(&mut conn, |links| links.unlink()).unwrap();
            assert_eq!(conn.written(), b"ULK\r");
        }
    }

    #[test]
    fn unlink_rejects_other_suffix() {
        let mut conn = master().reply("ULK BUSY\r");
        let err = run(&mut conn, |links| links.unlink()).unwrap_err();
        assert!(matches!(err, TunnelError::ProtocolViolation { .. }));
        assert!(err.to_string().contains("BUSY"));
    }

    #[test]
    fn link_waits_past_unrelated_lines() {
        let mut conn = master().reply(format!("BINXR 41\rHBT\rLNK {EID} OK\r"));
        let eid = SlaveEid::parse(EID).unwrap();
        run(&mut conn, |links| links.link(&eid)).unwrap();
        assert_eq!(conn.written(), format!("LNK {EID}\r").as_bytes());
    }

    #[test]
    fn link_err_is_protocol_violation() {
        let mut conn = master().reply(format!("LNK {EID} ERR\r"));
        let eid = SlaveEid::parse(EID).unwrap();
        let err = run(&mut conn, |links| links.link(&eid)).unwrap_err();
        assert!(matches!(err, TunnelError::ProtocolViolation { .. }));
    }

    #[test]
    fn link_to_other_eid_is_protocol_violation() {
        let mut conn = master().reply("LNK FFFFFFFFFFFFFFFF OK\r");
        let eid = SlaveEid::parse(EID).unwrap();
        let err = run(&mut conn, |links| links.link(&eid)).unwrap_err();
        assert!(err.to_string().contains("FFFFFFFFFFFFFFFF"));
    }

    #[test]
    fn silent_master_times_out() {
        let mut conn = master().reply("TOE\r");
        let err = run(&mut conn, |links| links.unlink()).unwrap_err();
        match err {
            TunnelError::Timeout {
                phase, last_line, ..
            } => {
                assert_eq!(phase, WaitPhase::Unlink);
                assert_eq!(last_line.as_deref(), Some("TOE\\r"));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn legacy_codec_handshakes_the_same_way() {
        let mut conn = master().reply("ULK OK\r");
        let mut reader = LineReader::default();
        let codec = LegacyCodec::default();
        LinkManager {
            master: &mut conn,
            reader: &mut reader,
            codec: &codec,
            link_timeout: Duration::from_millis(60),
        }
        .unlink()
        .unwrap();
    }
}
