//! A minimal MPS master for experiments and tests.
//!
//! [`MasterEmulator`] answers one line at a time: it tracks a single link,
//! acknowledges every `BINXT` frame and echoes the payload back as `BINXR`,
//! and echoes `DAT` lines back the way a slave answering with the same text
//! would appear. [`serve`] runs it over TCP, one emulator per client.

use std::time::{Duration, Instant};

use mpstunnel_frame::{
    display_line, LineConfig, LineRead, LineReader, SlaveEid, BINXT_ACK, BINXT_PREFIX, CR,
    DAT_PREFIX,
};
use mpstunnel_transport::{DuplexConnection, Result, TcpConnection, TcpServer};
use tracing::{debug, info, warn};

/// How long a client may stay silent before its read loop re-polls.
const IDLE_POLL: Duration = Duration::from_secs(1);

/// Line-level state machine of an emulated master.
#[derive(Debug, Default)]
pub struct MasterEmulator {
    linked: Option<SlaveEid>,
    frames: usize,
}

impl MasterEmulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slave currently linked, if any.
    pub fn linked(&self) -> Option<&SlaveEid> {
        self.linked.as_ref()
    }

    /// Number of `BINXT` and `DAT` frames accepted so far.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Answer one CR-terminated request. Returns the bytes to send back,
    /// which may hold several lines or none.
    pub fn respond(&mut self, line: &[u8]) -> Vec<u8> {
        let body = line.strip_suffix(&[CR]).unwrap_or(line);
        let text = String::from_utf8_lossy(body);

        if body == b"ULK" {
            return match self.linked.take() {
                Some(eid) => {
                    debug!(%eid, "emulator unlinked");
                    b"ULK OK\r".to_vec()
                }
                None => b"ULK ERR\r".to_vec(),
            };
        }

        if let Some(eid) = text.strip_prefix("LNK ") {
            return match SlaveEid::parse(eid) {
                Ok(eid) => {
                    let reply = format!("LNK {eid} OK\r").into_bytes();
                    info!(%eid, "emulator linked");
                    self.linked = Some(eid);
                    reply
                }
                Err(_) => format!("LNK {eid} ERR\r").into_bytes(),
            };
        }

        if let Some(hex_payload) = body.strip_prefix(BINXT_PREFIX) {
            return match hex::decode(hex_payload) {
                Ok(payload) => {
                    self.frames += 1;
                    let mut reply = BINXT_ACK.to_vec();
                    reply.extend_from_slice(b"BINXR ");
                    reply.extend_from_slice(hex::encode_upper(&payload).as_bytes());
                    reply.push(CR);
                    reply
                }
                Err(_) => b"BINXT ERR-HEX\r".to_vec(),
            };
        }

        if let Some(message) = body.strip_prefix(DAT_PREFIX) {
            self.frames += 1;
            let mut reply = DAT_PREFIX.to_vec();
            reply.extend_from_slice(message);
            reply.extend_from_slice(b" -xxx\r");
            return reply;
        }

        warn!(line = %display_line(line), "emulator ignoring unknown command");
        Vec::new()
    }
}

/// Drive one client connection until it closes.
pub fn run_client<C: DuplexConnection + ?Sized>(conn: &mut C) -> Result<()> {
    let mut emulator = MasterEmulator::new();
    let mut reader = LineReader::new(LineConfig::default());
    loop {
        let line = match reader.read_line(conn, Instant::now() + IDLE_POLL) {
            Ok(LineRead::Line(line)) => line,
            Ok(LineRead::NoLine) => continue,
            Err(mpstunnel_frame::FrameError::Transport(err)) => return Err(err),
            Err(err) => {
                warn!(error = %err, "emulator dropping malformed input");
                reader.clear();
                continue;
            }
        };
        let reply = emulator.respond(&line);
        if !reply.is_empty() {
            conn.send(&reply)?;
        }
    }
}

/// Serve emulated masters on `server` until its handle is stopped.
pub fn serve(server: &TcpServer) -> Result<()> {
    server.serve(|mut conn: TcpConnection| {
        let peer = conn
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_default();
        if let Err(err) = run_client(&mut conn) {
            debug!(%peer, error = %err, "emulator client finished");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EID: &str = "0123456789ABCDEF";

    #[test]
    fn unlink_reports_previous_state() {
        let mut master = MasterEmulator::new();
        assert_eq!(master.respond(b"ULK\r"), b"ULK ERR\r");
        master.respond(format!("LNK {EID}\r").as_bytes());
        assert_eq!(master.respond(b"ULK\r"), b"ULK OK\r");
        assert!(master.linked().is_none());
    }

    #[test]
    fn link_validates_eid() {
        let mut master = MasterEmulator::new();
        assert_eq!(
            master.respond(format!("LNK {EID}\r").as_bytes()),
            format!("LNK {EID} OK\r").as_bytes()
        );
        assert_eq!(master.linked().map(SlaveEid::as_str), Some(EID));
        assert_eq!(master.respond(b"LNK 12\r"), b"LNK 12 ERR\r");
    }

    #[test]
    fn binxt_is_acked_and_echoed() {
        let mut master = MasterEmulator::new();
        assert_eq!(
            master.respond(b"BINXT 48690D\r"),
            b"BINXT OK\rBINXR 48690D\r"
        );
        assert_eq!(master.respond(b"BINXT XYZ\r"), b"BINXT ERR-HEX\r");
        assert_eq!(master.frames(), 1);
    }

    #[test]
    fn dat_is_echoed_with_trailer() {
        let mut master = MasterEmulator::new();
        assert_eq!(
            master.respond(format!("DAT {EID} REV\r").as_bytes()),
            format!("DAT {EID} REV -xxx\r").as_bytes()
        );
    }

    #[test]
    fn unknown_lines_get_no_answer() {
        let mut master = MasterEmulator::new();
        assert!(master.respond(b"HBT\r").is_empty());
    }
}
