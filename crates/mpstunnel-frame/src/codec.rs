use std::fmt;

use bytes::BytesMut;

use crate::eid::SlaveEid;
use crate::error::Result;

/// Line terminator of every MPS command and response.
pub const CR: u8 = b'\r';

/// Default maximum payload bytes per frame.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 96;

/// `TOE`: the master lost its link to the slave device.
pub const LINK_BROKEN: &[u8] = b"TOE\r";
/// Unlink request.
pub const UNLINK_REQUEST: &[u8] = b"ULK\r";
/// Prefix of link requests and responses.
pub const LINK_PREFIX: &[u8] = b"LNK ";
/// Prefix of unlink responses.
pub const UNLINK_PREFIX: &[u8] = b"ULK ";

/// Whether a persistent point-to-point session to one slave is in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    /// No session; frames that need an address carry the slave EID.
    Unlinked,
    /// Session established; frames need no address.
    Linked,
}

/// Addressing context for one outbound frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameAddress<'a> {
    pub eid: Option<&'a SlaveEid>,
    pub mode: LinkMode,
}

/// Classification of one CR-terminated line received from the master.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlLine {
    /// `LNK <eid> OK`: link established to `eid`.
    LinkOk(String),
    /// Any other `LNK ...` response; holds the text after `LNK `.
    LinkErr(String),
    /// `ULK OK`.
    UnlinkOk,
    /// Any other `ULK ...` response; holds the text after `ULK `.
    /// `ERR` means nothing was linked.
    UnlinkErr(String),
    /// Frame acknowledged by the slave.
    FrameAck,
    /// Frame rejected; holds the response text.
    FrameError(String),
    /// Downstream payload; decode with [`FrameCodec::decode_downstream`].
    DownstreamFrame,
    /// `TOE`: link to the slave is broken.
    LinkBroken,
    /// Anything else. Ignored by the engine.
    Unrecognized,
}

/// Wire protocol variant: how payload is framed and how lines are read.
///
/// One engine drives either variant; the codec is chosen once when a tunnel
/// is built.
pub trait FrameCodec: Send + Sync + fmt::Debug {
    /// Short variant name for logs.
    fn name(&self) -> &'static str;

    /// Maximum payload bytes carried by one frame.
    fn max_frame_size(&self) -> usize;

    /// Prefix of downstream lines for this variant.
    fn downstream_prefix(&self) -> &'static [u8];

    /// Whether each sent frame must be acknowledged before the next.
    fn awaits_ack(&self) -> bool;

    /// Whether a frame can name its slave, so no link is needed.
    fn addresses_frames(&self) -> bool {
        false
    }

    /// Reject a whole outbound buffer before any I/O happens.
    fn check_payload(&self, _payload: &[u8]) -> Result<()> {
        Ok(())
    }

    /// Length of the next frame taken from the front of `payload`.
    fn frame_len(&self, payload: &[u8]) -> Result<usize>;

    /// Append the wire form of `frame` to `dst`.
    fn encode(&self, frame: &[u8], addr: &FrameAddress<'_>, dst: &mut BytesMut) -> Result<()>;

    /// Extract the payload of a downstream line.
    fn decode_downstream(&self, line: &[u8], mode: LinkMode) -> Result<Vec<u8>>;

    /// Classify a received line.
    fn classify(&self, line: &[u8]) -> ControlLine;
}

/// Classify the lines both variants share: `TOE`, `LNK`, `ULK`.
pub fn classify_session(line: &[u8]) -> Option<ControlLine> {
    if line == LINK_BROKEN {
        return Some(ControlLine::LinkBroken);
    }
    if let Some(rest) = line.strip_prefix(LINK_PREFIX) {
        let rest = text(strip_cr(rest));
        return Some(match rest.strip_suffix(" OK") {
            Some(eid) if !eid.is_empty() && !eid.contains(' ') => {
                ControlLine::LinkOk(eid.to_string())
            }
            _ => ControlLine::LinkErr(rest),
        });
    }
    if let Some(rest) = line.strip_prefix(UNLINK_PREFIX) {
        let rest = text(strip_cr(rest));
        return Some(if rest == "OK" {
            ControlLine::UnlinkOk
        } else {
            ControlLine::UnlinkErr(rest)
        });
    }
    None
}

/// Build the `LNK <eid>` request.
pub fn link_request(eid: &SlaveEid) -> Vec<u8> {
    let mut out = Vec::with_capacity(LINK_PREFIX.len() + SlaveEid::LEN + 1);
    out.extend_from_slice(LINK_PREFIX);
    out.extend_from_slice(eid.as_bytes());
    out.push(CR);
    out
}

/// Printable form of a line for errors and logs (lossy, CR shown as `\r`).
pub fn display_line(line: &[u8]) -> String {
    String::from_utf8_lossy(line).replace('\r', "\\r")
}

pub(crate) fn strip_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(&[CR]).unwrap_or(line)
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toe_is_link_broken() {
        assert_eq!(classify_session(b"TOE\r"), Some(ControlLine::LinkBroken));
        assert_eq!(classify_session(b"TOE X\r"), None);
    }

    #[test]
    fn link_responses() {
        assert_eq!(
            classify_session(b"LNK 0123456789ABCDEF OK\r"),
            Some(ControlLine::LinkOk("0123456789ABCDEF".to_string()))
        );
        assert_eq!(
            classify_session(b"LNK 0123456789ABCDEF ERR\r"),
            Some(ControlLine::LinkErr("0123456789ABCDEF ERR".to_string()))
        );
        assert_eq!(
            classify_session(b"LNK OK\r"),
            Some(ControlLine::LinkErr("OK".to_string()))
        );
    }

    #[test]
    fn unlink_responses() {
        assert_eq!(classify_session(b"ULK OK\r"), Some(ControlLine::UnlinkOk));
        assert_eq!(
            classify_session(b"ULK ERR\r"),
            Some(ControlLine::UnlinkErr("ERR".to_string()))
        );
        assert_eq!(
            classify_session(b"ULK BUSY\r"),
            Some(ControlLine::UnlinkErr("BUSY".to_string()))
        );
    }

    #[test]
    fn other_lines_are_not_session_lines() {
        assert_eq!(classify_session(b"BINXT OK\r"), None);
        assert_eq!(classify_session(b"LNK\r"), None);
    }

    #[test]
    fn link_request_format() {
        let eid = SlaveEid::parse("0123456789ABCDEF").unwrap();
        assert_eq!(link_request(&eid), b"LNK 0123456789ABCDEF\r");
    }

    #[test]
    fn display_line_escapes_cr() {
        assert_eq!(display_line(b"BINXT ERR\r"), "BINXT ERR\\r");
    }
}
