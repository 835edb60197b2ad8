use bytes::{BufMut, BytesMut};

use crate::codec::{
    classify_session, ControlLine, FrameAddress, FrameCodec, LinkMode, CR, DEFAULT_MAX_FRAME_SIZE,
};
use crate::error::{FrameError, Result};

/// Prefix of legacy frames in both directions.
pub const DAT_PREFIX: &[u8] = b"DAT ";

/// Text variant for masters that only speak `DAT`.
///
/// Payload is sent as-is, so every frame must end in CR and CRs must occur at
/// most `max_frame_size` bytes apart. There is no acknowledgment.
///
/// ```text
/// out:  DAT [<eid> ]<text>\r
/// in:   DAT [<src-eid> ]<text> -xxx\r
/// ```
///
/// The source EID is only present on downstream lines when unlinked.
#[derive(Debug, Clone)]
pub struct LegacyCodec {
    max_frame_size: usize,
}

impl LegacyCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            max_frame_size: max_frame_size.max(1),
        }
    }
}

impl Default for LegacyCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl FrameCodec for LegacyCodec {
    fn name(&self) -> &'static str {
        "dat"
    }

    fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    fn downstream_prefix(&self) -> &'static [u8] {
        DAT_PREFIX
    }

    fn awaits_ack(&self) -> bool {
        false
    }

    fn addresses_frames(&self) -> bool {
        true
    }

    fn check_payload(&self, payload: &[u8]) -> Result<()> {
        if payload.last() != Some(&CR) {
            return Err(FrameError::invalid(
                "data must be carriage return terminated",
                payload,
            ));
        }
        Ok(())
    }

    fn frame_len(&self, payload: &[u8]) -> Result<usize> {
        let window = &payload[..payload.len().min(self.max_frame_size)];
        window
            .iter()
            .position(|&b| b == CR)
            .map(|idx| idx + 1)
            .ok_or_else(|| {
                FrameError::invalid(
                    format!("no CR within {} bytes of frame start", self.max_frame_size),
                    window,
                )
            })
    }

    fn encode(&self, frame: &[u8], addr: &FrameAddress<'_>, dst: &mut BytesMut) -> Result<()> {
        if frame.len() > self.max_frame_size || frame.last() != Some(&CR) {
            return Err(FrameError::invalid(
                "frame must be CR-terminated and fit in one DAT line",
                frame,
            ));
        }
        dst.put_slice(DAT_PREFIX);
        if let (Some(eid), LinkMode::Unlinked) = (addr.eid, addr.mode) {
            dst.put_slice(eid.as_bytes());
            dst.put_u8(b' ');
        }
        dst.put_slice(frame);
        Ok(())
    }

    fn decode_downstream(&self, line: &[u8], mode: LinkMode) -> Result<Vec<u8>> {
        let Some(body) = line.strip_prefix(DAT_PREFIX) else {
            return Err(FrameError::violation(
                "downstream frame must start with DAT",
                line,
            ));
        };

        let mut tokens: Vec<&[u8]> = line.split(|&b| b == b' ').collect();
        while tokens.len() > 1 && tokens.last().is_some_and(|t| t.is_empty()) {
            tokens.pop();
        }
        if tokens.len() < 3 {
            return Ok(body.to_vec());
        }

        // tokens: DAT [src-eid] <message words...> -xxx
        let start = match mode {
            LinkMode::Linked => 1,
            LinkMode::Unlinked => 2,
        };
        let message = &tokens[start..tokens.len() - 1];
        let mut out = message.join(&b' ');
        out.push(CR);
        Ok(out)
    }

    fn classify(&self, line: &[u8]) -> ControlLine {
        if line.starts_with(DAT_PREFIX) {
            return ControlLine::DownstreamFrame;
        }
        classify_session(line).unwrap_or(ControlLine::Unrecognized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eid::SlaveEid;

    fn eid() -> SlaveEid {
        SlaveEid::parse("00112233AABBCCDD").unwrap()
    }

    #[test]
    fn only_legacy_frames_carry_an_address() {
        assert!(LegacyCodec::default().addresses_frames());
        assert!(!crate::standard::StandardCodec::default().addresses_frames());
    }

    fn encode(frame: &[u8], eid: Option<&SlaveEid>, mode: LinkMode) -> Result<Vec<u8>> {
        let mut dst = BytesMut::new();
        LegacyCodec::default().encode(frame, &FrameAddress { eid, mode }, &mut dst)?;
        Ok(dst.to_vec())
    }

    #[test]
    fn encode_linked_omits_eid() {
        let eid = eid();
        assert_eq!(
            encode(b"hello\r", Some(&eid), LinkMode::Linked).unwrap(),
            b"DAT hello\r"
        );
    }

    #[test]
    fn encode_addressed_embeds_eid() {
        let eid = eid();
        assert_eq!(
            encode(b"hello\r", Some(&eid), LinkMode::Unlinked).unwrap(),
            b"DAT 00112233AABBCCDD hello\r"
        );
        assert_eq!(
            encode(b"hello\r", None, LinkMode::Unlinked).unwrap(),
            b"DAT hello\r"
        );
    }

    #[test]
    fn payload_must_end_in_cr() {
        let codec = LegacyCodec::default();
        assert!(codec.check_payload(b"abc\r").is_ok());
        assert!(matches!(
            codec.check_payload(b"abc"),
            Err(FrameError::InvalidArgument { .. })
        ));
        assert!(codec.check_payload(b"").is_err());
    }

    #[test]
    fn frame_len_splits_at_first_cr() {
        let codec = LegacyCodec::default();
        assert_eq!(codec.frame_len(b"ab\rcd\r").unwrap(), 3);
        assert_eq!(codec.frame_len(b"\r").unwrap(), 1);
    }

    #[test]
    fn frame_len_requires_cr_within_window() {
        let codec = LegacyCodec::new(4);
        assert_eq!(codec.frame_len(b"abc\r").unwrap(), 4);
        assert!(matches!(
            codec.frame_len(b"abcd\r"),
            Err(FrameError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn decode_linked_keeps_inner_spaces() {
        let codec = LegacyCodec::default();
        let out = codec
            .decode_downstream(b"DAT hello big world -xxx\r", LinkMode::Linked)
            .unwrap();
        assert_eq!(out, b"hello big world\r");
    }

    #[test]
    fn decode_unlinked_drops_source_eid() {
        let codec = LegacyCodec::default();
        let out = codec
            .decode_downstream(b"DAT 00112233AABBCCDD ok then -xxx\r", LinkMode::Unlinked)
            .unwrap();
        assert_eq!(out, b"ok then\r");
    }

    #[test]
    fn decode_short_line_passes_body_through() {
        let codec = LegacyCodec::default();
        let out = codec
            .decode_downstream(b"DAT ping\r", LinkMode::Linked)
            .unwrap();
        assert_eq!(out, b"ping\r");
    }

    #[test]
    fn decode_requires_dat_prefix() {
        let codec = LegacyCodec::default();
        assert!(matches!(
            codec.decode_downstream(b"BINXR 00\r", LinkMode::Linked),
            Err(FrameError::ProtocolViolation { .. })
        ));
    }

    #[test]
    fn classify_never_acks() {
        let codec = LegacyCodec::default();
        assert_eq!(codec.classify(b"DAT hi -xxx\r"), ControlLine::DownstreamFrame);
        assert_eq!(codec.classify(b"BINXT OK\r"), ControlLine::Unrecognized);
        assert_eq!(codec.classify(b"TOE\r"), ControlLine::LinkBroken);
        assert_eq!(
            codec.classify(b"LNK 00112233AABBCCDD OK\r"),
            ControlLine::LinkOk("00112233AABBCCDD".to_string())
        );
    }
}
