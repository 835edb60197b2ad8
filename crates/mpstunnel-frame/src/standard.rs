use bytes::{BufMut, BytesMut};

use crate::codec::{
    classify_session, strip_cr, ControlLine, FrameAddress, FrameCodec, LinkMode, CR,
    DEFAULT_MAX_FRAME_SIZE,
};
use crate::error::{FrameError, Result};

/// Outbound frame prefix.
pub const BINXT_PREFIX: &[u8] = b"BINXT ";
/// Downstream frame prefix.
pub const BINXR_PREFIX: &[u8] = b"BINXR ";
/// Positive acknowledgment of a BINXT frame.
pub const BINXT_ACK: &[u8] = b"BINXT OK\r";

/// Binary variant: payload travels hex-encoded in `BINXT`/`BINXR` lines and
/// every outbound frame is acknowledged.
///
/// ```text
/// out:  BINXT 48656C6C6F\r
/// in:   BINXT OK\r            (ack)
/// in:   BINXT <error>\r       (rejected)
/// in:   BINXR 776F726C64\r    (downstream)
/// ```
#[derive(Debug, Clone)]
pub struct StandardCodec {
    max_frame_size: usize,
}

impl StandardCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            max_frame_size: max_frame_size.max(1),
        }
    }
}

impl Default for StandardCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl FrameCodec for StandardCodec {
    fn name(&self) -> &'static str {
        "binxt"
    }

    fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    fn downstream_prefix(&self) -> &'static [u8] {
        BINXR_PREFIX
    }

    fn awaits_ack(&self) -> bool {
        true
    }

    fn frame_len(&self, payload: &[u8]) -> Result<usize> {
        Ok(payload.len().min(self.max_frame_size))
    }

    fn encode(&self, frame: &[u8], _addr: &FrameAddress<'_>, dst: &mut BytesMut) -> Result<()> {
        if frame.len() > self.max_frame_size {
            return Err(FrameError::invalid(
                format!(
                    "frame of {} bytes exceeds maximum of {}",
                    frame.len(),
                    self.max_frame_size
                ),
                frame,
            ));
        }
        dst.reserve(BINXT_PREFIX.len() + frame.len() * 2 + 1);
        dst.put_slice(BINXT_PREFIX);
        dst.put_slice(hex::encode_upper(frame).as_bytes());
        dst.put_u8(CR);
        Ok(())
    }

    fn decode_downstream(&self, line: &[u8], _mode: LinkMode) -> Result<Vec<u8>> {
        let body = line
            .strip_prefix(BINXR_PREFIX)
            .ok_or_else(|| FrameError::violation("downstream frame must start with BINXR", line))?;
        hex::decode(strip_cr(body))
            .map_err(|err| FrameError::violation(format!("invalid hex payload: {err}"), line))
    }

    fn classify(&self, line: &[u8]) -> ControlLine {
        if line == BINXT_ACK {
            return ControlLine::FrameAck;
        }
        if let Some(rest) = line.strip_prefix(BINXT_PREFIX) {
            return ControlLine::FrameError(String::from_utf8_lossy(strip_cr(rest)).into_owned());
        }
        if line.starts_with(BINXR_PREFIX) {
            return ControlLine::DownstreamFrame;
        }
        classify_session(line).unwrap_or(ControlLine::Unrecognized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linked() -> FrameAddress<'static> {
        FrameAddress {
            eid: None,
            mode: LinkMode::Linked,
        }
    }

    #[test]
    fn encode_uppercase_hex() {
        let codec = StandardCodec::default();
        let mut dst = BytesMut::new();
        codec.encode(&[0xAB, 0x01, 0xff], &linked(), &mut dst).unwrap();
        assert_eq!(&dst[..], b"BINXT AB01FF\r");
    }

    #[test]
    fn encode_rejects_oversized_frame() {
        let codec = StandardCodec::new(4);
        let mut dst = BytesMut::new();
        let err = codec.encode(b"12345", &linked(), &mut dst).unwrap_err();
        assert!(matches!(err, FrameError::InvalidArgument { .. }));
        assert!(dst.is_empty());
    }

    #[test]
    fn frame_len_is_size_based() {
        let codec = StandardCodec::default();
        assert_eq!(codec.frame_len(&[0u8; 250]).unwrap(), 96);
        assert_eq!(codec.frame_len(&[0u8; 58]).unwrap(), 58);
        assert_eq!(codec.frame_len(b"a\rb\r").unwrap(), 4);
    }

    #[test]
    fn decode_roundtrip_all_lengths() {
        let codec = StandardCodec::default();
        for len in 0..=DEFAULT_MAX_FRAME_SIZE {
            let payload: Vec<u8> = (0..len).map(|i| (i * 37 + 11) as u8).collect();
            let mut line = BINXR_PREFIX.to_vec();
            line.extend_from_slice(hex::encode_upper(&payload).as_bytes());
            line.push(CR);

            let decoded = codec.decode_downstream(&line, LinkMode::Linked).unwrap();
            assert_eq!(decoded, payload, "length {len}");
        }
    }

    #[test]
    fn decode_accepts_lowercase_hex() {
        let codec = StandardCodec::default();
        let decoded = codec
            .decode_downstream(b"BINXR 48656c6c6f\r", LinkMode::Linked)
            .unwrap();
        assert_eq!(decoded, b"Hello");
    }

    #[test]
    fn decode_rejects_bad_hex_and_prefix() {
        let codec = StandardCodec::default();
        assert!(matches!(
            codec.decode_downstream(b"BINXR 4G\r", LinkMode::Linked),
            Err(FrameError::ProtocolViolation { .. })
        ));
        assert!(matches!(
            codec.decode_downstream(b"BINXR 123\r", LinkMode::Linked),
            Err(FrameError::ProtocolViolation { .. })
        ));
        assert!(matches!(
            codec.decode_downstream(b"DAT 41\r", LinkMode::Linked),
            Err(FrameError::ProtocolViolation { .. })
        ));
    }

    #[test]
    fn classify_frame_lines() {
        let codec = StandardCodec::default();
        assert_eq!(codec.classify(b"BINXT OK\r"), ControlLine::FrameAck);
        assert_eq!(
            codec.classify(b"BINXT ERR-FOO\r"),
            ControlLine::FrameError("ERR-FOO".to_string())
        );
        assert_eq!(
            codec.classify(b"BINXT OK \r"),
            ControlLine::FrameError("OK ".to_string())
        );
        assert_eq!(codec.classify(b"BINXR 00\r"), ControlLine::DownstreamFrame);
        assert_eq!(codec.classify(b"TOE\r"), ControlLine::LinkBroken);
        assert_eq!(codec.classify(b"ULK OK\r"), ControlLine::UnlinkOk);
        assert_eq!(codec.classify(b"DAT hello -xxx\r"), ControlLine::Unrecognized);
        assert_eq!(codec.classify(b"HBT\r"), ControlLine::Unrecognized);
    }
}
