use std::fmt;
use std::str::FromStr;

use crate::error::{FrameError, Result};

/// Endpoint identifier of a slave device behind an MPS master.
///
/// Always exactly 16 hexadecimal characters (8 bytes). Kept verbatim, since
/// the master echoes it back in `LNK` replies.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SlaveEid(String);

impl SlaveEid {
    /// Number of hex characters in an EID.
    pub const LEN: usize = 16;

    pub fn parse(value: &str) -> Result<Self> {
        if value.len() != Self::LEN || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(FrameError::invalid(
                format!("slave EID must be {} hex characters", Self::LEN),
                value.as_bytes(),
            ));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl FromStr for SlaveEid {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for SlaveEid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SlaveEid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SlaveEid({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_sixteen_hex_chars() {
        let eid: SlaveEid = "0123456789ABCDEF".parse().unwrap();
        assert_eq!(eid.as_str(), "0123456789ABCDEF");
        assert_eq!(eid.to_string(), "0123456789ABCDEF");
        assert!(SlaveEid::parse("0123456789abcdef").is_ok());
    }

    #[test]
    fn rejects_wrong_length_or_digits() {
        assert!(matches!(
            SlaveEid::parse("0123"),
            Err(FrameError::InvalidArgument { .. })
        ));
        assert!(SlaveEid::parse("0123456789ABCDEG").is_err());
        assert!(SlaveEid::parse("0123456789ABCDEF0").is_err());
    }
}
