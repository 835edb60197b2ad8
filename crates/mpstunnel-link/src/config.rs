use std::time::Duration;

use mpstunnel_frame::{
    FrameCodec, LegacyCodec, LineConfig, LinkMode, StandardCodec, DEFAULT_MAX_FRAME_SIZE,
    DEFAULT_RING_CAPACITY,
};

/// Default bound on each handshake wait. Masters ping slaves at most every
/// 60 s, so a link reply may take that long.
pub const DEFAULT_LINK_TIMEOUT: Duration = Duration::from_secs(61);

/// Wire protocol variant spoken with the master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Variant {
    /// Hex payload in `BINXT`/`BINXR` lines, every frame acknowledged.
    #[default]
    Standard,
    /// `DAT` text lines, no acknowledgment.
    Legacy,
}

impl Variant {
    /// Build the codec for this variant.
    pub fn codec(self, max_frame_size: usize) -> Box<dyn FrameCodec> {
        match self {
            Variant::Standard => Box::new(StandardCodec::new(max_frame_size)),
            Variant::Legacy => Box::new(LegacyCodec::new(max_frame_size)),
        }
    }
}

/// What a receive does when no downstream frame arrives in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecvTimeoutPolicy {
    /// Fail with [`TunnelError::Timeout`](crate::TunnelError::Timeout).
    #[default]
    Surface,
    /// Report "no data" (`Ok(None)`) and leave the tunnel usable.
    EmptyRead,
}

/// Tunnel configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelConfig {
    pub variant: Variant,
    /// Maximum payload bytes per frame.
    pub max_frame_size: usize,
    /// Capacity of the downstream ring buffer.
    pub downstream_capacity: usize,
    /// Bound on each ULK/LNK wait.
    pub link_timeout: Duration,
    /// Persistent link, or per-frame EID addressing (only `DAT` frames carry one).
    pub link_mode: LinkMode,
    pub recv_timeout_policy: RecvTimeoutPolicy,
    pub line: LineConfig,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            variant: Variant::Standard,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            downstream_capacity: DEFAULT_RING_CAPACITY,
            link_timeout: DEFAULT_LINK_TIMEOUT,
            link_mode: LinkMode::Linked,
            recv_timeout_policy: RecvTimeoutPolicy::Surface,
            line: LineConfig::default(),
        }
    }
}

impl TunnelConfig {
    /// Defaults for the legacy variant: `DAT` frames addressed by EID, no
    /// persistent link.
    pub fn legacy() -> Self {
        Self {
            variant: Variant::Legacy,
            link_mode: LinkMode::Unlinked,
            ..Self::default()
        }
    }

    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variant = variant;
        self
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size.max(1);
        self
    }

    pub fn with_downstream_capacity(mut self, capacity: usize) -> Self {
        self.downstream_capacity = capacity;
        self
    }

    pub fn with_link_timeout(mut self, link_timeout: Duration) -> Self {
        self.link_timeout = link_timeout;
        self
    }

    pub fn with_link_mode(mut self, link_mode: LinkMode) -> Self {
        self.link_mode = link_mode;
        self
    }

    pub fn with_recv_timeout_policy(mut self, policy: RecvTimeoutPolicy) -> Self {
        self.recv_timeout_policy = policy;
        self
    }

    pub fn with_line_config(mut self, line: LineConfig) -> Self {
        self.line = line;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = TunnelConfig::default();
        assert_eq!(config.max_frame_size, 96);
        assert_eq!(config.downstream_capacity, 100 * 1024);
        assert_eq!(config.link_timeout, Duration::from_secs(61));
        assert_eq!(config.link_mode, LinkMode::Linked);
        assert_eq!(config.recv_timeout_policy, RecvTimeoutPolicy::Surface);
        assert_eq!(config.variant, Variant::Standard);
    }

    #[test]
    fn legacy_defaults_to_addressed_frames() {
        let config = TunnelConfig::legacy();
        assert_eq!(config.variant, Variant::Legacy);
        assert_eq!(config.link_mode, LinkMode::Unlinked);
        assert_eq!(config.variant.codec(config.max_frame_size).name(), "dat");
    }

    #[test]
    fn builders_chain() {
        let config = TunnelConfig::default()
            .with_max_frame_size(0)
            .with_link_mode(LinkMode::Unlinked)
            .with_recv_timeout_policy(RecvTimeoutPolicy::EmptyRead);
        assert_eq!(config.max_frame_size, 1);
        assert_eq!(config.link_mode, LinkMode::Unlinked);
        assert_eq!(config.recv_timeout_policy, RecvTimeoutPolicy::EmptyRead);
    }
}
