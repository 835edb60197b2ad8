//! MPS tunnel engine.
//!
//! [`MpsTunnel`] turns a connection to an MPS master into a byte channel to
//! one slave device behind it. Outbound data is cut into frames and each
//! frame waits for its acknowledgment; downstream frames that arrive in the
//! meantime are decoded into a bounded queue and served by `recv`.
//!
//! The wire variant is picked once, at construction, through
//! [`TunnelConfig::variant`] or a custom [`FrameCodec`](mpstunnel_frame::FrameCodec).

pub mod config;
mod downstream;
pub mod error;
mod link;
mod recv;
mod send;
pub mod tunnel;

pub use config::{RecvTimeoutPolicy, TunnelConfig, Variant, DEFAULT_LINK_TIMEOUT};
pub use downstream::DownstreamHandle;
pub use error::{Result, TunnelError, WaitPhase};
pub use tunnel::{MpsTunnel, SessionState};
