//! MPS line framing.
//!
//! An MPS master speaks a CR-terminated text protocol. This crate holds the
//! pieces the tunnel engine is built from:
//! - [`FrameCodec`] with two wire variants: [`StandardCodec`] (hex payload in
//!   `BINXT`/`BINXR` lines, acknowledged) and [`LegacyCodec`] (`DAT` lines)
//! - [`LineReader`], which assembles lines under a deadline
//! - [`RingBuffer`], the fixed-capacity downstream byte queue
//! - [`SlaveEid`], the validated slave endpoint identifier

pub mod codec;
pub mod eid;
pub mod error;
pub mod legacy;
pub mod line;
pub mod ring;
pub mod standard;

pub use codec::{
    classify_session, display_line, link_request, ControlLine, FrameAddress, FrameCodec, LinkMode,
    CR, DEFAULT_MAX_FRAME_SIZE, LINK_BROKEN, UNLINK_REQUEST,
};
pub use eid::SlaveEid;
pub use error::{FrameError, Result};
pub use legacy::{LegacyCodec, DAT_PREFIX};
pub use line::{deadline_after, LineConfig, LineRead, LineReader, DEFAULT_MAX_LINE_LEN, MAX_WAIT};
pub use ring::{RingBuffer, DEFAULT_RING_CAPACITY};
pub use standard::{StandardCodec, BINXR_PREFIX, BINXT_ACK, BINXT_PREFIX};
