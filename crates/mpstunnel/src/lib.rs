//! Tunnel byte traffic to devices behind an MPS master.
//!
//! An MPS master (beacon, BraceID, ...) multiplexes many slave devices over
//! one line-oriented command connection. mpstunnel makes one of those slaves
//! look like a plain duplex connection.
//!
//! # Crate Structure
//!
//! - [`transport`]: `DuplexConnection` trait, TCP and Unix socket bindings
//! - [`frame`]: line framing: `BINXT`/`BINXR` and `DAT` codecs, line reader
//! - [`link`]: the tunnel engine (behind `link` feature)
//! - [`emulator`]: an in-process MPS master (behind `emulator` feature)

/// Re-export transport types.
pub mod transport {
    pub use mpstunnel_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use mpstunnel_frame::*;
}

/// Re-export tunnel types (requires `link` feature).
#[cfg(feature = "link")]
pub mod link {
    pub use mpstunnel_link::*;
}

#[cfg(feature = "emulator")]
pub mod emulator;
