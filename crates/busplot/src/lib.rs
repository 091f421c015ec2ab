//! Serial RPC framing and dispatch for live variable plotting.
//!
//! A device streams framed messages over a serial line: variable aliases,
//! value updates, removals and PID parameter sets. busplot finds frames in
//! the raw byte stream, checks them, and hands decoded messages to
//! registered handlers on a dedicated receive thread.
//!
//! # Crate Structure
//!
//! - [`transport`]: Byte-stream transports (serial tty, Unix stream, replay)
//! - [`frame`]: Wire format, checksum, typed messages and the frame scanner
//! - [`rpc`]: Dispatch table, series store and the receive engine

/// Re-export transport types.
pub mod transport {
    pub use busplot_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use busplot_frame::*;
}

/// Re-export dispatch and engine types.
pub mod rpc {
    pub use busplot_rpc::*;
}
