//! Blocking byte-stream transports for the busplot serial link.
//!
//! Provides a unified interface over the ways a device byte stream reaches
//! the host:
//! - Serial ttys configured through termios (Linux/macOS)
//! - Unix stream sockets (socket-bridged devices, in-process test pairs)
//! - Replay of captured bytes from any reader
//!
//! This is the lowest layer of busplot. The framing and RPC layers only see
//! the [`Transport`] trait provided here.

pub mod config;
pub mod error;
pub mod replay;
pub mod traits;

#[cfg(unix)]
pub mod serial;
#[cfg(unix)]
pub mod stream;

pub use config::{DataBits, FlowControl, Parity, SerialConfig, StopBits};
pub use error::{Result, TransportError};
pub use replay::ReplayTransport;
pub use traits::Transport;

#[cfg(unix)]
pub use serial::SerialPort;
#[cfg(unix)]
pub use stream::StreamTransport;
