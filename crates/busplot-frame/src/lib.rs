//! SOF-synchronized, CRC-checked binary framing for the busplot serial link.
//!
//! Every message is framed as:
//! - a 1-byte start-of-frame marker (`0xA5`) for stream synchronization
//! - a 3-byte header: body length (`u8`) and command id (`u16` LE)
//! - the fixed-size, command-specific body
//! - a 2-byte CRC-16/CCITT-FALSE (LE) over everything before it
//!
//! The [`FrameScanner`] recovers validated frames from a noisy byte stream,
//! resynchronizing on the next marker after any garbage or corruption.

pub mod checksum;
pub mod codec;
pub mod error;
pub mod message;
pub mod scanner;
pub mod wire;
pub mod writer;

pub use codec::{decode_frame, decode_request, encode_frame, encode_request, Frame};
pub use error::{FrameError, Result};
pub use message::{
    ApplyArgument, Message, PidArgument, RemoveVariable, UpdateVariable, VariableAlias, ALIAS_LEN,
};
pub use scanner::{CommandLookup, Discard, FrameScanner, ScanEvent, ScanStage, ScanState, ScanStats};
pub use wire::{FrameHeader, FRAME_OVERHEAD, HEADER_SIZE, MAX_BODY_SIZE, SOF, TAIL_SIZE};
pub use writer::FrameWriter;
