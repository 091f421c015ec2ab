//! Byte layout of a frame.
//!
//! ```text
//! ┌──────┬──────────┬───────────┬──────────────┬────────────┐
//! │ SOF  │ Length   │ Command   │ Body         │ CRC-16     │
//! │ 0xA5 │ (1B)     │ (2B LE)   │ (Length B)   │ (2B LE)    │
//! └──────┴──────────┴───────────┴──────────────┴────────────┘
//! ```

/// Start-of-frame marker.
pub const SOF: u8 = 0xA5;

/// Size of the start-of-frame marker.
pub const SOF_SIZE: usize = 1;

/// Frame header: length (1) + command (2) = 3 bytes.
pub const HEADER_SIZE: usize = 3;

/// Frame tail: CRC-16 = 2 bytes.
pub const TAIL_SIZE: usize = 2;

/// Bytes a frame adds around its body.
pub const FRAME_OVERHEAD: usize = SOF_SIZE + HEADER_SIZE + TAIL_SIZE;

/// Largest body the one-byte length field can describe.
pub const MAX_BODY_SIZE: usize = u8::MAX as usize;

/// The fixed header following the start-of-frame marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Exact size of the body that follows.
    pub body_len: u8,
    /// Identifies the message type carried in the body.
    pub command: u16,
}

impl FrameHeader {
    pub fn new(command: u16, body_len: u8) -> Self {
        Self { body_len, command }
    }

    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let [lo, hi] = self.command.to_le_bytes();
        [self.body_len, lo, hi]
    }

    pub fn from_bytes(raw: [u8; HEADER_SIZE]) -> Self {
        Self {
            body_len: raw[0],
            command: u16::from_le_bytes([raw[1], raw[2]]),
        }
    }

    /// Body length as a `usize`.
    pub fn body_size(&self) -> usize {
        usize::from(self.body_len)
    }

    /// Total wire size of the frame this header describes.
    pub fn frame_size(&self) -> usize {
        FRAME_OVERHEAD + self.body_size()
    }
}
