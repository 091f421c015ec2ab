use busplot_transport::TransportError;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The first byte of a frame is not the start-of-frame marker.
    #[error("invalid start of frame 0x{0:02X} (expected 0xA5)")]
    InvalidSof(u8),

    /// The body does not fit the one-byte length field.
    #[error("body too large ({size} bytes, max {max})")]
    BodyTooLarge { size: usize, max: usize },

    /// The body length differs from the size the command requires.
    #[error("command 0x{command:04X} expects a {expected}-byte body, got {actual}")]
    BodySizeMismatch {
        command: u16,
        expected: usize,
        actual: usize,
    },

    /// The checksum in the tail does not match the frame contents.
    #[error("checksum mismatch (computed 0x{expected:04X}, received 0x{actual:04X})")]
    ChecksumMismatch { expected: u16, actual: u16 },

    /// A buffer ended before the frame it declares.
    #[error("truncated frame ({available} of {needed} bytes)")]
    Truncated { needed: usize, available: usize },

    /// A frame carries a different command than the one requested.
    #[error("expected command 0x{expected:04X}, found 0x{actual:04X}")]
    UnexpectedCommand { expected: u16, actual: u16 },

    /// A transport error occurred while reading or writing frames.
    #[error("frame transport error: {0}")]
    Transport(TransportError),

    /// The connection was closed; no further frames will arrive.
    #[error("connection closed")]
    ConnectionClosed,
}

impl FrameError {
    /// True for errors after which the stream cannot produce more frames.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FrameError::ConnectionClosed | FrameError::Transport(_))
    }
}

impl From<TransportError> for FrameError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Closed => FrameError::ConnectionClosed,
            other => FrameError::Transport(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
