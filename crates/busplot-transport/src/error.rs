use std::path::PathBuf;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the device or endpoint.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to apply line settings to an opened device.
    #[error("failed to configure {path}: {source}")]
    Configure {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The requested baud rate has no termios speed constant.
    #[error("unsupported baud rate {0}")]
    UnsupportedBaudRate(u32),

    /// A line setting could not be parsed or is out of range.
    #[error("invalid serial configuration: {0}")]
    InvalidConfig(String),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport was closed locally or by the remote end.
    #[error("transport closed")]
    Closed,

    /// The transport does not accept writes.
    #[error("transport is read-only")]
    ReadOnly,
}

impl TransportError {
    /// True when the error means no further bytes will ever arrive.
    pub fn is_closed(&self) -> bool {
        matches!(self, TransportError::Closed)
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
