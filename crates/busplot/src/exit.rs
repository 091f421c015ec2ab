use std::fmt;
use std::io;

use busplot_frame::FrameError;
use busplot_rpc::RpcError;
use busplot_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Open { source, .. } | TransportError::Configure { source, .. } => {
            io_error(context, source)
        }
        TransportError::UnsupportedBaudRate(_) | TransportError::InvalidConfig(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        TransportError::Io(source) => io_error(context, source),
        TransportError::Closed => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Transport(err) => transport_error(context, err),
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        FrameError::BodyTooLarge { .. }
        | FrameError::BodySizeMismatch { .. }
        | FrameError::InvalidSof(_)
        | FrameError::ChecksumMismatch { .. }
        | FrameError::Truncated { .. }
        | FrameError::UnexpectedCommand { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
    }
}

pub fn rpc_error(context: &str, err: RpcError) -> CliError {
    match err {
        RpcError::Transport(err) => transport_error(context, err),
        RpcError::Frame(err) => frame_error(context, err),
        RpcError::DuplicateCommand { .. } | RpcError::RegistrationClosed => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        RpcError::NotConnected => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_failures_keep_io_semantics() {
        let err = transport_error(
            "open failed",
            TransportError::Open {
                path: "/dev/ttyUSB9".into(),
                source: io::Error::from(io::ErrorKind::NotFound),
            },
        );
        assert_eq!(err.code, TRANSPORT_ERROR);
        assert!(err.message.starts_with("open failed: "));

        let err = transport_error(
            "open failed",
            TransportError::Open {
                path: "/dev/ttyS0".into(),
                source: io::Error::from(io::ErrorKind::PermissionDenied),
            },
        );
        assert_eq!(err.code, PERMISSION_DENIED);
    }

    #[test]
    fn bad_line_settings_are_usage_errors() {
        let err = rpc_error(
            "connect failed",
            RpcError::Transport(TransportError::UnsupportedBaudRate(12_345)),
        );
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn malformed_frames_are_data_invalid() {
        let err = frame_error(
            "decode failed",
            FrameError::ChecksumMismatch {
                expected: 1,
                actual: 2,
            },
        );
        assert_eq!(err.code, DATA_INVALID);

        let err = rpc_error("send failed", RpcError::Frame(FrameError::ConnectionClosed));
        assert_eq!(err.code, FAILURE);
    }
}
