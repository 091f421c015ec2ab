use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// Read-only transport that replays bytes from any reader.
///
/// End of input is reported as [`TransportError::Closed`], so a scanner fed
/// from a capture file stops exactly like one whose device went away.
pub struct ReplayTransport {
    reader: Mutex<Box<dyn Read + Send>>,
    label: String,
    open: AtomicBool,
}

impl ReplayTransport {
    /// Replay everything `reader` yields.
    pub fn new(reader: impl Read + Send + 'static, label: impl Into<String>) -> Self {
        Self {
            reader: Mutex::new(Box::new(reader)),
            label: label.into(),
            open: AtomicBool::new(true),
        }
    }

    /// Replay an in-memory byte capture.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(std::io::Cursor::new(bytes.into()), "memory")
    }

    /// Replay a capture file.
    pub fn open_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| TransportError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(?path, "replaying capture file");
        Ok(Self::new(BufReader::new(file), path.display().to_string()))
    }
}

impl Transport for ReplayTransport {
    fn read_exact(&self, buf: &mut [u8]) -> Result<()> {
        let mut reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        let mut filled = 0usize;
        while filled < buf.len() {
            if !self.is_open() {
                return Err(TransportError::Closed);
            }
            match reader.read(&mut buf[filled..]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
        Ok(())
    }

    fn write_all(&self, _buf: &[u8]) -> Result<usize> {
        Err(TransportError::ReadOnly)
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        &self.label
    }
}

impl std::fmt::Debug for ReplayTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayTransport")
            .field("label", &self.label)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}
