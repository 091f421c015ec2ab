use std::io::{ErrorKind, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// Unix stream socket transport.
///
/// Used for devices bridged onto a local socket (e.g. by `socat`) and for
/// in-process links in tests. Closing shuts the socket down in both
/// directions, which wakes a blocked reader with end-of-stream.
pub struct StreamTransport {
    stream: UnixStream,
    label: String,
    write_lock: Mutex<()>,
    open: AtomicBool,
}

impl StreamTransport {
    /// Wrap an already connected stream.
    pub fn from_stream(stream: UnixStream, label: impl Into<String>) -> Self {
        Self {
            stream,
            label: label.into(),
            write_lock: Mutex::new(()),
            open: AtomicBool::new(true),
        }
    }

    /// Connect to a listening Unix domain socket (blocking).
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).map_err(|source| TransportError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(?path, "connected to unix stream");
        Ok(Self::from_stream(stream, path.display().to_string()))
    }

    /// A connected pair: whatever one end writes, the other end reads.
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = UnixStream::pair()?;
        Ok((
            Self::from_stream(left, "pair:host"),
            Self::from_stream(right, "pair:device"),
        ))
    }
}

impl Transport for StreamTransport {
    fn read_exact(&self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0usize;
        while filled < buf.len() {
            if !self.is_open() {
                return Err(TransportError::Closed);
            }
            match (&self.stream).read(&mut buf[filled..]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(_) if !self.is_open() => return Err(TransportError::Closed),
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
        Ok(())
    }

    fn write_all(&self, buf: &[u8]) -> Result<usize> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut offset = 0usize;
        while offset < buf.len() {
            match (&self.stream).write(&buf[offset..]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::BrokenPipe => {
                    return Err(TransportError::Closed)
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
        Ok(offset)
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.stream.shutdown(Shutdown::Both);
            debug!(endpoint = %self.label, "stream transport closed");
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        &self.label
    }
}

impl std::fmt::Debug for StreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("endpoint", &self.label)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::net::UnixListener;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn pair_carries_bytes_both_ways() {
        let (host, device) = StreamTransport::pair().unwrap();

        device.write_all(&[1, 2, 3, 4]).unwrap();
        let mut buf = [0u8; 4];
        host.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);

        assert_eq!(host.write_all(b"ack").unwrap(), 3);
        assert_eq!(device.read(3).unwrap().as_ref(), b"ack");
    }

    #[test]
    fn read_exact_collects_split_writes() {
        let (host, device) = StreamTransport::pair().unwrap();
        let writer = thread::spawn(move || {
            device.write_all(&[0xA5]).unwrap();
            thread::sleep(Duration::from_millis(20));
            device.write_all(&[0x02, 0x20, 0x00]).unwrap();
            device
        });

        let mut buf = [0u8; 4];
        host.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0xA5, 0x02, 0x20, 0x00]);
        let _device = writer.join().unwrap();
    }

    #[test]
    fn close_unblocks_pending_read() {
        let (host, _device) = StreamTransport::pair().unwrap();
        let host = Arc::new(host);

        let reader = {
            let host = Arc::clone(&host);
            thread::spawn(move || {
                let mut buf = [0u8; 1];
                host.read_exact(&mut buf)
            })
        };

        thread::sleep(Duration::from_millis(50));
        host.close();
        host.close();

        assert!(matches!(
            reader.join().unwrap(),
            Err(TransportError::Closed)
        ));
        assert!(!host.is_open());
        assert!(matches!(host.write_all(b"x"), Err(TransportError::Closed)));
    }

    #[test]
    fn peer_hangup_reads_as_closed() {
        let (host, device) = StreamTransport::pair().unwrap();
        device.close();
        drop(device);

        let mut buf = [0u8; 2];
        assert!(matches!(
            host.read_exact(&mut buf),
            Err(TransportError::Closed)
        ));
    }

    #[test]
    fn connect_to_listening_socket() {
        let dir = std::env::temp_dir().join(format!("busplot-stream-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let sock_path = dir.join("device.sock");
        let _ = std::fs::remove_file(&sock_path);
        let listener = UnixListener::bind(&sock_path).unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"hi").unwrap();
        });

        let transport = StreamTransport::connect(&sock_path).unwrap();
        assert_eq!(transport.read(2).unwrap().as_ref(), b"hi");
        assert_eq!(transport.name(), sock_path.display().to_string());

        server.join().unwrap();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn connect_missing_socket_reports_open_error() {
        let err = StreamTransport::connect("/tmp/busplot-no-such.sock").unwrap_err();
        assert!(matches!(err, TransportError::Open { .. }));
    }
}
