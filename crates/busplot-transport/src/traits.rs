use bytes::Bytes;

use crate::error::Result;

/// A connected, blocking byte stream.
///
/// Implementations are shared behind an `Arc` between one reading thread,
/// any number of writers and whoever closes the link, so every method takes
/// `&self`:
/// - only one thread may read at a time; the stream is not safe for
///   concurrent reads,
/// - `write_all` must write its buffer as one unit, never interleaved with
///   another writer,
/// - `close` must make a pending `read_exact` return
///   [`TransportError::Closed`](crate::TransportError::Closed) promptly.
pub trait Transport: Send + Sync {
    /// Fill `buf` completely, blocking until enough bytes arrive.
    fn read_exact(&self, buf: &mut [u8]) -> Result<()>;

    /// Write all of `buf` and return the number of bytes written.
    fn write_all(&self, buf: &[u8]) -> Result<usize>;

    /// Close the stream. Idempotent.
    fn close(&self);

    /// Whether the stream is still usable.
    fn is_open(&self) -> bool;

    /// Human-readable endpoint name for diagnostics.
    fn name(&self) -> &str;

    /// Read exactly `n` bytes into a fresh buffer.
    fn read(&self, n: usize) -> Result<Bytes> {
        let mut buf = vec![0u8; n];
        self.read_exact(&mut buf)?;
        Ok(Bytes::from(buf))
    }
}

impl std::fmt::Debug for dyn Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("name", &self.name())
            .field("open", &self.is_open())
            .finish()
    }
}
