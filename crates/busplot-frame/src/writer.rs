use std::sync::Arc;

use bytes::BytesMut;
use busplot_transport::Transport;
use tracing::trace;

use crate::codec::{encode_frame, encode_request};
use crate::error::Result;
use crate::message::Message;
use crate::wire::FRAME_OVERHEAD;

/// Writes complete frames to a shared transport.
///
/// Cloning is cheap and every clone writes to the same transport; each frame
/// goes out as a single `write_all`, so frames from different threads never
/// interleave.
#[derive(Debug, Clone)]
pub struct FrameWriter {
    transport: Arc<dyn Transport>,
}

impl FrameWriter {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Encode and send a typed message. Returns the bytes written.
    pub fn send<M: Message>(&self, message: &M) -> Result<usize> {
        let wire = encode_request(message)?;
        let written = self.transport.write_all(&wire)?;
        trace!(command = M::COMMAND, bytes = written, "frame sent");
        Ok(written)
    }

    /// Encode and send a raw body for `command`.
    pub fn send_raw(&self, command: u16, body: &[u8]) -> Result<usize> {
        let mut wire = BytesMut::with_capacity(FRAME_OVERHEAD + body.len());
        encode_frame(command, body.len(), body, &mut wire)?;
        let written = self.transport.write_all(&wire)?;
        trace!(command, bytes = written, "frame sent");
        Ok(written)
    }

    /// Borrow the underlying transport.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }
}
