use bytes::{BufMut, Bytes, BytesMut};

use crate::checksum;
use crate::error::{FrameError, Result};
use crate::message::Message;
use crate::wire::{
    FrameHeader, FRAME_OVERHEAD, HEADER_SIZE, MAX_BODY_SIZE, SOF, SOF_SIZE, TAIL_SIZE,
};

/// A validated frame: header, body and the checksum that covered them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub body: Bytes,
    pub checksum: u16,
}

impl Frame {
    /// Command id from the header.
    pub fn command(&self) -> u16 {
        self.header.command
    }

    /// The total wire size of this frame.
    pub fn wire_size(&self) -> usize {
        FRAME_OVERHEAD + self.body.len()
    }

    /// Decode the body as `M`.
    pub fn decode_message<M: Message>(&self) -> Result<M> {
        if self.header.command != M::COMMAND {
            return Err(FrameError::UnexpectedCommand {
                expected: M::COMMAND,
                actual: self.header.command,
            });
        }
        M::decode_body(&self.body)
    }
}

/// Encode a frame into the wire format.
///
/// Lays out `SOF · header · body · 0x0000`, then overwrites the tail with the
/// checksum of everything before it. `expected_size` is the body size the
/// command requires and must equal `body.len()`.
pub fn encode_frame(
    command: u16,
    expected_size: usize,
    body: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    if body.len() > MAX_BODY_SIZE {
        return Err(FrameError::BodyTooLarge {
            size: body.len(),
            max: MAX_BODY_SIZE,
        });
    }
    if body.len() != expected_size {
        return Err(FrameError::BodySizeMismatch {
            command,
            expected: expected_size,
            actual: body.len(),
        });
    }

    let header = FrameHeader::new(command, body.len() as u8);
    let start = dst.len();
    dst.reserve(header.frame_size());
    dst.put_u8(SOF);
    dst.put_slice(&header.to_bytes());
    dst.put_slice(body);
    dst.put_u16_le(0);

    let tail_at = dst.len() - TAIL_SIZE;
    let crc = checksum::compute(&dst[start..tail_at]);
    dst[tail_at..].copy_from_slice(&crc.to_le_bytes());
    Ok(())
}

/// Encode a typed message as a complete frame.
pub fn encode_request<M: Message>(message: &M) -> Result<Bytes> {
    let body = message.encode_body();
    let mut dst = BytesMut::with_capacity(FRAME_OVERHEAD + body.len());
    encode_frame(M::COMMAND, M::SIZE, &body, &mut dst)?;
    Ok(dst.freeze())
}

/// Decode one complete frame from the start of `src`.
///
/// `src` must begin with the start-of-frame marker; bytes after the frame
/// are ignored.
pub fn decode_frame(src: &[u8]) -> Result<Frame> {
    let Some(&first) = src.first() else {
        return Err(FrameError::Truncated {
            needed: FRAME_OVERHEAD,
            available: 0,
        });
    };
    if first != SOF {
        return Err(FrameError::InvalidSof(first));
    }
    if src.len() < SOF_SIZE + HEADER_SIZE {
        return Err(FrameError::Truncated {
            needed: FRAME_OVERHEAD,
            available: src.len(),
        });
    }

    let header = FrameHeader::from_bytes([src[1], src[2], src[3]]);
    let total = header.frame_size();
    if src.len() < total {
        return Err(FrameError::Truncated {
            needed: total,
            available: src.len(),
        });
    }

    let tail_at = total - TAIL_SIZE;
    let expected = checksum::compute(&src[..tail_at]);
    let actual = u16::from_le_bytes([src[tail_at], src[tail_at + 1]]);
    if expected != actual {
        return Err(FrameError::ChecksumMismatch { expected, actual });
    }

    let body_at = SOF_SIZE + HEADER_SIZE;
    Ok(Frame {
        header,
        body: Bytes::copy_from_slice(&src[body_at..tail_at]),
        checksum: actual,
    })
}

/// Decode one complete frame carrying message `M`.
pub fn decode_request<M: Message>(src: &[u8]) -> Result<M> {
    decode_frame(src)?.decode_message()
}
