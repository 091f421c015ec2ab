//! Frame scanner: pulls frames out of an unsynchronized byte stream.
//!
//! ```text
//! SeekingSof ──SOF──▶ ReadingHeader ──known, size ok──▶ ReadingBody ──▶ VerifyingChecksum
//!     ▲                    │                                                  │
//!     └────────────────────┴──── unknown / mismatch / read failure / done ────┘
//! ```
//!
//! Every cycle starts and ends in [`ScanState::SeekingSof`]. Framing faults
//! come back as [`ScanEvent::Discarded`]; only a dead transport is an error.

use std::collections::HashMap;
use std::fmt;
use std::hash::BuildHasher;

use bytes::{BufMut, BytesMut};
use busplot_transport::{Transport, TransportError};
use tracing::{debug, trace, warn};

use crate::checksum;
use crate::codec::Frame;
use crate::error::{FrameError, Result};
use crate::wire::{FrameHeader, HEADER_SIZE, SOF, SOF_SIZE, TAIL_SIZE};

/// Resolves a command id to the body size it requires.
pub trait CommandLookup {
    /// `None` when the command is not registered.
    fn expected_size(&self, command: u16) -> Option<usize>;
}

impl<S: BuildHasher> CommandLookup for HashMap<u16, usize, S> {
    fn expected_size(&self, command: u16) -> Option<usize> {
        self.get(&command).copied()
    }
}

/// Where the scanner is within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    SeekingSof,
    ReadingHeader,
    ReadingBody(FrameHeader),
    VerifyingChecksum(FrameHeader),
}

/// The part of a frame a read failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStage {
    Header,
    Body,
}

impl fmt::Display for ScanStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanStage::Header => f.write_str("header"),
            ScanStage::Body => f.write_str("body"),
        }
    }
}

/// Why a frame was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discard {
    /// No handler for the command; body and tail were skipped.
    UnknownCommand { command: u16, body_len: u8 },
    /// The header length differs from the registered body size.
    SizeMismatch {
        command: u16,
        expected: usize,
        actual: usize,
    },
    /// The tail does not match the frame contents.
    ChecksumMismatch {
        command: u16,
        expected: u16,
        actual: u16,
    },
    /// A transport read failed mid-frame.
    ReadFailed { stage: ScanStage, reason: String },
}

impl fmt::Display for Discard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discard::UnknownCommand { command, body_len } => {
                write!(f, "unknown command 0x{command:04X} ({body_len}-byte body)")
            }
            Discard::SizeMismatch {
                command,
                expected,
                actual,
            } => write!(
                f,
                "command 0x{command:04X} declares {actual} bytes, expected {expected}"
            ),
            Discard::ChecksumMismatch {
                command,
                expected,
                actual,
            } => write!(
                f,
                "checksum mismatch on command 0x{command:04X} (computed 0x{expected:04X}, received 0x{actual:04X})"
            ),
            Discard::ReadFailed { stage, reason } => write!(f, "{stage} read failed: {reason}"),
        }
    }
}

/// Outcome of one scan cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// A verified frame for a registered command with the registered size.
    Frame(Frame),
    /// A frame was dropped and the scanner resynchronized.
    Discarded(Discard),
}

/// Running counters over the life of a scanner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub frames: u64,
    pub unknown_command: u64,
    pub size_mismatch: u64,
    pub checksum_mismatch: u64,
    pub read_failures: u64,
    /// Bytes dropped while looking for a start-of-frame marker.
    pub bytes_skipped: u64,
}

impl ScanStats {
    /// Frames dropped for any reason.
    pub fn discarded(&self) -> u64 {
        self.unknown_command + self.size_mismatch + self.checksum_mismatch + self.read_failures
    }
}

/// Synchronizes on start-of-frame markers and yields checked frames.
///
/// The scanner owns no transport; the caller passes it in on every cycle so
/// one scanner can be driven by whichever thread owns the reading side.
#[derive(Debug)]
pub struct FrameScanner {
    state: ScanState,
    stats: ScanStats,
}

impl Default for FrameScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameScanner {
    pub fn new() -> Self {
        Self {
            state: ScanState::SeekingSof,
            stats: ScanStats::default(),
        }
    }

    /// Current state. Only differs from `SeekingSof` after a fatal error.
    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    /// Run one cycle: seek a marker, read one frame and classify it.
    ///
    /// Returns `Err` only when the transport can produce no more bytes.
    pub fn step(
        &mut self,
        transport: &dyn Transport,
        lookup: &dyn CommandLookup,
    ) -> Result<ScanEvent> {
        self.state = ScanState::SeekingSof;
        self.seek_sof(transport)?;

        self.state = ScanState::ReadingHeader;
        let mut raw = [0u8; HEADER_SIZE];
        if let Err(err) = transport.read_exact(&mut raw) {
            return self.read_failed(transport, ScanStage::Header, err);
        }
        let header = FrameHeader::from_bytes(raw);
        trace!(
            command = header.command,
            body_len = header.body_len,
            "frame header"
        );

        let Some(expected) = lookup.expected_size(header.command) else {
            return self.skip_unknown(transport, header);
        };
        if expected != header.body_size() {
            self.stats.size_mismatch += 1;
            self.state = ScanState::SeekingSof;
            return Ok(self.discard(Discard::SizeMismatch {
                command: header.command,
                expected,
                actual: header.body_size(),
            }));
        }

        self.state = ScanState::ReadingBody(header);
        let total = header.frame_size();
        let mut buf = BytesMut::with_capacity(total);
        buf.put_u8(SOF);
        buf.put_slice(&raw);
        buf.resize(total, 0);
        if let Err(err) = transport.read_exact(&mut buf[SOF_SIZE + HEADER_SIZE..]) {
            return self.read_failed(transport, ScanStage::Body, err);
        }

        self.state = ScanState::VerifyingChecksum(header);
        let tail_at = total - TAIL_SIZE;
        let expected = checksum::compute(&buf[..tail_at]);
        let actual = u16::from_le_bytes([buf[tail_at], buf[tail_at + 1]]);
        self.state = ScanState::SeekingSof;
        if expected != actual {
            self.stats.checksum_mismatch += 1;
            return Ok(self.discard(Discard::ChecksumMismatch {
                command: header.command,
                expected,
                actual,
            }));
        }

        self.stats.frames += 1;
        debug!(
            command = header.command,
            body_len = header.body_len,
            "frame received"
        );
        let body = buf.freeze().slice(SOF_SIZE + HEADER_SIZE..tail_at);
        Ok(ScanEvent::Frame(Frame {
            header,
            body,
            checksum: actual,
        }))
    }

    /// Cycle until a frame arrives, dropping every discard.
    pub fn next_frame(
        &mut self,
        transport: &dyn Transport,
        lookup: &dyn CommandLookup,
    ) -> Result<Frame> {
        loop {
            if let ScanEvent::Frame(frame) = self.step(transport, lookup)? {
                return Ok(frame);
            }
        }
    }

    fn seek_sof(&mut self, transport: &dyn Transport) -> Result<()> {
        let mut skipped = 0u64;
        let mut byte = [0u8; 1];
        let found = loop {
            if let Err(err) = transport.read_exact(&mut byte) {
                break Err(err);
            }
            if byte[0] == SOF {
                break Ok(());
            }
            skipped += 1;
        };

        if skipped > 0 {
            self.stats.bytes_skipped += skipped;
            trace!(skipped, "skipped bytes before start of frame");
        }
        found.map_err(FrameError::from)
    }

    fn skip_unknown(&mut self, transport: &dyn Transport, header: FrameHeader) -> Result<ScanEvent> {
        self.state = ScanState::ReadingBody(header);
        if let Err(err) = transport.read(header.body_size() + TAIL_SIZE) {
            return self.read_failed(transport, ScanStage::Body, err);
        }
        self.stats.unknown_command += 1;
        self.state = ScanState::SeekingSof;
        Ok(self.discard(Discard::UnknownCommand {
            command: header.command,
            body_len: header.body_len,
        }))
    }

    fn read_failed(
        &mut self,
        transport: &dyn Transport,
        stage: ScanStage,
        err: TransportError,
    ) -> Result<ScanEvent> {
        if err.is_closed() || !transport.is_open() {
            return Err(FrameError::ConnectionClosed);
        }
        self.stats.read_failures += 1;
        self.state = ScanState::SeekingSof;
        Ok(self.discard(Discard::ReadFailed {
            stage,
            reason: err.to_string(),
        }))
    }

    fn discard(&self, reason: Discard) -> ScanEvent {
        warn!(%reason, "frame discarded, resynchronizing");
        ScanEvent::Discarded(reason)
    }
}
