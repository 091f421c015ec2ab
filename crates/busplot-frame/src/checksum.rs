//! CRC-16/CCITT-FALSE over a frame.
//!
//! Polynomial `0x1021`, initial value `0xFFFF`, no input/output reflection,
//! no final XOR. The covered range is the start-of-frame marker through the
//! last body byte; the result is stored little-endian in the frame tail.

use crate::wire::TAIL_SIZE;

const POLY: u16 = 0x1021;
const INIT: u16 = 0xFFFF;

const TABLE: [u16; 256] = build_table();

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Compute the checksum of `bytes`.
pub fn compute(bytes: &[u8]) -> u16 {
    bytes.iter().fold(INIT, |crc, &b| {
        (crc << 8) ^ TABLE[usize::from((crc >> 8) as u8 ^ b)]
    })
}

/// Verify a complete frame whose last two bytes are the little-endian checksum
/// of everything before them.
pub fn verify(frame: &[u8]) -> bool {
    if frame.len() < TAIL_SIZE {
        return false;
    }
    let (covered, tail) = frame.split_at(frame.len() - TAIL_SIZE);
    u16::from_le_bytes([tail[0], tail[1]]) == compute(covered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitwise(bytes: &[u8]) -> u16 {
        let mut crc = INIT;
        for &b in bytes {
            crc ^= u16::from(b) << 8;
            for _ in 0..8 {
                crc = if crc & 0x8000 != 0 {
                    (crc << 1) ^ POLY
                } else {
                    crc << 1
                };
            }
        }
        crc
    }

    #[test]
    fn known_check_value() {
        assert_eq!(compute(b"123456789"), 0x29B1);
    }

    #[test]
    fn empty_input_is_init() {
        assert_eq!(compute(&[]), 0xFFFF);
    }

    #[test]
    fn table_matches_bitwise_definition() {
        let sample: Vec<u8> = (0..=255u8).collect();
        assert_eq!(compute(&sample), bitwise(&sample));

        let frame = [0xA5, 0x02, 0x30, 0x00, 0x07, 0x00];
        assert_eq!(compute(&frame), bitwise(&frame));
    }

    #[test]
    fn verify_accepts_appended_checksum() {
        let mut frame = b"123456789".to_vec();
        frame.extend_from_slice(&0x29B1u16.to_le_bytes());
        assert!(verify(&frame));

        let last = frame.len() - 1;
        frame[last] ^= 0x01;
        assert!(!verify(&frame));
    }

    #[test]
    fn verify_rejects_short_input() {
        assert!(!verify(&[]));
        assert!(!verify(&[0xFF]));
    }
}
