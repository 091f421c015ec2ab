//! Typed message bodies.
//!
//! Each message has a fixed-size little-endian body and a unique command id.
//! New message types only need a [`Message`] impl; the scanner and the
//! dispatch layer never match on concrete types.

use std::borrow::Cow;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Size of the fixed alias text field.
pub const ALIAS_LEN: usize = 10;

/// A self-describing, fixed-size message body.
pub trait Message: Sized + Send + 'static {
    /// Command id carried in the frame header.
    const COMMAND: u16;
    /// Exact body size in bytes.
    const SIZE: usize;
    /// Short name used in logs.
    const NAME: &'static str;

    /// Append the body to `dst`. Must write exactly [`Self::SIZE`] bytes.
    fn put_body(&self, dst: &mut impl BufMut);

    /// Read the body from `src`, which holds at least [`Self::SIZE`] bytes.
    fn get_body(src: &mut impl Buf) -> Self;

    /// Encode the body into a fresh buffer.
    fn encode_body(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(Self::SIZE);
        self.put_body(&mut dst);
        dst.freeze()
    }

    /// Decode a body, rejecting any length other than [`Self::SIZE`].
    fn decode_body(body: &[u8]) -> Result<Self> {
        if body.len() != Self::SIZE {
            return Err(FrameError::BodySizeMismatch {
                command: Self::COMMAND,
                expected: Self::SIZE,
                actual: body.len(),
            });
        }
        let mut src = body;
        Ok(Self::get_body(&mut src))
    }
}

/// Assigns a display alias to a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableAlias {
    pub variable_id: u16,
    /// NUL-padded text.
    pub alias: [u8; ALIAS_LEN],
}

impl VariableAlias {
    /// Build an alias, truncating `alias` to [`ALIAS_LEN`] bytes on a
    /// character boundary.
    pub fn new(variable_id: u16, alias: &str) -> Self {
        let mut end = alias.len().min(ALIAS_LEN);
        while !alias.is_char_boundary(end) {
            end -= 1;
        }
        let mut raw = [0u8; ALIAS_LEN];
        raw[..end].copy_from_slice(&alias.as_bytes()[..end]);
        Self {
            variable_id,
            alias: raw,
        }
    }

    /// Alias text up to the first NUL.
    pub fn alias_str(&self) -> Cow<'_, str> {
        let end = self
            .alias
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(ALIAS_LEN);
        String::from_utf8_lossy(&self.alias[..end])
    }
}

impl Message for VariableAlias {
    const COMMAND: u16 = 0x0010;
    const SIZE: usize = 2 + ALIAS_LEN;
    const NAME: &'static str = "variable-alias";

    fn put_body(&self, dst: &mut impl BufMut) {
        dst.put_u16_le(self.variable_id);
        dst.put_slice(&self.alias);
    }

    fn get_body(src: &mut impl Buf) -> Self {
        let variable_id = src.get_u16_le();
        let mut alias = [0u8; ALIAS_LEN];
        src.copy_to_slice(&mut alias);
        Self { variable_id, alias }
    }
}

/// A new sample for a variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateVariable {
    pub variable_id: u16,
    pub value: f32,
}

impl Message for UpdateVariable {
    const COMMAND: u16 = 0x0020;
    const SIZE: usize = 6;
    const NAME: &'static str = "update-variable";

    fn put_body(&self, dst: &mut impl BufMut) {
        dst.put_u16_le(self.variable_id);
        dst.put_f32_le(self.value);
    }

    fn get_body(src: &mut impl Buf) -> Self {
        Self {
            variable_id: src.get_u16_le(),
            value: src.get_f32_le(),
        }
    }
}

/// Stops tracking a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveVariable {
    pub variable_id: u16,
}

impl Message for RemoveVariable {
    const COMMAND: u16 = 0x0030;
    const SIZE: usize = 2;
    const NAME: &'static str = "remove-variable";

    fn put_body(&self, dst: &mut impl BufMut) {
        dst.put_u16_le(self.variable_id);
    }

    fn get_body(src: &mut impl Buf) -> Self {
        Self {
            variable_id: src.get_u16_le(),
        }
    }
}

/// One term of a PID controller.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PidArgument {
    pub scale: f32,
    pub out_max: f32,
    pub value: f32,
}

impl PidArgument {
    const SIZE: usize = 12;

    pub fn new(scale: f32, out_max: f32, value: f32) -> Self {
        Self {
            scale,
            out_max,
            value,
        }
    }

    fn put(&self, dst: &mut impl BufMut) {
        dst.put_f32_le(self.scale);
        dst.put_f32_le(self.out_max);
        dst.put_f32_le(self.value);
    }

    fn get(src: &mut impl Buf) -> Self {
        Self {
            scale: src.get_f32_le(),
            out_max: src.get_f32_le(),
            value: src.get_f32_le(),
        }
    }
}

/// Applies new P, I and D parameters on the device.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ApplyArgument {
    pub p: PidArgument,
    pub i: PidArgument,
    pub d: PidArgument,
}

impl Message for ApplyArgument {
    const COMMAND: u16 = 0x0040;
    const SIZE: usize = 3 * PidArgument::SIZE;
    const NAME: &'static str = "apply-argument";

    fn put_body(&self, dst: &mut impl BufMut) {
        self.p.put(dst);
        self.i.put(dst);
        self.d.put(dst);
    }

    fn get_body(src: &mut impl Buf) -> Self {
        Self {
            p: PidArgument::get(src),
            i: PidArgument::get(src),
            d: PidArgument::get(src),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_sizes_match_wire_layout() {
        assert_eq!(VariableAlias::SIZE, 12);
        assert_eq!(UpdateVariable::SIZE, 6);
        assert_eq!(RemoveVariable::SIZE, 2);
        assert_eq!(ApplyArgument::SIZE, 36);

        assert_eq!(VariableAlias::new(1, "Foo").encode_body().len(), 12);
        assert_eq!(ApplyArgument::default().encode_body().len(), 36);
    }

    #[test]
    fn command_ids_are_distinct() {
        let ids = [
            VariableAlias::COMMAND,
            UpdateVariable::COMMAND,
            RemoveVariable::COMMAND,
            ApplyArgument::COMMAND,
        ];
        assert_eq!(ids, [0x0010, 0x0020, 0x0030, 0x0040]);
    }

    #[test]
    fn update_body_layout() {
        let body = UpdateVariable {
            variable_id: 7,
            value: 1.0,
        }
        .encode_body();
        assert_eq!(body.as_ref(), &[0x07, 0x00, 0x00, 0x00, 0x80, 0x3F]);
    }

    #[test]
    fn alias_is_nul_padded_and_read_back() {
        let alias = VariableAlias::new(10, "Var1");
        assert_eq!(&alias.alias[..5], b"Var1\0");
        assert_eq!(alias.alias_str(), "Var1");

        let decoded = VariableAlias::decode_body(&alias.encode_body()).unwrap();
        assert_eq!(decoded, alias);
    }

    #[test]
    fn long_alias_truncates_on_char_boundary() {
        let alias = VariableAlias::new(1, "temperature_sensor");
        assert_eq!(alias.alias_str(), "temperatur");

        // 'é' is two bytes and would straddle the 10-byte limit.
        let alias = VariableAlias::new(1, "ééééé_x");
        assert_eq!(alias.alias_str(), "ééééé");
        let alias = VariableAlias::new(1, "aéééééé");
        assert_eq!(alias.alias_str(), "aéééé");
    }

    #[test]
    fn full_width_alias_has_no_terminator() {
        let alias = VariableAlias::new(3, "0123456789");
        assert_eq!(alias.alias_str(), "0123456789");
    }

    #[test]
    fn decode_rejects_wrong_length() {
        let err = RemoveVariable::decode_body(&[1, 2, 3]).unwrap_err();
        assert!(matches!(
            err,
            FrameError::BodySizeMismatch {
                command: 0x0030,
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn apply_argument_keeps_term_order() {
        let msg = ApplyArgument {
            p: PidArgument::new(1.0, 100.0, 0.5),
            i: PidArgument::new(2.0, 50.0, 0.1),
            d: PidArgument::new(3.0, 25.0, 0.01),
        };
        let body = msg.encode_body();
        assert_eq!(&body[..4], &1.0f32.to_le_bytes());
        assert_eq!(&body[12..16], &2.0f32.to_le_bytes());
        assert_eq!(&body[24..28], &3.0f32.to_le_bytes());
        assert_eq!(ApplyArgument::decode_body(&body).unwrap(), msg);
    }
}
