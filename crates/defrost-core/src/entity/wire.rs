//! Tagged binary wire primitives: base-128 varints, field tags, and
//! length-prefixed slices. Field numbers the reader does not know are
//! skipped by wire type, keeping the payload format forward compatible.

use super::decode::DecodeError;

const VARINT_MAX_BYTES: usize = 10;

///
/// WireType
///
/// Tags are part of the payload format and must remain fixed.
///

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LenDelimited = 2,
}

impl WireType {
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Varint),
            1 => Some(Self::Fixed64),
            2 => Some(Self::LenDelimited),
            _ => None,
        }
    }
}

///
/// WireReader
///
/// Cursor over one record payload.
///

pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    #[must_use]
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Current cursor position, for error context.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    pub fn read_byte(&mut self) -> Result<u8, DecodeError> {
        let byte = *self
            .buf
            .get(self.pos)
            .ok_or(DecodeError::Truncated { at: self.pos })?;
        self.pos += 1;

        Ok(byte)
    }

    /// Base-128 varint, at most ten bytes.
    pub fn read_varint(&mut self) -> Result<u64, DecodeError> {
        let mut result: u64 = 0;
        for i in 0..VARINT_MAX_BYTES {
            let byte = self.read_byte()?;
            result |= u64::from(byte & 0x7f) << (i * 7);
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }

        Err(DecodeError::VarintOverflow { at: self.pos })
    }

    /// Field tag: `(field_number << 3) | wire_type`.
    pub fn read_tag(&mut self) -> Result<(u32, WireType), DecodeError> {
        let at = self.pos;
        let raw = self.read_varint()?;
        let wire_byte = u8::try_from(raw & 0x07).unwrap_or(u8::MAX);
        let wire_type =
            WireType::from_byte(wire_byte).ok_or(DecodeError::InvalidWireType {
                at,
                wire_type: wire_byte,
            })?;
        let field = u32::try_from(raw >> 3).map_err(|_| DecodeError::FieldNumberOverflow { at })?;

        Ok((field, wire_type))
    }

    pub fn read_fixed64(&mut self) -> Result<u64, DecodeError> {
        let end = self.pos + 8;
        let bytes = self
            .buf
            .get(self.pos..end)
            .ok_or(DecodeError::Truncated { at: self.pos })?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        self.pos = end;

        Ok(u64::from_le_bytes(raw))
    }

    /// Length-prefixed byte slice.
    pub fn read_len_prefixed(&mut self) -> Result<&'a [u8], DecodeError> {
        let at = self.pos;
        let len = usize::try_from(self.read_varint()?)
            .map_err(|_| DecodeError::LengthOverflow { at })?;
        let end = self
            .pos
            .checked_add(len)
            .ok_or(DecodeError::LengthOverflow { at })?;
        let slice = self
            .buf
            .get(self.pos..end)
            .ok_or(DecodeError::Truncated { at: self.pos })?;
        self.pos = end;

        Ok(slice)
    }

    /// Skip one field's value by wire type (unknown field numbers).
    pub fn skip(&mut self, wire_type: WireType) -> Result<(), DecodeError> {
        match wire_type {
            WireType::Varint => {
                self.read_varint()?;
            }
            WireType::Fixed64 => {
                self.read_fixed64()?;
            }
            WireType::LenDelimited => {
                self.read_len_prefixed()?;
            }
        }

        Ok(())
    }
}
