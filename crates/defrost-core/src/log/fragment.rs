use derive_more::Display;

/// Fixed physical unit of a shard file. The final block may be shorter.
pub const BLOCK_SIZE: usize = 32 * 1024;

/// checksum (4, LE) + length (2, LE) + type (1).
pub const HEADER_SIZE: usize = 7;

///
/// FragmentType
///
/// Wire tags are part of the container format and must remain fixed.
///

#[repr(u8)]
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum FragmentType {
    Full = 1,
    First = 2,
    Middle = 3,
    Last = 4,
}

impl FragmentType {
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Full),
            2 => Some(Self::First),
            3 => Some(Self::Middle),
            4 => Some(Self::Last),
            _ => None,
        }
    }

    #[must_use]
    pub const fn to_byte(self) -> u8 {
        self as u8
    }
}

///
/// FragmentHeader
///
/// Decoded header of one fragment. The payload always follows the header
/// within the same block.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FragmentHeader {
    pub checksum: u32,
    pub length: u16,
    pub type_byte: u8,
}

impl FragmentHeader {
    /// Decode a header from the first [`HEADER_SIZE`] bytes of `buf`.
    /// Callers guarantee `buf` holds at least a full header.
    #[must_use]
    pub fn parse(buf: &[u8]) -> Self {
        let checksum = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let length = u16::from_le_bytes([buf[4], buf[5]]);

        Self {
            checksum,
            length,
            type_byte: buf[6],
        }
    }
}
