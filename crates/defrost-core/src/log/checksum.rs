//! Fragment checksums.
//!
//! The container stores CRC32C values masked the way LevelDB masks them,
//! so that checksumming a buffer that itself contains checksums does not
//! degenerate. The stored value covers the fragment's type byte followed
//! by its payload.

const MASK_DELTA: u32 = 0xa282_ead8;

/// Rotate-and-offset mask applied to every stored CRC.
#[must_use]
pub const fn mask(crc: u32) -> u32 {
    ((crc >> 15) | (crc << 17)).wrapping_add(MASK_DELTA)
}

/// Inverse of [`mask`].
#[must_use]
pub const fn unmask(masked: u32) -> u32 {
    let rot = masked.wrapping_sub(MASK_DELTA);
    (rot >> 17) | (rot << 15)
}

/// Masked checksum of one fragment: type byte, then payload.
#[must_use]
pub fn fragment_checksum(type_byte: u8, payload: &[u8]) -> u32 {
    let crc = crc32c::crc32c_append(crc32c::crc32c(&[type_byte]), payload);

    mask(crc)
}
