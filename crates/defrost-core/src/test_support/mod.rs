//! Shared fixtures: a shard-file writer producing the block-framed
//! container format, used by log, pipeline, and validator tests.

use crate::log::{BLOCK_SIZE, FragmentType, HEADER_SIZE, fragment_checksum};

///
/// ShardFileBuilder
///
/// Writes logical records as FULL or FIRST..MIDDLE*..LAST fragment runs,
/// splitting across 32 KiB block boundaries exactly as the exporter does.
///

#[derive(Default)]
pub(crate) struct ShardFileBuilder {
    buf: Vec<u8>,
}

impl ShardFileBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Byte offset the next record's first fragment header will land on.
    pub(crate) fn next_offset(&self) -> u64 {
        let pos_in_block = self.buf.len() % BLOCK_SIZE;
        if BLOCK_SIZE - pos_in_block < HEADER_SIZE {
            (self.buf.len() + (BLOCK_SIZE - pos_in_block)) as u64
        } else {
            self.buf.len() as u64
        }
    }

    pub(crate) fn add_record(&mut self, payload: &[u8]) -> &mut Self {
        let mut rest = payload;
        let mut begin = true;

        loop {
            let pos_in_block = self.buf.len() % BLOCK_SIZE;
            let leftover = BLOCK_SIZE - pos_in_block;
            if leftover < HEADER_SIZE {
                // Too small for a header: zero padding to the block end.
                self.buf.extend(std::iter::repeat_n(0u8, leftover));
                continue;
            }

            let avail = leftover - HEADER_SIZE;
            let take = rest.len().min(avail);
            let end = take == rest.len();
            let fragment_type = match (begin, end) {
                (true, true) => FragmentType::Full,
                (true, false) => FragmentType::First,
                (false, false) => FragmentType::Middle,
                (false, true) => FragmentType::Last,
            };

            self.push_fragment(fragment_type, &rest[..take]);
            rest = &rest[take..];
            begin = false;

            if end {
                return self;
            }
        }
    }

    /// Append a single raw fragment with a valid checksum.
    pub(crate) fn push_fragment(&mut self, fragment_type: FragmentType, data: &[u8]) {
        let checksum = fragment_checksum(fragment_type.to_byte(), data);
        self.buf.extend_from_slice(&checksum.to_le_bytes());
        self.buf
            .extend_from_slice(&u16::try_from(data.len()).unwrap().to_le_bytes());
        self.buf.push(fragment_type.to_byte());
        self.buf.extend_from_slice(data);
    }

    /// Pad the current block with zeros so the next record starts a fresh
    /// block.
    pub(crate) fn pad_to_block_end(&mut self) -> &mut Self {
        let pos_in_block = self.buf.len() % BLOCK_SIZE;
        if pos_in_block != 0 {
            self.buf
                .extend(std::iter::repeat_n(0u8, BLOCK_SIZE - pos_in_block));
        }

        self
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        self.buf.clone()
    }
}

/// Flip one bit so a fragment checksum no longer verifies.
pub(crate) fn corrupt_byte(shard: &mut [u8], offset: usize) {
    shard[offset] ^= 0x01;
}
