//! Block-framed log container reader.
//!
//! A shard file is a sequence of 32 KiB blocks. Each block holds one or
//! more checksummed fragments; a logical record is a single FULL fragment
//! or a FIRST..MIDDLE*..LAST run reassembled in file order. Trailing block
//! bytes smaller than a fragment header are zero padding.
//!
//! Corruption recovery is bounded at block granularity: on a checksum
//! mismatch or an illegal fragment-type sequence the reader reports the
//! corruption, drops any partially accumulated run, and resumes scanning
//! at the next block boundary. Io errors are fatal for the shard.

mod checksum;
mod fragment;


pub use checksum::{fragment_checksum, mask, unmask};
pub use fragment::{BLOCK_SIZE, FragmentType, FragmentHeader, HEADER_SIZE};

use std::io::Read;
use thiserror::Error as ThisError;

///
/// FramingError
///
/// Recoverable container-level corruption. Never unwinds the pipeline;
/// converted into an anomaly by the caller.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum FramingError {
    #[error("fragment checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("invalid fragment type byte {0:#04x}")]
    InvalidFragmentType(u8),

    #[error("fragment length {length} overruns block: {available} bytes available")]
    FragmentOverrun { length: u16, available: usize },

    #[error("{0} fragment with no record in progress")]
    OrphanContinuation(FragmentType),

    #[error("{0} fragment while a record is in progress")]
    UnexpectedStart(FragmentType),

    #[error("shard ended mid-record: {collected} bytes collected")]
    TruncatedRecord { collected: usize },
}

///
/// LogicalRecord
///
/// One reassembled record payload. The offset is the file position of the
/// record's first fragment header.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LogicalRecord {
    pub offset: u64,
    pub payload: Vec<u8>,
}

///
/// LogEvent
///
/// One observation while scanning a shard: either a complete logical
/// record or a contained corruption (record skipped, scan resynced).
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LogEvent {
    Record(LogicalRecord),
    Corruption { offset: u64, error: FramingError },
}

// In-progress FIRST..LAST run.
struct PendingRun {
    offset: u64,
    payload: Vec<u8>,
}

///
/// LogReader
///
/// Streaming reader over one shard. Holds exactly one block in memory.
///

pub struct LogReader<R: Read> {
    inner: R,
    block: Vec<u8>,
    block_len: usize,
    block_start: u64,
    pos: usize,
    eof: bool,
    started: bool,
    pending: Option<PendingRun>,
}

impl<R: Read> LogReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            block: vec![0u8; BLOCK_SIZE],
            block_len: 0,
            block_start: 0,
            pos: 0,
            eof: false,
            started: false,
            pending: None,
        }
    }

    /// Next record or contained corruption; `None` at end of shard.
    /// Io errors abort the shard and must not be retried.
    pub fn next_event(&mut self) -> Result<Option<LogEvent>, std::io::Error> {
        loop {
            if self.block_len - self.pos < HEADER_SIZE {
                // Remaining bytes are zero padding (or nothing); move on.
                if !self.load_block()? {
                    return Ok(self.finish());
                }
                continue;
            }

            let offset = self.block_start + self.pos as u64;
            let header = FragmentHeader::parse(&self.block[self.pos..]);
            let after_header = self.pos + HEADER_SIZE;
            let available = self.block_len - after_header;

            if usize::from(header.length) > available {
                return Ok(Some(self.corrupt(
                    offset,
                    FramingError::FragmentOverrun {
                        length: header.length,
                        available,
                    },
                )));
            }

            let payload = &self.block[after_header..after_header + usize::from(header.length)];
            let computed = fragment_checksum(header.type_byte, payload);
            if computed != header.checksum {
                return Ok(Some(self.corrupt(
                    offset,
                    FramingError::ChecksumMismatch {
                        stored: header.checksum,
                        computed,
                    },
                )));
            }

            let Some(fragment_type) = FragmentType::from_byte(header.type_byte) else {
                return Ok(Some(
                    self.corrupt(offset, FramingError::InvalidFragmentType(header.type_byte)),
                ));
            };

            self.pos = after_header + usize::from(header.length);

            match fragment_type {
                FragmentType::Full => {
                    if self.pending.is_some() {
                        return Ok(Some(
                            self.corrupt(offset, FramingError::UnexpectedStart(fragment_type)),
                        ));
                    }

                    return Ok(Some(LogEvent::Record(LogicalRecord {
                        offset,
                        payload: payload.to_vec(),
                    })));
                }
                FragmentType::First => {
                    if self.pending.is_some() {
                        return Ok(Some(
                            self.corrupt(offset, FramingError::UnexpectedStart(fragment_type)),
                        ));
                    }

                    self.pending = Some(PendingRun {
                        offset,
                        payload: payload.to_vec(),
                    });
                }
                FragmentType::Middle => {
                    let Some(run) = self.pending.as_mut() else {
                        return Ok(Some(
                            self.corrupt(offset, FramingError::OrphanContinuation(fragment_type)),
                        ));
                    };
                    run.payload.extend_from_slice(payload);
                }
                FragmentType::Last => {
                    let Some(mut run) = self.pending.take() else {
                        return Ok(Some(
                            self.corrupt(offset, FramingError::OrphanContinuation(fragment_type)),
                        ));
                    };
                    run.payload.extend_from_slice(payload);

                    return Ok(Some(LogEvent::Record(LogicalRecord {
                        offset: run.offset,
                        payload: run.payload,
                    })));
                }
            }
        }
    }

    // Report corruption, drop any accumulated run, resync at the next block.
    fn corrupt(&mut self, offset: u64, error: FramingError) -> LogEvent {
        self.pending = None;
        self.pos = self.block_len;

        LogEvent::Corruption { offset, error }
    }

    // End of shard: a still-open run is a framing violation, not a record.
    fn finish(&mut self) -> Option<LogEvent> {
        let run = self.pending.take()?;

        Some(LogEvent::Corruption {
            offset: run.offset,
            error: FramingError::TruncatedRecord {
                collected: run.payload.len(),
            },
        })
    }

    // Read the next block; false at end of file. The final block may be
    // short; every other block is exactly BLOCK_SIZE bytes.
    fn load_block(&mut self) -> Result<bool, std::io::Error> {
        if self.eof {
            return Ok(false);
        }
        if self.started {
            self.block_start += self.block_len as u64;
        }
        self.started = true;

        let mut filled = 0;
        while filled < BLOCK_SIZE {
            let n = self.inner.read(&mut self.block[filled..])?;
            if n == 0 {
                self.eof = true;
                break;
            }
            filled += n;
        }

        self.block_len = filled;
        self.pos = 0;

        Ok(filled > 0)
    }
}
