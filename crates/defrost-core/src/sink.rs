//! Output sink boundary.
//!
//! Pipeline logic MUST NOT depend on a concrete output format. All
//! translated records flow through [`RecordSink`]; concrete
//! serialization belongs to the caller.

use crate::translate::TranslatedRecord;
use std::io::Write;

///
/// RecordSink
///
/// Append-only consumer of translated records, in the order produced.
/// Across shards that order follows worker interleaving; callers needing
/// manifest order must serialize by kind/shard before consuming.
///

pub trait RecordSink: Send {
    fn accept(&mut self, record: TranslatedRecord) -> std::io::Result<()>;
}

///
/// MemorySink
///
/// Buffers every record; test and small-export convenience.
///

#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<TranslatedRecord>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordSink for MemorySink {
    fn accept(&mut self, record: TranslatedRecord) -> std::io::Result<()> {
        self.records.push(record);

        Ok(())
    }
}

///
/// JsonLinesSink
///
/// One target document per line. Provenance travels in the document's
/// envelope so downstream audits can trace records back to shard bytes.
///

#[derive(Debug)]
pub struct JsonLinesSink<W: Write + Send> {
    inner: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub const fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write + Send> RecordSink for JsonLinesSink<W> {
    fn accept(&mut self, record: TranslatedRecord) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.inner, &record).map_err(std::io::Error::other)?;
        self.inner.write_all(b"\n")
    }
}
