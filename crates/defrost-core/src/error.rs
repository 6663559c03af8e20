use serde::Serialize;
use std::cmp::Ordering;

///
/// AnomalyKind
///
/// Stable classification for every recoverable discrepancy the pipeline
/// records instead of raising.
///
/// IMPORTANT:
/// Labels appear in serialized reports and must remain fixed.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Checksum mismatch or illegal fragment-type sequence in a shard.
    Framing,
    /// Malformed entity payload inside an otherwise valid record.
    Decode,
    /// Translation could not satisfy a required target field.
    Mapping,
    /// Decoded count differs from the manifest's expected count.
    CountMismatch,
    /// Entity key path names a different kind than its shard's.
    SchemaViolation,
    /// Shard became unreadable mid-stream and was abandoned.
    ShardIo,
    /// Shard processing stopped early on caller request.
    Cancelled,
}

impl AnomalyKind {
    /// Stable human-readable label for diagnostics and reports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Framing => "framing",
            Self::Decode => "decode",
            Self::Mapping => "mapping",
            Self::CountMismatch => "count_mismatch",
            Self::SchemaViolation => "schema_violation",
            Self::ShardIo => "shard_io",
            Self::Cancelled => "cancelled",
        }
    }
}

///
/// Anomaly
///
/// One recorded discrepancy, tagged with shard/offset provenance.
/// Anomalies are immutable once recorded; the validator only sorts them.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub shard: String,
    pub offset: u64,
    pub reason: String,
}

impl Anomaly {
    #[must_use]
    pub fn new(
        kind: AnomalyKind,
        shard: impl Into<String>,
        offset: u64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            shard: shard.into(),
            offset,
            reason: reason.into(),
        }
    }

    /// Deterministic report ordering: by shard path, then byte offset.
    #[must_use]
    pub fn provenance_cmp(&self, other: &Self) -> Ordering {
        self.shard
            .cmp(&other.shard)
            .then(self.offset.cmp(&other.offset))
    }
}
