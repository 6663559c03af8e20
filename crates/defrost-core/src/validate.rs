//! Cross-validation of decode/translate outcomes against the manifest.
//!
//! Workers accumulate one [`ShardSummary`] per shard with no shared
//! state; the validator merges them in shard-index order, so the final
//! report is deterministic regardless of worker interleaving.

use crate::{
    error::{Anomaly, AnomalyKind},
    manifest::ExportManifest,
};
use serde::Serialize;
use std::collections::BTreeMap;

///
/// ShardSummary
///
/// Per-shard accounting produced by one worker. `completed` is false
/// when the shard was abandoned (io failure or cancellation).
///

#[derive(Clone, Debug)]
pub struct ShardSummary {
    pub kind: String,
    pub shard: String,
    pub decoded: u64,
    pub translated: u64,
    pub anomalies: Vec<Anomaly>,
    pub completed: bool,
}

impl ShardSummary {
    #[must_use]
    pub fn new(kind: impl Into<String>, shard: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            shard: shard.into(),
            decoded: 0,
            translated: 0,
            anomalies: Vec::new(),
            completed: true,
        }
    }
}

///
/// KindReport
///
/// Validation result for one kind. `unprocessed_shards` separates
/// "shard not processed" from "shard processed with anomalies".
///

#[derive(Clone, Debug, Serialize)]
pub struct KindReport {
    pub name: String,
    pub expected_count: u64,
    pub decoded_count: u64,
    pub translated_count: u64,
    pub anomalies: Vec<Anomaly>,
    pub unprocessed_shards: Vec<String>,
}

impl KindReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.anomalies.is_empty()
            && self.unprocessed_shards.is_empty()
            && self.decoded_count == self.expected_count
    }
}

///
/// ValidationReport
///
/// Final run accounting: kind sections in manifest order, anomalies
/// sorted by shard path and byte offset.
///

#[derive(Clone, Debug, Serialize)]
pub struct ValidationReport {
    pub export_id: String,
    pub clean: bool,
    pub kinds: Vec<KindReport>,
}

impl ValidationReport {
    /// Total anomaly count across kinds.
    #[must_use]
    pub fn anomaly_count(&self) -> usize {
        self.kinds.iter().map(|kind| kind.anomalies.len()).sum()
    }
}

///
/// Validator
///
/// Order-independent aggregation keyed by kind name; the manifest fixes
/// the output order at the end.
///

pub struct Validator<'a> {
    manifest: &'a ExportManifest,
    by_kind: BTreeMap<String, KindAccumulator>,
}

#[derive(Default)]
struct KindAccumulator {
    decoded: u64,
    translated: u64,
    anomalies: Vec<Anomaly>,
    unprocessed: Vec<String>,
}

impl<'a> Validator<'a> {
    #[must_use]
    pub fn new(manifest: &'a ExportManifest) -> Self {
        Self {
            manifest,
            by_kind: BTreeMap::new(),
        }
    }

    /// Fold one shard's outcome into the per-kind accumulator.
    pub fn ingest(&mut self, summary: ShardSummary) {
        let slot = self.by_kind.entry(summary.kind).or_default();
        slot.decoded += summary.decoded;
        slot.translated += summary.translated;
        slot.anomalies.extend(summary.anomalies);
        if !summary.completed {
            slot.unprocessed.push(summary.shard);
        }
    }

    /// Close out the run: count checks, deterministic ordering, overall
    /// clean flag.
    #[must_use]
    pub fn finish(mut self) -> ValidationReport {
        let mut kinds = Vec::with_capacity(self.manifest.kinds.len());

        for info in &self.manifest.kinds {
            let mut slot = self.by_kind.remove(&info.name).unwrap_or_default();

            // An abandoned shard already explains a shortfall; only fully
            // processed kinds get a count check.
            // A count mismatch has no single shard; the kind name is the
            // provenance label.
            if slot.unprocessed.is_empty() && slot.decoded != info.expected_count {
                slot.anomalies.push(Anomaly::new(
                    AnomalyKind::CountMismatch,
                    info.name.clone(),
                    0,
                    format!(
                        "kind '{}': expected {} entities, decoded {}",
                        info.name, info.expected_count, slot.decoded
                    ),
                ));
            }

            slot.anomalies.sort_by(Anomaly::provenance_cmp);
            slot.unprocessed.sort_unstable();

            kinds.push(KindReport {
                name: info.name.clone(),
                expected_count: info.expected_count,
                decoded_count: slot.decoded,
                translated_count: slot.translated,
                anomalies: slot.anomalies,
                unprocessed_shards: slot.unprocessed,
            });
        }

        let clean = kinds.iter().all(KindReport::is_clean);

        ValidationReport {
            export_id: self.manifest.export_id.clone(),
            clean,
            kinds,
        }
    }
}
