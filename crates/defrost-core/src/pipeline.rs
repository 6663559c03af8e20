//! Pipeline orchestration.
//!
//! Shards are independent units of work: each is read, decoded, and
//! translated by one worker with purely local state, then the per-shard
//! summaries are merged in shard-index order. Per-record and per-block
//! failures become anomalies; only manifest errors, sink failures, and
//! configured escalations (fail-fast, strict mapping) abort the run.

#[cfg(test)]
mod tests;

use crate::{
    entity,
    error::{Anomaly, AnomalyKind},
    log::{FramingError, LogEvent, LogReader},
    manifest::{ExportManifest, ManifestError, ShardRef},
    sink::RecordSink,
    translate::{MappingError, MappingTable, Translator},
    validate::{ShardSummary, ValidationReport, Validator},
};
use std::{
    fs::File,
    io::BufReader,
    path::Path,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
};
use thiserror::Error as ThisError;
use tracing::{debug, info, warn};

/// Progress log cadence, in decoded records per shard.
const PROGRESS_EVERY: u64 = 1000;

///
/// PipelineError
///
/// Fatal run failures. Everything recoverable is an [`Anomaly`] inside
/// the report instead.
///

#[derive(Debug, ThisError)]
pub enum PipelineError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("shard {shard} failed: {source}")]
    Shard {
        shard: String,
        source: std::io::Error,
    },

    #[error("fail-fast: container corruption at {shard}:{offset}: {source}")]
    Framing {
        shard: String,
        offset: u64,
        source: FramingError,
    },

    #[error("strict mapping: record at {shard}:{offset}: {source}")]
    Mapping {
        shard: String,
        offset: u64,
        source: MappingError,
    },

    #[error("output sink failed: {0}")]
    Sink(std::io::Error),
}

///
/// CancelToken
///
/// Cooperative early termination. Workers check between logical records;
/// a cancelled shard lands in the report as such, never as a bare count
/// mismatch.
///

#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

///
/// PipelineConfig
///
/// Immutable run configuration, threaded through construction rather
/// than read from ambient process state.
///

#[derive(Clone, Debug, Default)]
pub struct PipelineConfig {
    /// Worker pool size; 0 means available parallelism.
    pub workers: usize,
    /// Abort the whole run on a framing error or shard io failure.
    pub fail_fast: bool,
    /// Escalate mapping errors from anomalies to fatal.
    pub strict_mapping: bool,
    /// Non-empty list restricts translation to these kinds.
    pub include_kinds: Vec<String>,
    /// Kinds decoded and counted but never translated.
    pub exclude_kinds: Vec<String>,
    pub mappings: MappingTable,
}

impl PipelineConfig {
    fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }

        thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
    }

    fn kind_selected(&self, kind: &str) -> bool {
        if !self.include_kinds.is_empty() && !self.include_kinds.iter().any(|k| k == kind) {
            return false;
        }

        !self.exclude_kinds.iter().any(|k| k == kind)
    }
}

// One unit of work: a shard and the kind it belongs to.
struct ShardTask<'a> {
    kind: &'a str,
    shard: &'a ShardRef,
}

/// Load the manifest, then run the full pipeline over it.
pub fn run_export<S: RecordSink>(
    manifest_path: impl AsRef<Path>,
    config: &PipelineConfig,
    sink: &mut S,
    cancel: &CancelToken,
) -> Result<ValidationReport, PipelineError> {
    let manifest = ExportManifest::load(manifest_path)?;

    run(&manifest, config, sink, cancel)
}

/// Run the decode → translate → validate pipeline over every shard the
/// manifest declares. A report is produced even when individual shards
/// fail; only fatal conditions return an error.
pub fn run<S: RecordSink>(
    manifest: &ExportManifest,
    config: &PipelineConfig,
    sink: &mut S,
    cancel: &CancelToken,
) -> Result<ValidationReport, PipelineError> {
    let translator = Translator::new(config.mappings.clone());
    let tasks: Vec<ShardTask<'_>> = manifest
        .kinds
        .iter()
        .flat_map(|kind| {
            kind.shards.iter().map(|shard| ShardTask {
                kind: &kind.name,
                shard,
            })
        })
        .collect();

    info!(
        export_id = %manifest.export_id,
        shards = tasks.len(),
        workers = config.effective_workers(),
        "starting export run"
    );

    let sink = Mutex::new(sink);
    let next = AtomicUsize::new(0);
    let results: Mutex<Vec<Option<ShardSummary>>> = Mutex::new(vec![None; tasks.len()]);
    let fatal: Mutex<Option<PipelineError>> = Mutex::new(None);

    thread::scope(|scope| {
        let worker_count = config.effective_workers().min(tasks.len().max(1));
        for _ in 0..worker_count {
            scope.spawn(|| {
                loop {
                    let index = next.fetch_add(1, Ordering::Relaxed);
                    let Some(task) = tasks.get(index) else {
                        return;
                    };

                    let outcome = if cancel.is_cancelled() {
                        Ok(cancelled_summary(task))
                    } else {
                        process_shard(task, &translator, config, &sink, cancel)
                    };

                    match outcome {
                        Ok(summary) => {
                            let mut slot =
                                results.lock().unwrap_or_else(PoisonError::into_inner);
                            slot[index] = Some(summary);
                        }
                        Err(error) => {
                            let mut slot =
                                fatal.lock().unwrap_or_else(PoisonError::into_inner);
                            slot.get_or_insert(error);
                            // Stop the other workers; the run is over.
                            cancel.cancel();
                        }
                    }
                }
            });
        }
    });

    if let Some(error) = fatal.into_inner().unwrap_or_else(PoisonError::into_inner) {
        return Err(error);
    }

    let mut validator = Validator::new(manifest);
    for summary in results
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner)
        .into_iter()
        .flatten()
    {
        validator.ingest(summary);
    }

    let report = validator.finish();
    info!(
        export_id = %manifest.export_id,
        clean = report.clean,
        anomalies = report.anomaly_count(),
        "export run finished"
    );

    Ok(report)
}

fn cancelled_summary(task: &ShardTask<'_>) -> ShardSummary {
    let label = task.shard.label();
    let mut summary = ShardSummary::new(task.kind, label.clone());
    summary.completed = false;
    summary.anomalies.push(Anomaly::new(
        AnomalyKind::Cancelled,
        label,
        0,
        "shard not processed: run cancelled",
    ));

    summary
}

fn process_shard<S: RecordSink>(
    task: &ShardTask<'_>,
    translator: &Translator,
    config: &PipelineConfig,
    sink: &Mutex<&mut S>,
    cancel: &CancelToken,
) -> Result<ShardSummary, PipelineError> {
    let label = task.shard.label();
    let mut summary = ShardSummary::new(task.kind, label.clone());
    debug!(shard = %label, kind = task.kind, "processing shard");

    let file = match File::open(&task.shard.path) {
        Ok(file) => file,
        Err(source) => return shard_io(summary, label, 0, source, config.fail_fast),
    };
    let mut reader = LogReader::new(BufReader::new(file));
    let mut offset = 0u64;

    loop {
        if cancel.is_cancelled() {
            summary.completed = false;
            summary.anomalies.push(Anomaly::new(
                AnomalyKind::Cancelled,
                label.clone(),
                offset,
                "shard processing cancelled",
            ));
            return Ok(summary);
        }

        let event = match reader.next_event() {
            Ok(Some(event)) => event,
            Ok(None) => return Ok(summary),
            Err(source) => return shard_io(summary, label, offset, source, config.fail_fast),
        };

        match event {
            LogEvent::Corruption { offset, error } => {
                warn!(shard = %label, offset, %error, "container corruption");
                if config.fail_fast {
                    return Err(PipelineError::Framing {
                        shard: label,
                        offset,
                        source: error,
                    });
                }
                summary.anomalies.push(Anomaly::new(
                    AnomalyKind::Framing,
                    label.clone(),
                    offset,
                    error.to_string(),
                ));
            }
            LogEvent::Record(record) => {
                offset = record.offset;
                let entity = match entity::decode(&record.payload) {
                    Ok(entity) => entity,
                    Err(error) => {
                        warn!(shard = %label, offset, %error, "undecodable record");
                        summary.anomalies.push(Anomaly::new(
                            AnomalyKind::Decode,
                            label.clone(),
                            offset,
                            error.to_string(),
                        ));
                        continue;
                    }
                };

                summary.decoded += 1;
                if summary.decoded % PROGRESS_EVERY == 0 {
                    info!(shard = %label, decoded = summary.decoded, "decode progress");
                }

                if entity.kind() != task.kind {
                    summary.anomalies.push(Anomaly::new(
                        AnomalyKind::SchemaViolation,
                        label.clone(),
                        offset,
                        format!(
                            "entity kind '{}' in a shard of kind '{}'",
                            entity.kind(),
                            task.kind
                        ),
                    ));
                }

                if !config.kind_selected(entity.kind()) {
                    continue;
                }

                let record = match translator.translate(&entity, &label, offset) {
                    Ok(record) => record,
                    Err(source) => {
                        if config.strict_mapping {
                            return Err(PipelineError::Mapping {
                                shard: label,
                                offset,
                                source,
                            });
                        }
                        summary.anomalies.push(Anomaly::new(
                            AnomalyKind::Mapping,
                            label.clone(),
                            offset,
                            source.to_string(),
                        ));
                        continue;
                    }
                };

                sink.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .accept(record)
                    .map_err(PipelineError::Sink)?;
                summary.translated += 1;
            }
        }
    }
}

// Shard-level io failure: abort this shard only, unless fail-fast.
fn shard_io(
    mut summary: ShardSummary,
    label: String,
    offset: u64,
    source: std::io::Error,
    fail_fast: bool,
) -> Result<ShardSummary, PipelineError> {
    warn!(shard = %label, offset, %source, "shard unreadable");
    if fail_fast {
        return Err(PipelineError::Shard {
            shard: label,
            source,
        });
    }

    summary.completed = false;
    summary.anomalies.push(Anomaly::new(
        AnomalyKind::ShardIo,
        label,
        offset,
        source.to_string(),
    ));

    Ok(summary)
}
