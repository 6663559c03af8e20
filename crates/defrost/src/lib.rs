//! defrost — decode, translate, and validate managed-datastore bulk
//! exports outside the platform that produced them.
//!
//! ## Crate layout
//! - `core`: manifest loader, log-container reader, entity decoder,
//!   translation engine, validator, and pipeline orchestration.
//!
//! The `prelude` mirrors the surface a typical embedding uses: load a
//! manifest, configure a run, feed a sink, inspect the report.

pub use defrost_core as core;

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use defrost_core::{
    entity::{ElementId, Entity, PathElement, PropertyValue, Value},
    error::{Anomaly, AnomalyKind},
    manifest::{ExportManifest, ManifestError},
    pipeline::{CancelToken, PipelineConfig, PipelineError, run, run_export},
    sink::{JsonLinesSink, MemorySink, RecordSink},
    translate::{CoercionRule, FieldMapping, KindMapping, MappingTable, TranslatedRecord},
    validate::ValidationReport,
};

///
/// Prelude
///
/// using _ brings traits into scope and avoids name conflicts
///

pub mod prelude {
    pub use crate::core::{
        entity::{Entity, PathElement, PropertyValue, Value},
        manifest::ExportManifest,
        pipeline::{CancelToken, PipelineConfig, run, run_export},
        sink::RecordSink as _,
        translate::{CoercionRule, FieldMapping, KindMapping, MappingTable},
        validate::ValidationReport,
    };
}
