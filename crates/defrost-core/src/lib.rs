//! Core runtime for defrost: manifest loading, log-container framing,
//! entity decoding, translation, validation, and the pipeline that wires
//! them together over a pool of shard workers.
#![warn(unreachable_pub)]

pub mod entity;
pub mod error;
pub mod log;
pub mod manifest;
pub mod pipeline;
pub mod sink;
pub mod translate;
pub mod validate;

// test
#[cfg(test)]
pub(crate) mod test_support;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No readers, writers, or low-level wire helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        entity::{ElementId, Entity, PathElement, PropertyValue, Value},
        error::{Anomaly, AnomalyKind},
        manifest::{ExportManifest, KindInfo, ShardRef},
        pipeline::{CancelToken, PipelineConfig, run},
        translate::{CoercionRule, TranslatedRecord},
        validate::ValidationReport,
    };
}
