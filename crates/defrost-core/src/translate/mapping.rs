//! Per-kind mapping tables and coercion rules.

use crate::entity::{Value, path_text};
use base64::{Engine, engine::general_purpose::URL_SAFE};
use serde_json::Value as Json;
use std::collections::BTreeMap;
use thiserror::Error as ThisError;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

///
/// MappingError
///
/// Translation failure for one record. Recoverable by default (record
/// dropped, anomaly recorded); strict configuration escalates it.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum MappingError {
    #[error("kind '{kind}': required target field '{target}' has no source property or default")]
    MissingRequired { kind: String, target: String },

    #[error("coercion {rule} does not apply to {value} values")]
    UnsupportedCoercion {
        rule: CoercionRule,
        value: &'static str,
    },

    #[error("double value is not representable in the target document")]
    NonFiniteDouble,

    #[error("timestamp {micros} is outside the representable calendar range")]
    TimestampOutOfRange { micros: i64 },
}

///
/// CoercionRule
///
/// Closed rule set, total over the value variant set: every (rule,
/// variant) pair either produces a target value or an explicit
/// `UnsupportedCoercion`. Null passes through every rule.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq, derive_more::Display)]
pub enum CoercionRule {
    /// Natural representation per variant; blobs become base64url text.
    Identity,
    /// Integer rendered as decimal text.
    IntegerToText,
    /// Timestamp micros rendered as an RFC 3339 string.
    TimestampToRfc3339,
    /// Reference rendered as the flattened key-path string.
    ReferenceToPathText,
    /// Blob rendered as base64url text (explicit form of the identity).
    BytesToBase64Text,
    /// Double rendered as its IEEE-754 bit pattern (signed 64-bit).
    DoubleToBits,
}

impl CoercionRule {
    /// Apply this rule to a single decoded value.
    pub fn apply(self, value: &Value) -> Result<Json, MappingError> {
        if matches!(value, Value::Null) {
            return Ok(Json::Null);
        }

        match (self, value) {
            (Self::Identity, _) => identity(value),
            (Self::IntegerToText, Value::Integer(v)) => Ok(Json::String(v.to_string())),
            (Self::TimestampToRfc3339, Value::Timestamp(micros)) => rfc3339(*micros),
            (Self::ReferenceToPathText, Value::Reference(path)) => {
                Ok(Json::String(path_text(path)))
            }
            (Self::BytesToBase64Text, Value::Blob(bytes)) => {
                Ok(Json::String(URL_SAFE.encode(bytes)))
            }
            (Self::DoubleToBits, Value::Double(v)) => {
                Ok(Json::Number(v.to_bits().cast_signed().into()))
            }
            _ => Err(MappingError::UnsupportedCoercion {
                rule: self,
                value: value.label(),
            }),
        }
    }
}

fn identity(value: &Value) -> Result<Json, MappingError> {
    match value {
        Value::Integer(v) => Ok(Json::Number((*v).into())),
        Value::Double(v) => serde_json::Number::from_f64(*v)
            .map(Json::Number)
            .ok_or(MappingError::NonFiniteDouble),
        Value::Boolean(v) => Ok(Json::Bool(*v)),
        Value::Text(v) => Ok(Json::String(v.clone())),
        Value::Blob(bytes) => Ok(Json::String(URL_SAFE.encode(bytes))),
        Value::Timestamp(micros) => Ok(Json::Number((*micros).into())),
        Value::Reference(path) => Ok(serde_json::json!({
            "path": path_text(path),
        })),
        Value::Null => Ok(Json::Null),
    }
}

fn rfc3339(micros: i64) -> Result<Json, MappingError> {
    let nanos = i128::from(micros) * 1_000;
    let datetime = OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .map_err(|_| MappingError::TimestampOutOfRange { micros })?;
    let text = datetime
        .format(&Rfc3339)
        .map_err(|_| MappingError::TimestampOutOfRange { micros })?;

    Ok(Json::String(text))
}

///
/// FieldMapping
///
/// One source-property rule: where the value lands in the target
/// document, how it is coerced, and what happens when the source
/// property is absent.
///

#[derive(Clone, Debug)]
pub struct FieldMapping {
    pub target: String,
    pub rule: CoercionRule,
    pub default: Option<Json>,
    pub required: bool,
}

impl FieldMapping {
    #[must_use]
    pub fn renamed(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            rule: CoercionRule::Identity,
            default: None,
            required: false,
        }
    }

    #[must_use]
    pub fn with_rule(mut self, rule: CoercionRule) -> Self {
        self.rule = rule;
        self
    }

    #[must_use]
    pub fn with_default(mut self, default: Json) -> Self {
        self.default = Some(default);
        self
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

///
/// KindMapping
///
/// Mapping table for one kind, keyed by source property name. `strict`
/// drops unmapped source properties instead of passing them through.
///

#[derive(Clone, Debug, Default)]
pub struct KindMapping {
    pub strict: bool,
    pub fields: BTreeMap<String, FieldMapping>,
}

impl KindMapping {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    #[must_use]
    pub fn field(mut self, source: impl Into<String>, mapping: FieldMapping) -> Self {
        self.fields.insert(source.into(), mapping);
        self
    }
}

///
/// MappingTable
///
/// All configured kind mappings. Kinds without an entry translate with
/// pass-through semantics.
///

#[derive(Clone, Debug, Default)]
pub struct MappingTable {
    kinds: BTreeMap<String, KindMapping>,
}

impl MappingTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn kind(mut self, name: impl Into<String>, mapping: KindMapping) -> Self {
        self.kinds.insert(name.into(), mapping);
        self
    }

    #[must_use]
    pub fn get(&self, kind: &str) -> Option<&KindMapping> {
        self.kinds.get(kind)
    }
}
