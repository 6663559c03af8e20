//! Decoded entity model: key paths and variant-typed properties.

mod decode;
mod wire;

#[cfg(test)]
pub(crate) mod encode;

pub use decode::{DecodeError, decode};
pub use wire::{WireReader, WireType};

use derive_more::Display;
use std::collections::BTreeMap;

///
/// ElementId
///
/// A path element is addressed by a numeric id or a name, never both.
///

#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum ElementId {
    #[display("{_0}")]
    Id(i64),
    #[display("\"{_0}\"")]
    Name(String),
}

///
/// PathElement
///
/// One ancestry step of an entity key.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PathElement {
    pub kind: String,
    pub id: ElementId,
}

impl PathElement {
    #[must_use]
    pub fn with_id(kind: impl Into<String>, id: i64) -> Self {
        Self {
            kind: kind.into(),
            id: ElementId::Id(id),
        }
    }

    #[must_use]
    pub fn with_name(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: ElementId::Name(name.into()),
        }
    }
}

impl std::fmt::Display for PathElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Flattened key-path text: elements joined by `/`.
#[must_use]
pub fn path_text(path: &[PathElement]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("/")
}

///
/// Value
///
/// Closed variant set of a single property value. Matching is exhaustive
/// in the decoder and the translation engine; nothing else inspects
/// variants at runtime.
///

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Integer(i64),
    Double(f64),
    Boolean(bool),
    Text(String),
    Blob(Vec<u8>),
    /// Microseconds since the Unix epoch.
    Timestamp(i64),
    Reference(Vec<PathElement>),
    Null,
}

impl Value {
    /// Stable human-readable variant label for diagnostics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Integer(_) => "Integer",
            Self::Double(_) => "Double",
            Self::Boolean(_) => "Boolean",
            Self::Text(_) => "Text",
            Self::Blob(_) => "Blob",
            Self::Timestamp(_) => "Timestamp",
            Self::Reference(_) => "Reference",
            Self::Null => "Null",
        }
    }
}

///
/// PropertyValue
///
/// One named property slot. `multi` holds iff more than one occurrence of
/// the name was encountered; order within `values` is first-seen order.
///

#[derive(Clone, Debug, PartialEq)]
pub struct PropertyValue {
    pub values: Vec<Value>,
    pub indexed: bool,
    pub multi: bool,
}

impl PropertyValue {
    #[must_use]
    pub fn single(value: Value, indexed: bool) -> Self {
        Self {
            values: vec![value],
            indexed,
            multi: false,
        }
    }

    #[must_use]
    pub fn repeated(values: Vec<Value>, indexed: bool) -> Self {
        let multi = values.len() > 1;

        Self {
            values,
            indexed,
            multi,
        }
    }

    // Merge a further occurrence of the same property name.
    pub(crate) fn push(&mut self, value: Value) {
        self.values.push(value);
        self.multi = true;
    }
}

///
/// Entity
///
/// Immutable decode product: non-empty key path plus property map. The
/// final path element is the entity's own identity.
///

#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    pub key_path: Vec<PathElement>,
    pub properties: BTreeMap<String, PropertyValue>,
}

impl Entity {
    /// Kind of the entity itself (last path element).
    #[must_use]
    pub fn kind(&self) -> &str {
        // key_path is non-empty by decode invariant
        self.key_path
            .last()
            .map_or("", |element| element.kind.as_str())
    }
}
