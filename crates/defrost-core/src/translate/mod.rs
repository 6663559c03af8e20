//! Translation engine: decoded entity → target document.
//!
//! The target shape mirrors the export's JSON convention: a `key` object
//! (flattened path text plus kind and id/name, parents nested) and a
//! `properties` object holding the mapped fields. Repeated properties
//! become arrays in encounter order.

mod mapping;


pub use mapping::{CoercionRule, FieldMapping, KindMapping, MappingError, MappingTable};

use crate::entity::{ElementId, Entity, PathElement, PropertyValue, path_text};
use serde::Serialize;
use serde_json::{Map, Value as Json};

///
/// TranslatedRecord
///
/// Target-representation object plus shard/offset provenance. Immutable;
/// translation never mutates the source entity.
///

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TranslatedRecord {
    pub kind: String,
    pub shard: String,
    pub offset: u64,
    pub document: Json,
}

///
/// Translator
///
/// Stateless per-run engine. The mapping for a kind is resolved once per
/// entity, not per property.
///

#[derive(Clone, Debug, Default)]
pub struct Translator {
    table: MappingTable,
}

impl Translator {
    #[must_use]
    pub const fn new(table: MappingTable) -> Self {
        Self { table }
    }

    /// Translate one decoded entity, attaching provenance.
    pub fn translate(
        &self,
        entity: &Entity,
        shard: &str,
        offset: u64,
    ) -> Result<TranslatedRecord, MappingError> {
        let kind = entity.kind().to_string();
        let mapping = self.table.get(&kind);

        let mut fields = Map::new();
        for (name, property) in &entity.properties {
            match mapping.and_then(|m| m.fields.get(name)) {
                Some(field) => {
                    fields.insert(field.target.clone(), coerce(field.rule, property)?);
                }
                None => {
                    if !mapping.is_some_and(|m| m.strict) {
                        fields.insert(name.clone(), coerce(CoercionRule::Identity, property)?);
                    }
                }
            }
        }

        // Absent source properties: defaults first, then required checks.
        if let Some(mapping) = mapping {
            for (source, field) in &mapping.fields {
                if entity.properties.contains_key(source) {
                    continue;
                }
                if let Some(default) = &field.default {
                    fields.insert(field.target.clone(), default.clone());
                } else if field.required {
                    return Err(MappingError::MissingRequired {
                        kind,
                        target: field.target.clone(),
                    });
                }
            }
        }

        let mut document = Map::new();
        document.insert("key".to_string(), key_json(&entity.key_path));
        document.insert("properties".to_string(), Json::Object(fields));

        Ok(TranslatedRecord {
            kind,
            shard: shard.to_string(),
            offset,
            document: Json::Object(document),
        })
    }
}

fn coerce(rule: CoercionRule, property: &PropertyValue) -> Result<Json, MappingError> {
    if property.multi {
        let values = property
            .values
            .iter()
            .map(|value| rule.apply(value))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Json::Array(values))
    } else {
        property
            .values
            .first()
            .map_or(Ok(Json::Null), |value| rule.apply(value))
    }
}

// Key object: flattened path string, own kind + id/name, parents nested.
fn key_json(path: &[PathElement]) -> Json {
    let mut key = Json::Null;
    for element in path {
        let mut object = Map::new();
        object.insert("kind".to_string(), Json::String(element.kind.clone()));
        match &element.id {
            ElementId::Id(id) => {
                object.insert("id".to_string(), Json::Number((*id).into()));
            }
            ElementId::Name(name) => {
                object.insert("name".to_string(), Json::String(name.clone()));
            }
        }
        if !key.is_null() {
            object.insert("parent".to_string(), key);
        }
        key = Json::Object(object);
    }

    if let Json::Object(object) = &mut key {
        object.insert("path".to_string(), Json::String(path_text(path)));
    }

    key
}
