//! Entity payload decoder.
//!
//! A record payload is a tagged binary message: repeated path-element
//! messages followed by repeated property messages. The schema is
//! self-describing per record; unknown field numbers are skipped.

use super::{
    ElementId, Entity, PathElement, PropertyValue, Value,
    wire::{WireReader, WireType},
};
use std::collections::BTreeMap;
use thiserror::Error as ThisError;

// Entity message fields.
pub(super) const ENTITY_PATH_ELEMENT: u32 = 1;
pub(super) const ENTITY_PROPERTY: u32 = 2;

// Path-element message fields.
pub(super) const PATH_KIND: u32 = 1;
pub(super) const PATH_ID: u32 = 2;
pub(super) const PATH_NAME: u32 = 3;

// Property message fields.
pub(super) const PROP_NAME: u32 = 1;
pub(super) const PROP_INDEXED: u32 = 2;
pub(super) const PROP_VALUE: u32 = 3;

// Value message fields (variant; empty message decodes to Null).
pub(super) const VALUE_INTEGER: u32 = 1;
pub(super) const VALUE_DOUBLE: u32 = 2;
pub(super) const VALUE_BOOLEAN: u32 = 3;
pub(super) const VALUE_TEXT: u32 = 4;
pub(super) const VALUE_BLOB: u32 = 5;
pub(super) const VALUE_TIMESTAMP: u32 = 6;
pub(super) const VALUE_REFERENCE: u32 = 7;

///
/// DecodeError
///
/// Malformed entity payload. Recoverable at record granularity: the
/// caller records an anomaly and moves to the next logical record.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum DecodeError {
    #[error("payload truncated at byte {at}")]
    Truncated { at: usize },

    #[error("varint exceeds ten bytes at byte {at}")]
    VarintOverflow { at: usize },

    #[error("invalid wire type {wire_type} at byte {at}")]
    InvalidWireType { at: usize, wire_type: u8 },

    #[error("field number overflow at byte {at}")]
    FieldNumberOverflow { at: usize },

    #[error("length prefix overflow at byte {at}")]
    LengthOverflow { at: usize },

    #[error("field {field} has wire type {actual:?} (expected {expected:?})")]
    UnexpectedWireType {
        field: u32,
        expected: WireType,
        actual: WireType,
    },

    #[error("text field is not valid utf-8")]
    InvalidUtf8,

    #[error("entity has an empty key path")]
    EmptyKeyPath,

    #[error("path element missing kind")]
    PathElementMissingKind,

    #[error("path element must set exactly one of id/name")]
    PathElementIdentity,

    #[error("property missing name")]
    PropertyMissingName,
}

/// Decode one logical-record payload into an [`Entity`].
pub fn decode(payload: &[u8]) -> Result<Entity, DecodeError> {
    let mut reader = WireReader::new(payload);
    let mut key_path = Vec::new();
    let mut properties: BTreeMap<String, PropertyValue> = BTreeMap::new();

    while !reader.is_empty() {
        let (field, wire_type) = reader.read_tag()?;
        match field {
            ENTITY_PATH_ELEMENT => {
                let message = expect_len(&mut reader, field, wire_type)?;
                key_path.push(decode_path_element(message)?);
            }
            ENTITY_PROPERTY => {
                let message = expect_len(&mut reader, field, wire_type)?;
                let (name, value, indexed) = decode_property(message)?;
                match properties.entry(name) {
                    std::collections::btree_map::Entry::Vacant(slot) => {
                        slot.insert(PropertyValue::single(value, indexed));
                    }
                    std::collections::btree_map::Entry::Occupied(mut slot) => {
                        // First occurrence wins the indexed flag.
                        slot.get_mut().push(value);
                    }
                }
            }
            _ => reader.skip(wire_type)?,
        }
    }

    if key_path.is_empty() {
        return Err(DecodeError::EmptyKeyPath);
    }

    Ok(Entity {
        key_path,
        properties,
    })
}

fn decode_path_element(message: &[u8]) -> Result<PathElement, DecodeError> {
    let mut reader = WireReader::new(message);
    let mut kind: Option<String> = None;
    let mut id: Option<i64> = None;
    let mut name: Option<String> = None;

    while !reader.is_empty() {
        let (field, wire_type) = reader.read_tag()?;
        match field {
            PATH_KIND => kind = Some(read_text(&mut reader, field, wire_type)?),
            PATH_ID => {
                let raw = expect_varint(&mut reader, field, wire_type)?;
                id = Some(raw.cast_signed());
            }
            PATH_NAME => name = Some(read_text(&mut reader, field, wire_type)?),
            _ => reader.skip(wire_type)?,
        }
    }

    let kind = kind.ok_or(DecodeError::PathElementMissingKind)?;
    let id = match (id, name) {
        (Some(id), None) => ElementId::Id(id),
        (None, Some(name)) => ElementId::Name(name),
        _ => return Err(DecodeError::PathElementIdentity),
    };

    Ok(PathElement { kind, id })
}

fn decode_property(message: &[u8]) -> Result<(String, Value, bool), DecodeError> {
    let mut reader = WireReader::new(message);
    let mut name: Option<String> = None;
    let mut indexed = true;
    let mut value = Value::Null;

    while !reader.is_empty() {
        let (field, wire_type) = reader.read_tag()?;
        match field {
            PROP_NAME => name = Some(read_text(&mut reader, field, wire_type)?),
            PROP_INDEXED => {
                indexed = expect_varint(&mut reader, field, wire_type)? != 0;
            }
            PROP_VALUE => {
                let message = expect_len(&mut reader, field, wire_type)?;
                value = decode_value(message)?;
            }
            _ => reader.skip(wire_type)?,
        }
    }

    let name = name.ok_or(DecodeError::PropertyMissingName)?;

    Ok((name, value, indexed))
}

// Variant fields: last one seen wins; an empty message is Null.
fn decode_value(message: &[u8]) -> Result<Value, DecodeError> {
    let mut reader = WireReader::new(message);
    let mut value = Value::Null;

    while !reader.is_empty() {
        let (field, wire_type) = reader.read_tag()?;
        match field {
            VALUE_INTEGER => {
                value = Value::Integer(expect_varint(&mut reader, field, wire_type)?.cast_signed());
            }
            VALUE_DOUBLE => {
                expect_wire(field, WireType::Fixed64, wire_type)?;
                value = Value::Double(f64::from_bits(reader.read_fixed64()?));
            }
            VALUE_BOOLEAN => {
                value = Value::Boolean(expect_varint(&mut reader, field, wire_type)? != 0);
            }
            VALUE_TEXT => value = Value::Text(read_text(&mut reader, field, wire_type)?),
            VALUE_BLOB => {
                value = Value::Blob(expect_len(&mut reader, field, wire_type)?.to_vec());
            }
            VALUE_TIMESTAMP => {
                value =
                    Value::Timestamp(expect_varint(&mut reader, field, wire_type)?.cast_signed());
            }
            VALUE_REFERENCE => {
                let message = expect_len(&mut reader, field, wire_type)?;
                value = Value::Reference(decode_reference(message)?);
            }
            _ => reader.skip(wire_type)?,
        }
    }

    Ok(value)
}

fn decode_reference(message: &[u8]) -> Result<Vec<PathElement>, DecodeError> {
    let mut reader = WireReader::new(message);
    let mut path = Vec::new();

    while !reader.is_empty() {
        let (field, wire_type) = reader.read_tag()?;
        if field == ENTITY_PATH_ELEMENT {
            let element = expect_len(&mut reader, field, wire_type)?;
            path.push(decode_path_element(element)?);
        } else {
            reader.skip(wire_type)?;
        }
    }

    if path.is_empty() {
        return Err(DecodeError::EmptyKeyPath);
    }

    Ok(path)
}

const fn expect_wire(field: u32, expected: WireType, actual: WireType) -> Result<(), DecodeError> {
    if actual as u8 == expected as u8 {
        Ok(())
    } else {
        Err(DecodeError::UnexpectedWireType {
            field,
            expected,
            actual,
        })
    }
}

fn expect_varint(
    reader: &mut WireReader<'_>,
    field: u32,
    wire_type: WireType,
) -> Result<u64, DecodeError> {
    expect_wire(field, WireType::Varint, wire_type)?;
    reader.read_varint()
}

fn expect_len<'a>(
    reader: &mut WireReader<'a>,
    field: u32,
    wire_type: WireType,
) -> Result<&'a [u8], DecodeError> {
    expect_wire(field, WireType::LenDelimited, wire_type)?;
    reader.read_len_prefixed()
}

fn read_text(
    reader: &mut WireReader<'_>,
    field: u32,
    wire_type: WireType,
) -> Result<String, DecodeError> {
    let bytes = expect_len(reader, field, wire_type)?;

    String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
}
