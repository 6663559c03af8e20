//! Synthetic entity encoder, the exact inverse of [`super::decode`].
//! Test-only: production never writes the export payload format.

use super::{
    ElementId, Entity, PathElement, PropertyValue, Value,
    decode::{
        ENTITY_PATH_ELEMENT, ENTITY_PROPERTY, PATH_ID, PATH_KIND, PATH_NAME, PROP_INDEXED,
        PROP_NAME, PROP_VALUE, VALUE_BLOB, VALUE_BOOLEAN, VALUE_DOUBLE, VALUE_INTEGER,
        VALUE_REFERENCE, VALUE_TEXT, VALUE_TIMESTAMP,
    },
    wire::WireType,
};

pub(crate) fn encode(entity: &Entity) -> Vec<u8> {
    let mut out = Vec::new();
    for element in &entity.key_path {
        write_message(&mut out, ENTITY_PATH_ELEMENT, encode_path_element(element));
    }
    for (name, property) in &entity.properties {
        for value in &property.values {
            write_message(&mut out, ENTITY_PROPERTY, encode_property(name, property, value));
        }
    }

    out
}

fn encode_path_element(element: &PathElement) -> Vec<u8> {
    let mut out = Vec::new();
    write_text(&mut out, PATH_KIND, &element.kind);
    match &element.id {
        ElementId::Id(id) => write_varint_field(&mut out, PATH_ID, id.cast_unsigned()),
        ElementId::Name(name) => write_text(&mut out, PATH_NAME, name),
    }

    out
}

fn encode_property(name: &str, property: &PropertyValue, value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_text(&mut out, PROP_NAME, name);
    if !property.indexed {
        write_varint_field(&mut out, PROP_INDEXED, 0);
    }
    write_message(&mut out, PROP_VALUE, encode_value(value));

    out
}

fn encode_value(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    match value {
        Value::Integer(v) => write_varint_field(&mut out, VALUE_INTEGER, v.cast_unsigned()),
        Value::Double(v) => {
            write_tag(&mut out, VALUE_DOUBLE, WireType::Fixed64);
            out.extend_from_slice(&v.to_bits().to_le_bytes());
        }
        Value::Boolean(v) => write_varint_field(&mut out, VALUE_BOOLEAN, u64::from(*v)),
        Value::Text(v) => write_text(&mut out, VALUE_TEXT, v),
        Value::Blob(v) => write_bytes(&mut out, VALUE_BLOB, v),
        Value::Timestamp(v) => write_varint_field(&mut out, VALUE_TIMESTAMP, v.cast_unsigned()),
        Value::Reference(path) => {
            let mut message = Vec::new();
            for element in path {
                write_message(&mut message, ENTITY_PATH_ELEMENT, encode_path_element(element));
            }
            write_bytes(&mut out, VALUE_REFERENCE, &message);
        }
        Value::Null => {}
    }

    out
}

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = u8::try_from(value & 0x7f).unwrap();
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

fn write_tag(out: &mut Vec<u8>, field: u32, wire_type: WireType) {
    write_varint(out, (u64::from(field) << 3) | u64::from(wire_type as u8));
}

fn write_varint_field(out: &mut Vec<u8>, field: u32, value: u64) {
    write_tag(out, field, WireType::Varint);
    write_varint(out, value);
}

fn write_bytes(out: &mut Vec<u8>, field: u32, bytes: &[u8]) {
    write_tag(out, field, WireType::LenDelimited);
    write_varint(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

fn write_text(out: &mut Vec<u8>, field: u32, text: &str) {
    write_bytes(out, field, text.as_bytes());
}

fn write_message(out: &mut Vec<u8>, field: u32, message: Vec<u8>) {
    write_bytes(out, field, &message);
}
