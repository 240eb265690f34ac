//! Reverse conversion: Mapping → DynamicMessage.
//!
//! Each key is matched to a field by name and converted according to the
//! field's kind. Extension entries are matched by number through the
//! [`Registry`]. Keys absent from the mapping leave their field at the schema
//! default.
//!
//! Conversion stops at the first error. When the target is an existing
//! message, fields assigned before the error stay assigned.

use crate::config::ReverseOptions;
use crate::error::{MappingError, Result};
use crate::mapping::{non_finite_from_text, MapValue, Mapping, CLASS_NAME_KEY, EXTENSIONS_KEY};
use crate::registry::Registry;
use base64::Engine;
use prost_reflect::{
    DynamicMessage, EnumDescriptor, Kind, MapKey, MessageDescriptor, ReflectMessage, Value,
};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Build a new message of type `descriptor` from `mapping`.
pub fn mapping_to_message(
    descriptor: &MessageDescriptor,
    mapping: &Mapping,
    registry: &Registry,
    options: &ReverseOptions,
) -> Result<DynamicMessage> {
    let mut message = DynamicMessage::new(descriptor.clone());
    let ctx = Context { registry, options };
    apply_mapping(&mut message, mapping, &ctx, "")?;
    Ok(message)
}

/// Apply `mapping` to an existing message and return that same message.
///
/// Singular nested messages already present are patched rather than replaced;
/// repeated and map fields named in the mapping replace the existing contents.
pub fn update_message<'m>(
    message: &'m mut DynamicMessage,
    mapping: &Mapping,
    registry: &Registry,
    options: &ReverseOptions,
) -> Result<&'m mut DynamicMessage> {
    let ctx = Context { registry, options };
    apply_mapping(message, mapping, &ctx, "")?;
    Ok(message)
}

/// Build a message whose type is named by the mapping's class-name marker.
pub fn mapping_to_message_by_class(
    mapping: &Mapping,
    registry: &Registry,
    options: &ReverseOptions,
) -> Result<DynamicMessage> {
    let name = mapping
        .class_name
        .as_deref()
        .ok_or(MappingError::MissingClassName)?;
    let descriptor = registry.message(name)?;
    debug!("Resolved class name '{}' to {}", name, descriptor.full_name());
    mapping_to_message(&descriptor, mapping, registry, options)
}

struct Context<'a> {
    registry: &'a Registry,
    options: &'a ReverseOptions,
}

fn apply_mapping(
    message: &mut DynamicMessage,
    mapping: &Mapping,
    ctx: &Context<'_>,
    path: &str,
) -> Result<()> {
    let descriptor = message.descriptor();

    // The declared type always wins over the marker.
    if let Some(name) = &mapping.class_name {
        if name != descriptor.name() && name != descriptor.full_name() {
            debug!(
                "Ignoring class name '{}' at '{}': field declares {}",
                name,
                path,
                descriptor.full_name()
            );
        }
    }

    for (key, value) in &mapping.fields {
        let field_path = join_path(path, key);
        let Some(field) = descriptor.get_field_by_name(key) else {
            if ctx.options.strict {
                return Err(MappingError::UnknownField {
                    message: descriptor.full_name().to_owned(),
                    field: field_path,
                });
            }
            debug!("Skipping unknown field '{}' for {}", field_path, descriptor.full_name());
            continue;
        };

        trace!("Assigning field {}", field_path);
        let kind = field.kind();
        let converted = if field.is_map() {
            map_value_to_proto_map(value, &kind, ctx, &field_path)?
        } else if field.is_list() {
            map_value_to_proto_list(value, &kind, ctx, &field_path)?
        } else {
            let existing = if message.has_field(&field) {
                message.get_field(&field).as_message().cloned()
            } else {
                None
            };
            map_value_to_proto(value, &kind, existing, ctx, &field_path)?
        };

        message
            .try_set_field(&field, converted)
            .map_err(|e| MappingError::InvalidValue {
                path: field_path,
                message: e.to_string(),
            })?;
    }

    for (number, value) in &mapping.extensions {
        let ext_path = join_path(path, &format!("{EXTENSIONS_KEY}.{number}"));
        let Some(extension) = ctx.registry.extension(&descriptor, *number) else {
            if ctx.options.strict {
                return Err(MappingError::UnknownExtension {
                    message: descriptor.full_name().to_owned(),
                    number: *number,
                });
            }
            debug!("Skipping unknown extension '{}' for {}", ext_path, descriptor.full_name());
            continue;
        };

        trace!("Assigning extension {} at {}", extension.full_name(), ext_path);
        let kind = extension.kind();
        let converted = if extension.is_list() {
            map_value_to_proto_list(value, &kind, ctx, &ext_path)?
        } else {
            let existing = if message.has_extension(extension) {
                message.get_extension(extension).as_message().cloned()
            } else {
                None
            };
            map_value_to_proto(value, &kind, existing, ctx, &ext_path)?
        };
        message.set_extension(extension, converted);
    }

    Ok(())
}

/// Convert a singular value. `existing` is the nested message to patch, if any.
fn map_value_to_proto(
    value: &MapValue,
    kind: &Kind,
    existing: Option<DynamicMessage>,
    ctx: &Context<'_>,
    path: &str,
) -> Result<Value> {
    match kind {
        Kind::Double => expect_float(value, path).map(Value::F64),
        Kind::Float => {
            let wide = expect_float(value, path)?;
            let narrow = wide as f32;
            if wide.is_finite() && !narrow.is_finite() {
                return Err(MappingError::OutOfRange {
                    path: path.to_owned(),
                    kind: "float",
                    value: describe(value),
                });
            }
            Ok(Value::F32(narrow))
        }
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => {
            expect_int(value, "int32", path).map(Value::I32)
        }
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => {
            expect_int(value, "int64", path).map(Value::I64)
        }
        Kind::Uint32 | Kind::Fixed32 => expect_int(value, "uint32", path).map(Value::U32),
        Kind::Uint64 | Kind::Fixed64 => expect_int(value, "uint64", path).map(Value::U64),
        Kind::Bool => value
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| mismatch(path, "bool", value)),
        Kind::String => value
            .as_str()
            .map(|s| Value::String(s.to_owned()))
            .ok_or_else(|| mismatch(path, "string", value)),
        Kind::Bytes => {
            let text = value
                .as_str()
                .ok_or_else(|| mismatch(path, "base64 string", value))?;
            base64::engine::general_purpose::STANDARD
                .decode(text)
                .map(|bytes| Value::Bytes(bytes.into()))
                .map_err(|e| MappingError::InvalidBase64 {
                    path: path.to_owned(),
                    message: e.to_string(),
                })
        }
        Kind::Enum(enum_desc) => enum_number(value, enum_desc, path).map(Value::EnumNumber),
        Kind::Message(message_desc) => {
            let nested = value
                .as_mapping()
                .ok_or_else(|| mismatch(path, "mapping", value))?;
            let mut target = existing.unwrap_or_else(|| DynamicMessage::new(message_desc.clone()));
            apply_mapping(&mut target, nested, ctx, path)?;
            Ok(Value::Message(target))
        }
    }
}

fn map_value_to_proto_list(
    value: &MapValue,
    kind: &Kind,
    ctx: &Context<'_>,
    path: &str,
) -> Result<Value> {
    let items = value
        .as_list()
        .ok_or_else(|| mismatch(path, "sequence", value))?;
    items
        .iter()
        .enumerate()
        .map(|(i, item)| map_value_to_proto(item, kind, None, ctx, &format!("{path}[{i}]")))
        .collect::<Result<Vec<_>>>()
        .map(Value::List)
}

/// Convert a mapping with stringified keys into a protobuf map. `kind` is the
/// map field's synthetic entry message.
fn map_value_to_proto_map(
    value: &MapValue,
    kind: &Kind,
    ctx: &Context<'_>,
    path: &str,
) -> Result<Value> {
    let entries = value
        .as_mapping()
        .ok_or_else(|| mismatch(path, "mapping", value))?;
    let Kind::Message(entry) = kind else {
        return Err(mismatch(path, &kind_name(kind), value));
    };
    let key_kind = entry.map_entry_key_field().kind();
    let value_kind = entry.map_entry_value_field().kind();

    let mut map = HashMap::with_capacity(entries.len());
    let mut insert = |key: &str, item: &MapValue| -> Result<()> {
        let entry_path = join_path(path, key);
        let parsed = parse_map_key(key, &key_kind, &entry_path)?;
        let converted = map_value_to_proto(item, &value_kind, None, ctx, &entry_path)?;
        map.insert(parsed, converted);
        Ok(())
    };
    for (key, item) in &entries.fields {
        insert(key, item)?;
    }
    // Map entries carry no class marker; a parsed one is a "class_name" entry.
    if let Some(name) = &entries.class_name {
        insert(CLASS_NAME_KEY, &MapValue::Text(name.clone()))?;
    }
    Ok(Value::Map(map))
}

fn parse_map_key(key: &str, kind: &Kind, path: &str) -> Result<MapKey> {
    let parsed = match kind {
        Kind::Bool => key.parse().ok().map(MapKey::Bool),
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => key.parse().ok().map(MapKey::I32),
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => key.parse().ok().map(MapKey::I64),
        Kind::Uint32 | Kind::Fixed32 => key.parse().ok().map(MapKey::U32),
        Kind::Uint64 | Kind::Fixed64 => key.parse().ok().map(MapKey::U64),
        Kind::String => Some(MapKey::String(key.to_owned())),
        _ => None,
    };
    parsed.ok_or_else(|| MappingError::TypeMismatch {
        path: path.to_owned(),
        expected: format!("{} map key", kind_name(kind)),
        found: format!("'{key}'"),
    })
}

/// Resolve an enum label or ordinal. Labels are matched exactly.
fn enum_number(value: &MapValue, enum_desc: &EnumDescriptor, path: &str) -> Result<i32> {
    let found = match value {
        MapValue::Text(label) => enum_desc.get_value_by_name(label),
        MapValue::Int(_) | MapValue::UInt(_) => expect_int::<i32>(value, "enum", path)
            .ok()
            .and_then(|number| enum_desc.get_value(number)),
        other => return Err(mismatch(path, "enum label or number", other)),
    };
    found
        .map(|v| v.number())
        .ok_or_else(|| MappingError::InvalidEnum {
            path: path.to_owned(),
            enum_name: enum_desc.full_name().to_owned(),
            value: describe(value),
        })
}

/// Numbers, or one of the non-finite spellings `"NaN"`, `"Infinity"`, `"-Infinity"`.
fn expect_float(value: &MapValue, path: &str) -> Result<f64> {
    let number = match value {
        MapValue::Text(text) => non_finite_from_text(text),
        other => other.as_f64(),
    };
    number.ok_or_else(|| mismatch(path, "number", value))
}

fn expect_int<T>(value: &MapValue, kind: &'static str, path: &str) -> Result<T>
where
    T: TryFrom<i64> + TryFrom<u64>,
{
    let converted = match value {
        MapValue::Int(i) => <T as TryFrom<i64>>::try_from(*i).ok(),
        MapValue::UInt(u) => <T as TryFrom<u64>>::try_from(*u).ok(),
        other => return Err(mismatch(path, kind, other)),
    };
    converted.ok_or_else(|| MappingError::OutOfRange {
        path: path.to_owned(),
        kind,
        value: describe(value),
    })
}

fn mismatch(path: &str, expected: &str, found: &MapValue) -> MappingError {
    MappingError::TypeMismatch {
        path: path.to_owned(),
        expected: expected.to_owned(),
        found: found.kind_name().to_owned(),
    }
}

fn describe(value: &MapValue) -> String {
    match value {
        MapValue::Bool(b) => b.to_string(),
        MapValue::Int(i) => i.to_string(),
        MapValue::UInt(u) => u.to_string(),
        MapValue::Float(f) => f.to_string(),
        MapValue::Text(s) => format!("'{s}'"),
        other => other.kind_name().to_owned(),
    }
}

fn kind_name(kind: &Kind) -> String {
    match kind {
        Kind::Double => "double".to_string(),
        Kind::Float => "float".to_string(),
        Kind::Int32 => "int32".to_string(),
        Kind::Int64 => "int64".to_string(),
        Kind::Uint32 => "uint32".to_string(),
        Kind::Uint64 => "uint64".to_string(),
        Kind::Sint32 => "sint32".to_string(),
        Kind::Sint64 => "sint64".to_string(),
        Kind::Fixed32 => "fixed32".to_string(),
        Kind::Fixed64 => "fixed64".to_string(),
        Kind::Sfixed32 => "sfixed32".to_string(),
        Kind::Sfixed64 => "sfixed64".to_string(),
        Kind::Bool => "bool".to_string(),
        Kind::String => "string".to_string(),
        Kind::Bytes => "bytes".to_string(),
        Kind::Message(m) => format!("message:{}", m.full_name()),
        Kind::Enum(e) => format!("enum:{}", e.full_name()),
    }
}

fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_owned()
    } else {
        format!("{parent}.{key}")
    }
}
