//! Forward conversion: DynamicMessage → Mapping.
//!
//! Only fields the message reports as present are rendered, so a mapping never
//! carries a key for an unset field. Extensions present on the message go to
//! the mapping's extension block, keyed by extension number.

use crate::config::{FieldFilter, ForwardOptions};
use crate::mapping::{MapValue, Mapping};
use base64::Engine;
use prost_reflect::{DynamicMessage, Kind, MapKey, ReflectMessage, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::trace;

/// Convert a message into a mapping.
///
/// The source message is only read. The field filter in `options` applies to
/// the top-level fields; nested messages are always converted whole.
pub fn message_to_mapping(message: &DynamicMessage, options: &ForwardOptions) -> Mapping {
    convert_message(message, options, &options.field_filter)
}

fn convert_message(
    message: &DynamicMessage,
    options: &ForwardOptions,
    filter: &FieldFilter,
) -> Mapping {
    let descriptor = message.descriptor();
    let mut mapping = Mapping::new();

    for field in descriptor.fields() {
        if !message.has_field(&field) || !filter.admits(field.name()) {
            continue;
        }
        trace!("Converting field {}.{}", descriptor.full_name(), field.name());
        let value = message.get_field(&field);
        mapping.fields.insert(
            field.name().to_owned(),
            proto_to_map_value(&value, &field.kind(), options),
        );
    }

    for extension in descriptor.extensions() {
        if !message.has_extension(&extension) {
            continue;
        }
        trace!(
            "Converting extension {} ({})",
            extension.full_name(),
            extension.number()
        );
        let value = message.get_extension(&extension);
        mapping.extensions.insert(
            extension.number(),
            proto_to_map_value(&value, &extension.kind(), options),
        );
    }

    if options.add_class_metadata {
        mapping.class_name = Some(descriptor.name().to_owned());
    }

    mapping
}

/// Convert a field value. For lists `kind` is the element kind, for maps it is
/// the synthetic entry message.
fn proto_to_map_value(value: &Value, kind: &Kind, options: &ForwardOptions) -> MapValue {
    match value {
        Value::Bool(b) => MapValue::Bool(*b),
        Value::I32(i) => MapValue::Int((*i).into()),
        Value::I64(i) => MapValue::Int(*i),
        Value::U32(u) => MapValue::UInt((*u).into()),
        Value::U64(u) => MapValue::UInt(*u),
        Value::F32(f) => MapValue::Float((*f).into()),
        Value::F64(f) => MapValue::Float(*f),
        Value::String(s) => MapValue::Text(s.clone()),
        Value::Bytes(b) => MapValue::Text(base64::engine::general_purpose::STANDARD.encode(b)),
        Value::EnumNumber(number) => enum_to_map_value(*number, kind, options),
        Value::Message(m) => MapValue::Map(convert_message(m, options, &FieldFilter::All)),
        Value::List(items) => MapValue::List(
            items
                .iter()
                .map(|item| proto_to_map_value(item, kind, options))
                .collect(),
        ),
        Value::Map(entries) => map_entries_to_map_value(entries, kind, options),
    }
}

fn enum_to_map_value(number: i32, kind: &Kind, options: &ForwardOptions) -> MapValue {
    if options.use_enum_labels {
        if let Kind::Enum(enum_desc) = kind {
            if let Some(label) = enum_desc.get_value(number) {
                return MapValue::Text(label.name().to_owned());
            }
            // Open enums may hold numbers with no label.
            trace!("No label for {} in {}", number, enum_desc.full_name());
        }
    }
    MapValue::Int(number.into())
}

/// Render a protobuf map as a mapping with stringified keys, sorted by key.
///
/// `kind` is the map field's kind, i.e. its synthetic entry message.
fn map_entries_to_map_value(
    entries: &HashMap<MapKey, Value>,
    kind: &Kind,
    options: &ForwardOptions,
) -> MapValue {
    let value_kind = match kind {
        Kind::Message(entry) if entry.is_map_entry() => entry.map_entry_value_field().kind(),
        other => other.clone(),
    };

    let mut sorted: Vec<(&MapKey, &Value)> = entries.iter().collect();
    sorted.sort_by(|(a, _), (b, _)| compare_map_keys(a, b));

    let mut mapping = Mapping::new();
    for (key, value) in sorted {
        mapping
            .fields
            .insert(map_key_to_string(key), proto_to_map_value(value, &value_kind, options));
    }
    MapValue::Map(mapping)
}

fn map_key_to_string(key: &MapKey) -> String {
    match key {
        MapKey::Bool(b) => b.to_string(),
        MapKey::I32(i) => i.to_string(),
        MapKey::I64(i) => i.to_string(),
        MapKey::U32(u) => u.to_string(),
        MapKey::U64(u) => u.to_string(),
        MapKey::String(s) => s.clone(),
    }
}

// All keys of one map share a variant.
fn compare_map_keys(a: &MapKey, b: &MapKey) -> Ordering {
    match (a, b) {
        (MapKey::Bool(a), MapKey::Bool(b)) => a.cmp(b),
        (MapKey::I32(a), MapKey::I32(b)) => a.cmp(b),
        (MapKey::I64(a), MapKey::I64(b)) => a.cmp(b),
        (MapKey::U32(a), MapKey::U32(b)) => a.cmp(b),
        (MapKey::U64(a), MapKey::U64(b)) => a.cmp(b),
        (MapKey::String(a), MapKey::String(b)) => a.cmp(b),
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{message_of_types, nested_type, populate_message_of_types, sample_registry};

    #[test]
    fn test_unset_fields_are_omitted() {
        let registry = sample_registry();
        let mut message = DynamicMessage::new(message_of_types(&registry));
        message.set_field_by_name("i32", Value::I32(0));

        let mapping = message_to_mapping(&message, &ForwardOptions::default());
        let keys: Vec<&str> = mapping.fields.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["i32"]);
        assert_eq!(mapping.get("i32"), Some(&MapValue::Int(0)));
        assert!(mapping.extensions.is_empty());
        assert!(mapping.class_name.is_none());
    }

    #[test]
    fn test_scalars_copied_verbatim() {
        let registry = sample_registry();
        let message = populate_message_of_types(&registry);
        let mapping = message_to_mapping(&message, &ForwardOptions::default());

        assert_eq!(mapping.get("dubl"), Some(&MapValue::Float(1.7e308)));
        assert_eq!(mapping.get("flot"), Some(&MapValue::Float(f64::from(3.4e38f32))));
        assert_eq!(mapping.get("i32"), Some(&MapValue::Int(i32::MAX.into())));
        assert_eq!(mapping.get("i64"), Some(&MapValue::Int(i64::MAX)));
        assert_eq!(mapping.get("ui32"), Some(&MapValue::UInt(u32::MAX.into())));
        assert_eq!(mapping.get("ui64"), Some(&MapValue::UInt(u64::MAX)));
        assert_eq!(mapping.get("si64"), Some(&MapValue::Int(-i64::MAX)));
        assert_eq!(mapping.get("f64"), Some(&MapValue::UInt(i64::MAX as u64)));
        assert_eq!(mapping.get("bol"), Some(&MapValue::Bool(true)));
        assert_eq!(mapping.get("strng"), Some(&MapValue::from("string")));
    }

    #[test]
    fn test_bytes_are_base64() {
        let registry = sample_registry();
        let message = populate_message_of_types(&registry);
        let mapping = message_to_mapping(&message, &ForwardOptions::default());
        assert_eq!(mapping.get("byts"), Some(&MapValue::from("ChQe")));
    }

    #[test]
    fn test_enum_numbers_and_labels() {
        let registry = sample_registry();
        let message = populate_message_of_types(&registry);

        let numbers = message_to_mapping(&message, &ForwardOptions::default());
        assert_eq!(numbers.get("enm"), Some(&MapValue::Int(2)));
        assert_eq!(
            numbers.get("enmRepeated"),
            Some(&MapValue::List(vec![MapValue::Int(0), MapValue::Int(2)]))
        );

        let labels = message_to_mapping(&message, &ForwardOptions::default().with_enum_labels(true));
        assert_eq!(labels.get("enm"), Some(&MapValue::from("C")));
        assert_eq!(
            labels.get("enmRepeated"),
            Some(&MapValue::List(vec![MapValue::from("A"), MapValue::from("C")]))
        );
    }

    #[test]
    fn test_unlabelled_enum_number_falls_back_to_ordinal() {
        let registry = sample_registry();
        let mut message = DynamicMessage::new(message_of_types(&registry));
        message.set_field_by_name("enm", Value::EnumNumber(42));

        let mapping = message_to_mapping(&message, &ForwardOptions::default().with_enum_labels(true));
        assert_eq!(mapping.get("enm"), Some(&MapValue::Int(42)));
    }

    #[test]
    fn test_class_metadata_on_every_message() {
        let registry = sample_registry();
        let mut message = populate_message_of_types(&registry);
        message.set_field_by_name(
            "nestedRepeated",
            Value::List(vec![Value::Message(nested_type(&registry, "0"))]),
        );

        let mapping = message_to_mapping(&message, &ForwardOptions::default().with_class_metadata(true));
        assert_eq!(mapping.class_name.as_deref(), Some("MessageOfTypes"));

        let nested = mapping.get("nested").and_then(MapValue::as_mapping).unwrap();
        assert_eq!(nested.class_name.as_deref(), Some("NestedType"));
        assert_eq!(nested.get("req"), Some(&MapValue::from("req")));

        let element = &mapping.get("nestedRepeated").and_then(MapValue::as_list).unwrap()[0];
        assert_eq!(element.as_mapping().unwrap().class_name.as_deref(), Some("NestedType"));
    }

    #[test]
    fn test_map_fields_sorted_by_key() {
        let registry = sample_registry();
        let message = populate_message_of_types(&registry);
        let mapping = message_to_mapping(&message, &ForwardOptions::default().with_class_metadata(true));

        let counts = mapping.get("counts").and_then(MapValue::as_mapping).unwrap();
        let keys: Vec<&str> = counts.fields.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert!(counts.class_name.is_none());

        let nested_map = mapping.get("nestedMap").and_then(MapValue::as_mapping).unwrap();
        let keys: Vec<&str> = nested_map.fields.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["-1", "2", "10"]);
        let value = nested_map.get("10").and_then(MapValue::as_mapping).unwrap();
        assert_eq!(value.get("req"), Some(&MapValue::from("ten")));
        assert_eq!(value.class_name.as_deref(), Some("NestedType"));
    }

    #[test]
    fn test_field_filter_applies_to_top_level_only() {
        let registry = sample_registry();
        let message = populate_message_of_types(&registry);

        let options = ForwardOptions::default().with_field_filter(FieldFilter::include(["nested", "i32"]));
        let mapping = message_to_mapping(&message, &options);
        let keys: Vec<&str> = mapping.fields.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["i32", "nested"]);

        let options = ForwardOptions::default().with_field_filter(FieldFilter::exclude(["req", "byts"]));
        let mapping = message_to_mapping(&message, &options);
        assert!(!mapping.contains("byts"));
        let nested = mapping.get("nested").and_then(MapValue::as_mapping).unwrap();
        assert!(nested.contains("req"));
    }

    #[test]
    fn test_extensions_keyed_by_number() {
        let registry = sample_registry();
        let descriptor = message_of_types(&registry);
        let mut message = DynamicMessage::new(descriptor.clone());
        let ext_string = registry.extension(&descriptor, 101).unwrap();
        let ext_nested = registry.extension(&descriptor, 103).unwrap();
        message.set_extension(ext_string, Value::String("string".into()));
        message.set_extension(ext_nested, Value::Message(nested_type(&registry, "nested")));

        let mapping = message_to_mapping(&message, &ForwardOptions::default().with_class_metadata(true));
        assert!(mapping.fields.is_empty());
        assert_eq!(mapping.extension(101), Some(&MapValue::from("string")));
        let nested = mapping.extension(103).and_then(MapValue::as_mapping).unwrap();
        assert_eq!(nested.get("req"), Some(&MapValue::from("nested")));
        assert_eq!(nested.class_name.as_deref(), Some("NestedType"));
        assert!(mapping.extension(100).is_none());
    }

    #[test]
    fn test_source_is_not_mutated() {
        let registry = sample_registry();
        let message = populate_message_of_types(&registry);
        let before = message.clone();
        let _ = message_to_mapping(&message, &ForwardOptions::default().with_class_metadata(true));
        assert_eq!(message, before);
    }
}
