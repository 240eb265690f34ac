//! Shared fixtures for unit and integration tests.
//!
//! The fixture schema lives in `tests/fixtures/sample.proto` and is parsed at
//! test time, so no generated code is involved.

use crate::registry::Registry;
use prost_reflect::{DynamicMessage, MapKey, MessageDescriptor, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const MESSAGE_OF_TYPES: &str = "sample.MessageOfTypes";
pub const NESTED_TYPE: &str = "sample.MessageOfTypes.NestedType";

pub fn sample_proto_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/sample.proto")
}

pub fn sample_registry() -> Registry {
    Registry::from_proto_files(&[sample_proto_path()], &[] as &[&Path])
        .expect("sample.proto should load")
}

pub fn message_of_types(registry: &Registry) -> MessageDescriptor {
    registry
        .message(MESSAGE_OF_TYPES)
        .expect("MessageOfTypes should be registered")
}

pub fn nested_type(registry: &Registry, req: &str) -> DynamicMessage {
    let descriptor = registry
        .message(NESTED_TYPE)
        .expect("NestedType should be registered");
    let mut nested = DynamicMessage::new(descriptor);
    nested.set_field_by_name("req", Value::String(req.to_owned()));
    nested
}

/// A `MessageOfTypes` with every non-extension field set, most of them to
/// the edge of their range.
pub fn populate_message_of_types(registry: &Registry) -> DynamicMessage {
    let mut m = DynamicMessage::new(message_of_types(registry));
    m.set_field_by_name("dubl", Value::F64(1.7e308));
    m.set_field_by_name("flot", Value::F32(3.4e38));
    m.set_field_by_name("i32", Value::I32(i32::MAX));
    m.set_field_by_name("i64", Value::I64(i64::MAX));
    m.set_field_by_name("ui32", Value::U32(u32::MAX));
    m.set_field_by_name("ui64", Value::U64(u64::MAX));
    m.set_field_by_name("si32", Value::I32(-i32::MAX));
    m.set_field_by_name("si64", Value::I64(-i64::MAX));
    m.set_field_by_name("f32", Value::U32(i32::MAX as u32));
    m.set_field_by_name("f64", Value::U64(i64::MAX as u64));
    m.set_field_by_name("sf32", Value::I32(-i32::MAX));
    m.set_field_by_name("sf64", Value::I64(-i64::MAX));
    m.set_field_by_name("bol", Value::Bool(true));
    m.set_field_by_name("strng", Value::String("string".to_owned()));
    m.set_field_by_name("byts", Value::Bytes(vec![0x0a, 0x14, 0x1e].into()));
    m.set_field_by_name("nested", Value::Message(nested_type(registry, "req")));
    m.set_field_by_name("enm", Value::EnumNumber(2));
    m.set_field_by_name(
        "enmRepeated",
        Value::List(vec![Value::EnumNumber(0), Value::EnumNumber(2)]),
    );
    m.set_field_by_name("range", Value::List((0..10).map(Value::I32).collect()));

    let counts = HashMap::from([
        (MapKey::String("b".to_owned()), Value::I32(2)),
        (MapKey::String("a".to_owned()), Value::I32(1)),
    ]);
    m.set_field_by_name("counts", Value::Map(counts));

    let nested_map = HashMap::from([
        (MapKey::I32(10), Value::Message(nested_type(registry, "ten"))),
        (MapKey::I32(-1), Value::Message(nested_type(registry, "minus one"))),
        (MapKey::I32(2), Value::Message(nested_type(registry, "two"))),
    ]);
    m.set_field_by_name("nestedMap", Value::Map(nested_map));
    m
}

/// Install a test subscriber; honours `RUST_LOG`.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_test_writer()
        .try_init();
}
