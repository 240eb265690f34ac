//! Generic key-value representation of a protobuf message.
//!
//! A [`Mapping`] holds one message's present fields by name, plus two reserved
//! slots that have no field name of their own: the extension block and the
//! class-name marker. In memory those slots are typed fields, so they can never
//! collide with a real field. Only the text form spells them as the reserved
//! keys [`EXTENSIONS_KEY`] and [`CLASS_NAME_KEY`].
//!
//! ```text
//! {
//!   "dubl": 1.5,
//!   "byts": "ChQe",                     // base64
//!   "nested": { "req": "req", "class_name": "NestedType" },
//!   "class_name": "MessageOfTypes",
//!   "___X": { "100": 123.4 }            // extension number -> value
//! }
//! ```
//!
//! Non-finite floats are written as the strings `"NaN"`, `"Infinity"` and
//! `"-Infinity"`. A reserved key whose value has the wrong shape for its slot
//! is read back as an ordinary field, so protobuf map entries keyed
//! `class_name` or `___X` survive the text form.

use indexmap::IndexMap;
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Reserved text-form key holding the extension block.
pub const EXTENSIONS_KEY: &str = "___X";

/// Reserved text-form key holding the class-name marker.
pub const CLASS_NAME_KEY: &str = "class_name";

const NAN_TEXT: &str = "NaN";
const INFINITY_TEXT: &str = "Infinity";
const NEG_INFINITY_TEXT: &str = "-Infinity";

/// Text spelling of a non-finite float, `None` for finite values.
pub fn non_finite_to_text(f: f64) -> Option<&'static str> {
    if f.is_nan() {
        Some(NAN_TEXT)
    } else if f == f64::INFINITY {
        Some(INFINITY_TEXT)
    } else if f == f64::NEG_INFINITY {
        Some(NEG_INFINITY_TEXT)
    } else {
        None
    }
}

/// Inverse of [`non_finite_to_text`].
pub fn non_finite_from_text(s: &str) -> Option<f64> {
    match s {
        NAN_TEXT => Some(f64::NAN),
        INFINITY_TEXT => Some(f64::INFINITY),
        NEG_INFINITY_TEXT => Some(f64::NEG_INFINITY),
        _ => None,
    }
}

/// A message rendered as a plain mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapping {
    /// Present fields by name. Order is descriptor order for converted
    /// messages and input order for parsed text.
    pub fields: IndexMap<String, MapValue>,
    /// Short type name of the message this mapping was produced from.
    pub class_name: Option<String>,
    /// Extension values keyed by extension number.
    pub extensions: BTreeMap<u32, MapValue>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a class-name marker.
    pub fn with_class_name(mut self, name: impl Into<String>) -> Self {
        self.class_name = Some(name.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&MapValue> {
        self.fields.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<MapValue>) -> Option<MapValue> {
        self.fields.insert(field.into(), value.into())
    }

    /// Remove a field, keeping the order of the remaining ones.
    pub fn remove(&mut self, field: &str) -> Option<MapValue> {
        self.fields.shift_remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn extension(&self, number: u32) -> Option<&MapValue> {
        self.extensions.get(&number)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the mapping has no fields and no extensions.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.extensions.is_empty()
    }

    pub fn to_json_value(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json_value(value: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

/// A single value inside a [`Mapping`].
#[derive(Debug, Clone)]
pub enum MapValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    List(Vec<MapValue>),
    Map(Mapping),
}

impl MapValue {
    /// Short name of the value's shape, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            MapValue::Bool(_) => "bool",
            MapValue::Int(_) | MapValue::UInt(_) => "integer",
            MapValue::Float(_) => "float",
            MapValue::Text(_) => "string",
            MapValue::List(_) => "sequence",
            MapValue::Map(_) => "mapping",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MapValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MapValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[MapValue]> {
        match self {
            MapValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            MapValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Numeric view of a float or integer value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MapValue::Float(f) => Some(*f),
            MapValue::Int(i) => Some(*i as f64),
            MapValue::UInt(u) => Some(*u as f64),
            _ => None,
        }
    }
}

// Text formats do not preserve the signed/unsigned split for non-negative
// integers, so Int(n) and UInt(n) are the same value.
impl PartialEq for MapValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MapValue::Bool(a), MapValue::Bool(b)) => a == b,
            (MapValue::Int(a), MapValue::Int(b)) => a == b,
            (MapValue::UInt(a), MapValue::UInt(b)) => a == b,
            (MapValue::Int(a), MapValue::UInt(b)) | (MapValue::UInt(b), MapValue::Int(a)) => {
                u64::try_from(*a).is_ok_and(|a| a == *b)
            }
            (MapValue::Float(a), MapValue::Float(b)) => a == b,
            (MapValue::Text(a), MapValue::Text(b)) => a == b,
            (MapValue::List(a), MapValue::List(b)) => a == b,
            (MapValue::Map(a), MapValue::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for MapValue {
    fn from(v: bool) -> Self {
        MapValue::Bool(v)
    }
}

impl From<i32> for MapValue {
    fn from(v: i32) -> Self {
        MapValue::Int(v.into())
    }
}

impl From<i64> for MapValue {
    fn from(v: i64) -> Self {
        MapValue::Int(v)
    }
}

impl From<u32> for MapValue {
    fn from(v: u32) -> Self {
        MapValue::UInt(v.into())
    }
}

impl From<u64> for MapValue {
    fn from(v: u64) -> Self {
        MapValue::UInt(v)
    }
}

impl From<f64> for MapValue {
    fn from(v: f64) -> Self {
        MapValue::Float(v)
    }
}

impl From<&str> for MapValue {
    fn from(v: &str) -> Self {
        MapValue::Text(v.to_owned())
    }
}

impl From<String> for MapValue {
    fn from(v: String) -> Self {
        MapValue::Text(v)
    }
}

impl From<Vec<MapValue>> for MapValue {
    fn from(v: Vec<MapValue>) -> Self {
        MapValue::List(v)
    }
}

impl From<Mapping> for MapValue {
    fn from(v: Mapping) -> Self {
        MapValue::Map(v)
    }
}

// ============================================================================
// Text form
// ============================================================================

impl Serialize for MapValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            MapValue::Bool(b) => serializer.serialize_bool(*b),
            MapValue::Int(i) => serializer.serialize_i64(*i),
            MapValue::UInt(u) => serializer.serialize_u64(*u),
            MapValue::Float(f) => match non_finite_to_text(*f) {
                Some(text) => serializer.serialize_str(text),
                None => serializer.serialize_f64(*f),
            },
            MapValue::Text(s) => serializer.serialize_str(s),
            MapValue::List(items) => serializer.collect_seq(items),
            MapValue::Map(m) => m.serialize(serializer),
        }
    }
}

struct ExtensionBlock<'a>(&'a BTreeMap<u32, MapValue>);

impl Serialize for ExtensionBlock<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (number, value) in self.0 {
            map.serialize_entry(&number.to_string(), value)?;
        }
        map.end()
    }
}

impl Serialize for Mapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let len = self.fields.len()
            + usize::from(self.class_name.is_some())
            + usize::from(!self.extensions.is_empty());
        let mut map = serializer.serialize_map(Some(len))?;
        for (field, value) in &self.fields {
            map.serialize_entry(field, value)?;
        }
        if let Some(name) = &self.class_name {
            map.serialize_entry(CLASS_NAME_KEY, name)?;
        }
        if !self.extensions.is_empty() {
            map.serialize_entry(EXTENSIONS_KEY, &ExtensionBlock(&self.extensions))?;
        }
        map.end()
    }
}

struct MapValueVisitor;

impl<'de> Visitor<'de> for MapValueVisitor {
    type Value = MapValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a boolean, number, string, sequence or mapping")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<MapValue, E> {
        Ok(MapValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<MapValue, E> {
        Ok(MapValue::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<MapValue, E> {
        Ok(MapValue::UInt(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<MapValue, E> {
        Ok(MapValue::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<MapValue, E> {
        Ok(MapValue::Text(v.to_owned()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<MapValue, E> {
        Ok(MapValue::Text(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<MapValue, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(MapValue::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> std::result::Result<MapValue, A::Error> {
        MappingVisitor.visit_map(map).map(MapValue::Map)
    }
}

impl<'de> Deserialize<'de> for MapValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(MapValueVisitor)
    }
}

struct MappingVisitor;

impl<'de> Visitor<'de> for MappingVisitor {
    type Value = Mapping;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a mapping of field names to values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Mapping, A::Error> {
        let mut mapping = Mapping::new();
        while let Some(key) = access.next_key::<String>()? {
            let value: MapValue = access.next_value()?;
            match value {
                MapValue::Text(name) if key == CLASS_NAME_KEY => mapping.class_name = Some(name),
                MapValue::Map(block) if key == EXTENSIONS_KEY => match extension_block(block) {
                    Ok(extensions) => mapping.extensions.extend(extensions),
                    Err(block) => {
                        mapping.fields.insert(key, MapValue::Map(block));
                    }
                },
                value => {
                    mapping.fields.insert(key, value);
                }
            }
        }
        Ok(mapping)
    }
}

/// Read a parsed `___X` object as an extension block. Anything that is not a
/// non-empty object keyed by extension numbers is handed back unchanged.
fn extension_block(block: Mapping) -> std::result::Result<BTreeMap<u32, MapValue>, Mapping> {
    let numbered = !block.fields.is_empty()
        && block.class_name.is_none()
        && block.extensions.is_empty()
        && block.fields.keys().all(|key| key.parse::<u32>().is_ok());
    if !numbered {
        return Err(block);
    }
    Ok(block
        .fields
        .into_iter()
        .filter_map(|(key, value)| key.parse::<u32>().ok().map(|number| (number, value)))
        .collect())
}

impl<'de> Deserialize<'de> for Mapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(MappingVisitor)
    }
}
