//! Type-name and extension lookup.
//!
//! Extensions are not reachable through a message's own field names, and a
//! class-name marker only carries a type name. Both are resolved here, against
//! a registry the caller builds once and passes to every reverse conversion.

use crate::error::{MappingError, Result, SchemaError};
use prost_reflect::{DescriptorPool, ExtensionDescriptor, MessageDescriptor};
use protobuf::Message as _;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Message types and extensions of one descriptor pool, indexed for lookup.
#[derive(Debug, Clone)]
pub struct Registry {
    pool: DescriptorPool,
    by_full_name: HashMap<String, MessageDescriptor>,
    by_short_name: HashMap<String, Vec<MessageDescriptor>>,
    extensions: HashMap<(String, u32), ExtensionDescriptor>,
}

impl Registry {
    /// Index every message type and extension in `pool`.
    ///
    /// Synthetic map-entry types are skipped; they never appear as a class name.
    pub fn from_pool(pool: &DescriptorPool) -> Self {
        let mut by_full_name = HashMap::new();
        let mut by_short_name: HashMap<String, Vec<MessageDescriptor>> = HashMap::new();
        for message in pool.all_messages() {
            if message.is_map_entry() {
                continue;
            }
            by_short_name
                .entry(message.name().to_owned())
                .or_default()
                .push(message.clone());
            by_full_name.insert(message.full_name().to_owned(), message);
        }

        let mut extensions = HashMap::new();
        for extension in pool.all_extensions() {
            let key = (
                extension.containing_message().full_name().to_owned(),
                extension.number(),
            );
            extensions.insert(key, extension);
        }

        debug!(
            "Indexed {} message types and {} extensions",
            by_full_name.len(),
            extensions.len()
        );

        Self {
            pool: pool.clone(),
            by_full_name,
            by_short_name,
            extensions,
        }
    }

    /// Load an encoded `FileDescriptorSet` (`protoc --descriptor_set_out`).
    pub fn from_descriptor_set(bytes: &[u8]) -> std::result::Result<Self, SchemaError> {
        let pool = DescriptorPool::decode(bytes)?;
        Ok(Self::from_pool(&pool))
    }

    /// Parse `.proto` sources and load them.
    ///
    /// When `includes` is empty, the parent directory of each input is used as
    /// the include path.
    pub fn from_proto_files<P: AsRef<Path>, I: AsRef<Path>>(
        inputs: &[P],
        includes: &[I],
    ) -> std::result::Result<Self, SchemaError> {
        let bytes = encode_proto_files(inputs, includes)?;
        Self::from_descriptor_set(&bytes)
    }

    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    /// Resolve a message type by full name, falling back to a unique short name.
    pub fn message(&self, name: &str) -> Result<MessageDescriptor> {
        if let Some(message) = self.by_full_name.get(name) {
            return Ok(message.clone());
        }
        match self.by_short_name.get(name).map(Vec::as_slice) {
            Some([only]) => Ok(only.clone()),
            Some([_, _, ..]) => Err(MappingError::AmbiguousType(name.to_owned())),
            _ => Err(MappingError::UnknownType(name.to_owned())),
        }
    }

    /// Resolve extension `number` of `message`.
    ///
    /// Returns `None` when the number is not registered, or when it belongs to
    /// a same-named type from a different pool.
    pub fn extension(&self, message: &MessageDescriptor, number: u32) -> Option<&ExtensionDescriptor> {
        self.extensions
            .get(&(message.full_name().to_owned(), number))
            .filter(|extension| extension.containing_message() == *message)
    }
}

/// Parse `.proto` sources with the pure-Rust parser and encode the result as a
/// `FileDescriptorSet`.
fn encode_proto_files<P: AsRef<Path>, I: AsRef<Path>>(
    inputs: &[P],
    includes: &[I],
) -> std::result::Result<Vec<u8>, SchemaError> {
    let mut parser = protobuf_parse::Parser::new();
    parser.pure();

    if includes.is_empty() {
        for input in inputs {
            if let Some(parent) = input.as_ref().parent() {
                parser.include(parent);
            }
        }
    } else {
        for include in includes {
            parser.include(include.as_ref());
        }
    }
    for input in inputs {
        parser.input(input.as_ref());
    }

    let parsed = parser
        .parse_and_typecheck()
        .map_err(|e| SchemaError::ProtoParse(e.to_string()))?;

    debug!("Parsed {} proto files", parsed.file_descriptors.len());

    let set = protobuf::descriptor::FileDescriptorSet {
        file: parsed.file_descriptors,
        ..Default::default()
    };
    set.write_to_bytes()
        .map_err(|e| SchemaError::Encode(e.to_string()))
}
