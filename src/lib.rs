//! Protobuf message ↔ generic mapping conversion.
//!
//! This crate converts dynamic protobuf messages into plain key-value
//! [`Mapping`]s and back. A mapping is an intermediate representation: it holds
//! only booleans, numbers, strings, sequences and nested mappings, so it can be
//! handed to any serde text format (JSON in particular) without further work.
//!
//! # Architecture
//!
//! ```text
//! Forward:  DynamicMessage → Mapping → JSON text
//! Reverse:  JSON text → Mapping → DynamicMessage (new, or patched in place)
//! ```
//!
//! # Modules
//!
//! - [`forward`] - DynamicMessage → Mapping
//! - [`reverse`] - Mapping → DynamicMessage
//! - [`mapping`] - The mapping data model and its text form
//! - [`registry`] - Type-name and extension lookup, schema loading
//! - [`config`] - Per-call conversion options
//! - [`error`] - Error types for conversion operations
//!
//! # Example
//!
//! ```ignore
//! use proto_mapping::{
//!     mapping_to_message, message_to_mapping, ForwardOptions, Mapping, Registry, ReverseOptions,
//! };
//!
//! let registry = Registry::from_proto_files(&["schema/sample.proto"], &["schema"])?;
//! let descriptor = registry.message("sample.MessageOfTypes")?;
//!
//! let mapping = message_to_mapping(&message, &ForwardOptions::default().with_enum_labels(true));
//! let text = mapping.to_json_string()?;
//!
//! let parsed = Mapping::from_json_str(&text)?;
//! let rebuilt = mapping_to_message(&descriptor, &parsed, &registry, &ReverseOptions::default())?;
//! assert_eq!(rebuilt, message);
//! ```

pub mod config;
pub mod error;
pub mod forward;
pub mod mapping;
pub mod registry;
pub mod reverse;
pub mod testing;

pub use config::{FieldFilter, ForwardOptions, MapperConfig, ReverseOptions};
pub use error::{ConfigError, MappingError, Result, SchemaError};
pub use forward::message_to_mapping;
pub use mapping::{MapValue, Mapping, CLASS_NAME_KEY, EXTENSIONS_KEY};
pub use registry::Registry;
pub use reverse::{mapping_to_message, mapping_to_message_by_class, update_message};
