//! Error types for proto-mapping.

use thiserror::Error;

/// Errors raised while converting a mapping into a message.
///
/// Message → mapping conversion cannot fail; every variant here comes from the
/// reverse direction or from class-name resolution.
#[derive(Error, Debug)]
pub enum MappingError {
    #[error("Unknown field '{field}' for message {message}")]
    UnknownField { message: String, field: String },

    #[error("Unknown extension number {number} for message {message}")]
    UnknownExtension { message: String, number: u32 },

    #[error("Invalid value {value} for enum {enum_name} at '{path}'")]
    InvalidEnum {
        path: String,
        enum_name: String,
        value: String,
    },

    #[error("Type mismatch at '{path}': expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("Value {value} out of range for {kind} at '{path}'")]
    OutOfRange {
        path: String,
        kind: &'static str,
        value: String,
    },

    #[error("Cannot assign value at '{path}': {message}")]
    InvalidValue { path: String, message: String },

    #[error("Invalid base64 at '{path}': {message}")]
    InvalidBase64 { path: String, message: String },

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Ambiguous message type name: {0}")]
    AmbiguousType(String),

    #[error("Mapping has no class name to resolve its message type")]
    MissingClassName,
}

/// Errors raised while loading a schema into a [`crate::Registry`].
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to read schema file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse proto files: {0}")]
    ProtoParse(String),

    #[error("Failed to encode file descriptors: {0}")]
    Encode(String),

    #[error("Invalid descriptor set: {0}")]
    Descriptor(#[from] prost_reflect::DescriptorError),
}

/// Errors raised while loading a [`crate::MapperConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type alias for conversion operations.
pub type Result<T> = std::result::Result<T, MappingError>;
