//! Conversion options.
//!
//! Options are passed per call. [`MapperConfig`] bundles both directions so a
//! caller can keep them in a TOML file:
//!
//! ```toml
//! [forward]
//! use_enum_labels = true
//! add_class_metadata = false
//! field_filter = { exclude = ["password"] }
//!
//! [reverse]
//! strict = false
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Which top-level fields message → mapping conversion keeps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldFilter {
    #[default]
    All,
    /// Keep only the named fields.
    Include(BTreeSet<String>),
    /// Keep every field except the named ones.
    Exclude(BTreeSet<String>),
}

impl FieldFilter {
    pub fn include<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldFilter::Include(names.into_iter().map(Into::into).collect())
    }

    pub fn exclude<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldFilter::Exclude(names.into_iter().map(Into::into).collect())
    }

    pub fn admits(&self, field: &str) -> bool {
        match self {
            FieldFilter::All => true,
            FieldFilter::Include(names) => names.contains(field),
            FieldFilter::Exclude(names) => !names.contains(field),
        }
    }
}

/// Options for message → mapping conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardOptions {
    /// Render enum values as their labels instead of their numbers.
    pub use_enum_labels: bool,
    /// Record each message mapping's short type name.
    pub add_class_metadata: bool,
    /// Applied to the top-level message only.
    pub field_filter: FieldFilter,
}

impl ForwardOptions {
    pub fn with_enum_labels(mut self, enabled: bool) -> Self {
        self.use_enum_labels = enabled;
        self
    }

    pub fn with_class_metadata(mut self, enabled: bool) -> Self {
        self.add_class_metadata = enabled;
        self
    }

    pub fn with_field_filter(mut self, filter: FieldFilter) -> Self {
        self.field_filter = filter;
        self
    }
}

/// Options for mapping → message conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReverseOptions {
    /// Reject keys and extension numbers with no matching field.
    pub strict: bool,
}

impl Default for ReverseOptions {
    fn default() -> Self {
        Self { strict: true }
    }
}

impl ReverseOptions {
    pub fn strict() -> Self {
        Self { strict: true }
    }

    pub fn lenient() -> Self {
        Self { strict: false }
    }
}

/// Options for both directions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    pub forward: ForwardOptions,
    pub reverse: ReverseOptions,
}

impl MapperConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MapperConfig::default();
        assert!(!config.forward.use_enum_labels);
        assert!(!config.forward.add_class_metadata);
        assert_eq!(config.forward.field_filter, FieldFilter::All);
        assert!(config.reverse.strict);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = MapperConfig::from_toml_str("").unwrap();
        assert_eq!(config, MapperConfig::default());
    }

    #[test]
    fn test_full_toml() {
        let config = MapperConfig::from_toml_str(
            r#"
[forward]
use_enum_labels = true
add_class_metadata = true
field_filter = { exclude = ["password", "token"] }

[reverse]
strict = false
"#,
        )
        .unwrap();

        assert!(config.forward.use_enum_labels);
        assert!(config.forward.add_class_metadata);
        assert_eq!(
            config.forward.field_filter,
            FieldFilter::exclude(["password", "token"])
        );
        assert!(!config.reverse.strict);
    }

    #[test]
    fn test_partial_reverse_section_keeps_strict() {
        let config = MapperConfig::from_toml_str("[reverse]\n").unwrap();
        assert!(config.reverse.strict);
    }

    #[test]
    fn test_invalid_toml() {
        let err = MapperConfig::from_toml_str("[forward]\nuse_enum_labels = \"yes\"").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapper.toml");
        std::fs::write(&path, "[forward]\nfield_filter = { include = [\"i32\"] }\n").unwrap();

        let config = MapperConfig::from_file(&path).unwrap();
        assert!(config.forward.field_filter.admits("i32"));
        assert!(!config.forward.field_filter.admits("i64"));
    }

    #[test]
    fn test_missing_file() {
        let err = MapperConfig::from_file("/nonexistent/mapper.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_filter_admits() {
        assert!(FieldFilter::All.admits("anything"));
        let include = FieldFilter::include(["a"]);
        assert!(include.admits("a"));
        assert!(!include.admits("b"));
        let exclude = FieldFilter::exclude(["a"]);
        assert!(!exclude.admits("a"));
        assert!(exclude.admits("b"));
    }
}
