//! Settings files describing schema associations.
//!
//! ```json
//! {
//!   "schemas": {
//!     "https://json.schemastore.org/github-workflow.json": ".github/workflows/*",
//!     "./schemas/app.json": ["app.yaml", "*.app.yaml"]
//!   }
//! }
//! ```
//!
//! Relative schema paths are taken from the settings file's directory.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::SettingsError;
use crate::loader::{is_absolute_reference, path_to_id};
use crate::service::SchemaService;
use crate::types::json_type_name;

#[derive(Debug, Deserialize)]
struct RawSettings {
    #[serde(default)]
    schemas: Map<String, Value>,
}

/// One schema and the file patterns it applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaAssociation {
    pub schema: String,
    pub patterns: Vec<String>,
}

/// Parsed settings, associations in file order.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub associations: Vec<SchemaAssociation>,
}

impl Settings {
    /// Parse settings text. Relative schema paths are joined to `base_dir`
    /// when given, and kept as written otherwise.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::Parse` for malformed JSON and
    /// `SettingsError::InvalidPatterns` for a pattern value that is neither a
    /// string nor an array of strings.
    pub fn parse(content: &str, base_dir: Option<&Path>) -> Result<Self, SettingsError> {
        let raw: RawSettings =
            serde_json::from_str(content).map_err(|source| SettingsError::Parse { source })?;

        let mut associations = Vec::with_capacity(raw.schemas.len());
        for (schema, patterns) in raw.schemas {
            let patterns = parse_patterns(&schema, patterns)?;
            associations.push(SchemaAssociation {
                schema: schema_id(&schema, base_dir),
                patterns,
            });
        }

        Ok(Self { associations })
    }

    /// Load settings from a file.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::NotFound` if the file doesn't exist, plus the
    /// errors of [`Settings::parse`].
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Err(SettingsError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::parse(&content, Some(&base_dir))
    }

    /// Register every (pattern, schema) pair with `service`, in file order.
    pub fn apply_to(&self, service: &SchemaService) {
        for association in &self.associations {
            for pattern in &association.patterns {
                service.register_association(pattern, [&association.schema]);
            }
        }
    }
}

fn parse_patterns(schema: &str, value: Value) -> Result<Vec<String>, SettingsError> {
    let invalid = |actual: &Value| SettingsError::InvalidPatterns {
        schema: schema.to_string(),
        actual: json_type_name(actual).to_string(),
    };

    match value {
        Value::String(pattern) => Ok(vec![pattern]),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(pattern) => Ok(pattern),
                other => Err(invalid(&other)),
            })
            .collect(),
        other => Err(invalid(&other)),
    }
}

fn schema_id(schema: &str, base_dir: Option<&Path>) -> String {
    if is_absolute_reference(schema) {
        return schema.to_string();
    }
    match base_dir {
        Some(dir) => path_to_id(&dir.join(schema)),
        None => schema.to_string(),
    }
}
