//! Error types for schema loading and configuration.
//!
//! Reference resolution itself never fails: problems found while walking a
//! schema are collected as messages on [`ResolvedSchema`](crate::ResolvedSchema).
//! The enums here cover the hard failures at the edges.

use std::path::PathBuf;
use thiserror::Error;

/// Errors while fetching or parsing raw schema content.
#[derive(Debug, Error)]
pub enum LoadError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("no loader for '{id}'")]
    UnsupportedScheme { id: String },

    // Parse errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },
}

impl LoadError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoadError::FileNotFound { .. }
            | LoadError::ReadError { .. }
            | LoadError::UnsupportedScheme { .. } => 3,
            #[cfg(feature = "remote")]
            LoadError::NetworkError { .. } => 3,
            LoadError::InvalidJson { .. } => 2,
        }
    }

    /// True when the content was fetched but could not be parsed.
    pub fn is_parse_error(&self) -> bool {
        matches!(self, LoadError::InvalidJson { .. })
    }
}

/// Errors while reading a settings file.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings: {source}")]
    Parse {
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid patterns for schema '{schema}': expected string or array of strings, got {actual}")]
    InvalidPatterns { schema: String, actual: String },
}

impl SettingsError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            SettingsError::NotFound { .. } | SettingsError::Read { .. } => 3,
            SettingsError::Parse { .. } | SettingsError::InvalidPatterns { .. } => 2,
        }
    }
}

/// Error returned by a custom schema provider.
///
/// Providers may fail for any reason; the failure is only logged before the
/// service falls back to pattern associations.
pub type ProviderError = Box<dyn std::error::Error + Send + Sync>;
