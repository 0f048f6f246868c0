//! ADC-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, AdcError>;

/// Top-level error type for the adaptive disposition controller.
#[derive(Debug, Error)]
pub enum AdcError {
    #[error("[ADC-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[ADC-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[ADC-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[ADC-2001] store failure in {context}: {details}")]
    Store {
        context: &'static str,
        details: String,
    },

    #[error("[ADC-2002] {what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    #[error("[ADC-2003] store already initialized with active version {version_id}")]
    AlreadyInitialized { version_id: String },

    #[error("[ADC-2004] corrupt snapshot {version_id}: {details}")]
    CorruptSnapshot {
        version_id: String,
        details: String,
    },

    #[error("[ADC-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[ADC-3001] codec failure during {op}: {details}")]
    Codec { op: &'static str, details: String },

    #[error("[ADC-3002] codec deadline of {seconds}s expired during {op}")]
    CodecTimeout { op: &'static str, seconds: u64 },

    #[error("[ADC-3101] retrieval failure: {details}")]
    Retrieval { details: String },

    #[error("[ADC-3201] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[ADC-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl AdcError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "ADC-1001",
            Self::MissingConfig { .. } => "ADC-1002",
            Self::ConfigParse { .. } => "ADC-1003",
            Self::Store { .. } => "ADC-2001",
            Self::NotFound { .. } => "ADC-2002",
            Self::AlreadyInitialized { .. } => "ADC-2003",
            Self::CorruptSnapshot { .. } => "ADC-2004",
            Self::Serialization { .. } => "ADC-2101",
            Self::Codec { .. } => "ADC-3001",
            Self::CodecTimeout { .. } => "ADC-3002",
            Self::Retrieval { .. } => "ADC-3101",
            Self::Io { .. } => "ADC-3201",
            Self::Runtime { .. } => "ADC-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Store { .. }
                | Self::Codec { .. }
                | Self::CodecTimeout { .. }
                | Self::Retrieval { .. }
                | Self::Io { .. }
                | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for store errors with a known context.
    #[must_use]
    pub fn store(context: &'static str, details: impl Into<String>) -> Self {
        Self::Store {
            context,
            details: details.into(),
        }
    }
}

impl From<rusqlite::Error> for AdcError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Store {
            context: "rusqlite",
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for AdcError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for AdcError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
