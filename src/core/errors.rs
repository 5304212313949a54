//! FIDX-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, FidxError>;

/// Top-level error type for the file index.
#[derive(Debug, Error)]
pub enum FidxError {
    #[error("[FIDX-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[FIDX-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[FIDX-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[FIDX-2001] index invariant violated: {details}")]
    IndexInvariant { details: String },

    #[error("[FIDX-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[FIDX-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[FIDX-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl FidxError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "FIDX-1001",
            Self::MissingConfig { .. } => "FIDX-1002",
            Self::ConfigParse { .. } => "FIDX-1003",
            Self::IndexInvariant { .. } => "FIDX-2001",
            Self::Serialization { .. } => "FIDX-2101",
            Self::Io { .. } => "FIDX-3002",
            Self::Runtime { .. } => "FIDX-3900",
        }
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for a broken tree invariant.
    #[must_use]
    pub fn invariant(details: impl Into<String>) -> Self {
        Self::IndexInvariant {
            details: details.into(),
        }
    }
}

impl From<serde_json::Error> for FidxError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for FidxError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
