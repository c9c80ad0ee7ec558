//! Error taxonomy of the engine.
//!
//! Every variant aborts the operation that raised it. Rule violations found
//! by the validator are not errors; they are returned as
//! [`bindery_types::ValidationResult`].

use std::path::PathBuf;

use bindery_types::UnsupportedValue;
use thiserror::Error;

use crate::codec::CodecError;
use crate::path::PathError;

/// Main error type for resolution and compilation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("missing input '{input_id}': {reason}")]
    MissingInput { input_id: String, reason: String },

    #[error("unsupported {what}: '{value}'")]
    Unsupported { what: String, value: String },

    #[error("structural error: {0}")]
    Structural(#[from] PathError),

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("decode error in {origin}: {source}")]
    Codec {
        origin: String,
        #[source]
        source: CodecError,
    },

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    /// Create a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a missing-input error.
    pub fn missing_input(input_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MissingInput {
            input_id: input_id.into(),
            reason: reason.into(),
        }
    }

    /// Create an unsupported-value error.
    pub fn unsupported(what: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Unsupported {
            what: what.into(),
            value: value.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Create a decode error attributed to `origin` (a path or reference).
    pub fn codec(origin: impl Into<String>, source: CodecError) -> Self {
        Self::Codec {
            origin: origin.into(),
            source,
        }
    }

    /// Create an I/O error for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

impl From<UnsupportedValue> for EngineError {
    fn from(error: UnsupportedValue) -> Self {
        Self::Unsupported {
            what: error.what.to_string(),
            value: error.value,
        }
    }
}

/// Result alias used throughout the engine.
pub type EngineResult<T> = Result<T, EngineError>;
