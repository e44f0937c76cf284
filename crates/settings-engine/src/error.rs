//! Error types for coercion, stores, and bindings.

use std::{io, path::PathBuf, result::Result as StdResult};

use thiserror::Error;

use crate::Value;

/// Convenient result type for the settings engine.
pub type Result<T> = StdResult<T, Error>;

/// Unified error type for the settings engine.
#[derive(Debug, Error)]
pub enum Error {
    /// The key is not declared by the schema, or absent from the document.
    #[error("unknown key: {key:?}")]
    UnknownKey {
        /// Offending key.
        key: String,
    },

    /// No schema definition is registered under this name.
    #[error("unknown schema: {name:?}")]
    UnknownSchema {
        /// Requested schema name.
        name: String,
    },

    /// The value is not of the declared runtime type.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Declared type, as a schema type string or kind name.
        expected: String,
        /// Kind of the value that was supplied.
        found: String,
    },

    /// The value is not one of the declared enumeration members.
    #[error("value {value} is not a valid enumeration member")]
    InvalidEnumValue {
        /// Rejected value.
        value: Value,
    },

    /// The value names flags outside the declared flag set.
    #[error("value {value} is not a valid flags value")]
    InvalidFlagsValue {
        /// Rejected value.
        value: Value,
    },

    /// The value lies outside the declared bounds.
    #[error("value {value} is outside of valid range [{min}, {max}]")]
    OutOfRange {
        /// Rejected value.
        value: Value,
        /// Inclusive lower bound.
        min: Value,
        /// Inclusive upper bound.
        max: Value,
    },

    /// The schema backend refused a value that passed coercion.
    #[error("value for key {key:?} was rejected by the backend")]
    ValueRejected {
        /// Key whose write was refused.
        key: String,
    },

    /// A file-store record lacks the requested field.
    #[error("key {key:?} has no {field:?} field")]
    MissingField {
        /// Record key.
        key: String,
        /// Missing field name.
        field: String,
    },

    /// A document or schema definition could not be parsed.
    #[error("failed to parse settings data in {}: {message}", path.display())]
    Parse {
        /// File that failed to parse.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// A schema definition is internally inconsistent.
    #[error("invalid schema {schema:?}: {message}")]
    InvalidSchema {
        /// Schema identifier (or file name when the id is unknown).
        schema: String,
        /// Human-readable description of the problem.
        message: String,
    },

    /// Reading a settings file failed.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// File being read.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Persisting a settings file failed; in-memory state was rolled back.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        /// File being written.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The file watch could not be established.
    #[error("failed to watch {}: {message}", path.display())]
    Watch {
        /// Watched file.
        path: PathBuf,
        /// Watcher message.
        message: String,
    },
}

impl Error {
    /// Build an [`Error::UnknownKey`].
    pub fn unknown_key(key: impl Into<String>) -> Self {
        Self::UnknownKey { key: key.into() }
    }

    /// Build an [`Error::InvalidSchema`].
    pub fn invalid_schema(schema: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            schema: schema.into(),
            message: message.into(),
        }
    }

    /// True for the value-rejected class: the store is unchanged and the caller
    /// supplied a value the key does not accept.
    pub fn is_value_rejected(&self) -> bool {
        matches!(
            self,
            Self::TypeMismatch { .. }
                | Self::InvalidEnumValue { .. }
                | Self::InvalidFlagsValue { .. }
                | Self::OutOfRange { .. }
                | Self::ValueRejected { .. }
        )
    }
}
