//! # Security Error Types
//!
//! All errors that can occur in the sequence engine.

use std::path::PathBuf;

use thiserror::Error;

use crate::sequence::DefinitionId;

/// Errors that can occur in the sequence engine.
#[derive(Error, Debug)]
pub enum SecurityError {
    /// A live sequence of the same definition already runs for the entity.
    #[error("sequence `{definition}` already active for entity {entry}")]
    DuplicateSequence {
        /// The conflicting definition.
        definition: DefinitionId,
        /// The entity, formatted.
        entry: String,
    },

    /// The entity reached its live sequence cap.
    #[error("entity {entry} already holds {limit} sequences")]
    CapacityExceeded {
        /// The entity, formatted.
        entry: String,
        /// Configured cap.
        limit: usize,
    },

    /// A definition failed validation.
    #[error("invalid sequence definition `{name}`: {reason}")]
    InvalidDefinition {
        /// Definition name.
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Invalid configuration values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML for the schema.
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

/// Result type for sequence engine operations.
pub type SecurityResult<T> = Result<T, SecurityError>;

/// Internal failure of a step predicate.
///
/// The sequence that raised it expires; nothing else is affected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("step predicate failed: {reason}")]
pub struct PredicateError {
    /// What went wrong.
    pub reason: String,
}

impl PredicateError {
    /// Creates a predicate error.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<aegis_core::CoreError> for PredicateError {
    fn from(err: aegis_core::CoreError) -> Self {
        Self::new(err.to_string())
    }
}
