//! # Core Error Types

use thiserror::Error;

/// Errors raised by the typed value containers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// No value is registered under the key.
    #[error("no game value registered for key `{key}`")]
    MissingValue {
        /// Key name.
        key: &'static str,
    },

    /// A value exists under the key name but holds a different element type.
    #[error("game value `{key}` holds a different element type")]
    TypeMismatch {
        /// Key name.
        key: &'static str,
    },
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
