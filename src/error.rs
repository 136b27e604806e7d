//! Error types for meta point evaluation.
//!
//! `MetaError` is the single error type that crosses the executor boundary.
//! Errors raised by the Rhai runtime never escape as-is; they are translated
//! into [`ScriptError`] first.
//!
//! ## Error Hierarchy
//!
//! - **`PointResolution`**: A context entry names a point the registry does not know.
//!   Raised before any evaluation.
//! - **`ReservedAlias`**: A context alias collides with a name the executor defines
//!   itself (`SECOND`, `CONTEXT`, `TIMESTAMP`, ...).
//! - **`Script`**: The runtime failed to parse or run the script or the function library.
//! - **`ResultType`**: The script ran, but its result does not fit the target data type.
//! - **`Config`**: Configuration failed to load or validate.
//! - **`Internal`**: Defects that should not occur in correct operation, such as a
//!   function library that could not be read.
//!
//! Callers typically surface the first group as a problem with the script's
//! configuration ([`MetaError::is_user_error`]) and the rest as operational problems.

use thiserror::Error;

use crate::config::ConfigError;
use crate::core::{DataType, PointId};
use crate::scripting::ScriptError;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, MetaError>;

#[derive(Error, Debug)]
pub enum MetaError {
    #[error("Point {0} is missing from the runtime")]
    PointResolution(PointId),

    #[error("Alias '{0}' is reserved by the script context")]
    ReservedAlias(String),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("Cannot convert script result of type {actual} to {expected}")]
    ResultType { actual: String, expected: DataType },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MetaError {
    /// Whether the error points at the script or its point context rather
    /// than at the running system.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            MetaError::Script(_) | MetaError::ResultType { .. } | MetaError::ReservedAlias(_)
        )
    }
}
