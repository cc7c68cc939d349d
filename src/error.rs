use thiserror::Error;

use crate::core::operation::OperationId;

/// Errors produced by misusing the engine API.
///
/// Distinct from [`OperationError`]: these are programming errors surfaced
/// to the caller, not lifecycle outcomes of an operation.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Operation {id} already started")]
    AlreadyStarted { id: OperationId },

    #[error("Operation {id} is not enqueued")]
    NotEnqueued { id: OperationId },

    #[error("Operation queue is closed")]
    QueueClosed,
}

pub type Result<T> = std::result::Result<T, Error>;

/// A terminal error recorded against a single operation.
///
/// An operation accumulates these in order: dependency failures first, then
/// either a condition failure or whatever the work body reports at finish.
/// Multiple entries are preserved, never collapsed, so callers see the full
/// causal chain.
#[derive(Error, Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum OperationError {
    #[error("condition '{condition}' failed: {reason}")]
    ConditionFailed { condition: String, reason: String },

    #[error("dependency '{dependency}' failed")]
    DependencyFailed {
        dependency: String,
        errors: Vec<OperationError>,
    },

    #[error("service failed: {detail}")]
    ServiceFailed { detail: String },

    #[error("operation cancelled")]
    Cancelled,
}

impl OperationError {
    /// Convenience constructor for the common service-failure case.
    pub fn service(detail: impl Into<String>) -> Self {
        OperationError::ServiceFailed {
            detail: detail.into(),
        }
    }

    /// Convenience constructor for a condition failure.
    pub fn condition(condition: impl Into<String>, reason: impl Into<String>) -> Self {
        OperationError::ConditionFailed {
            condition: condition.into(),
            reason: reason.into(),
        }
    }
}
