//! Error taxonomy for query evaluation.
//!
//! [`QueryError`] covers every condition that ends a pipeline early. Whether a
//! variant is returned to the caller or recorded on the engine depends on its
//! kind:
//!
//! - `PermissionDenied` and `Interrupted` are engine-local. They are recorded as
//!   the engine's last [`Failure`] and converted into cancellation; they are never
//!   returned from `evaluate`.
//! - `ProviderFailure` is terminal for one provider only and is attributable via
//!   [`crate::Source::failure`].
//! - `Execution` is caller-visible and propagates out of `evaluate` unmodified.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{CapabilitySet, GrantRequestId, ProviderName, QueryId, StageName, Timestamp};

// ---------------------------------------------------------------------------
// Query errors
// ---------------------------------------------------------------------------

/// Errors that end the evaluation of a pipeline.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum QueryError {
    /// Evaluation with retry disabled found capabilities that are not granted.
    ///
    /// `missing` lists exactly the capabilities that were not granted at the
    /// time of the check.
    #[error("Permission denied: {missing}")]
    PermissionDenied {
        /// The capabilities that were required but not granted.
        missing: CapabilitySet,
    },

    /// All pipelines were stopped by the application.
    #[error("Interrupted: {reason}")]
    Interrupted {
        /// Human-readable reason passed to the stop request.
        reason: String,
    },

    /// A provider's external resource reported an unrecoverable error.
    #[error("Provider '{provider}' failed: {cause}")]
    ProviderFailure {
        /// The provider whose resource failed.
        provider: ProviderName,
        /// Description of the resource error.
        cause: String,
    },

    /// A stage raised an error while processing an item.
    #[error("Stage '{stage}' failed: {message}")]
    Execution {
        /// The stage that raised the error.
        stage: StageName,
        /// The stage's error message.
        message: String,
    },

    /// A grant-request resolution referred to a request that is not pending.
    #[error("Unknown grant request {id}")]
    UnknownGrantRequest {
        /// The correlation key that could not be found.
        id: GrantRequestId,
    },

    /// A provider was constructed with an invalid parameter.
    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Name of the rejected parameter.
        name: String,
        /// Why the value was rejected.
        message: String,
    },
}

impl QueryError {
    /// Convenience constructor for [`QueryError::ProviderFailure`].
    pub fn provider_failure(provider: &ProviderName, cause: impl Into<String>) -> Self {
        Self::ProviderFailure {
            provider: provider.clone(),
            cause: cause.into(),
        }
    }

    /// Convenience constructor for [`QueryError::InvalidParameter`].
    pub fn invalid_parameter(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Returns `true` for the failures the engine records instead of returning.
    pub fn is_engine_local(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. } | Self::Interrupted { .. })
    }
}

// ---------------------------------------------------------------------------
// Stage errors
// ---------------------------------------------------------------------------

/// Error returned by a stage's processing function.
///
/// The owning node wraps it into [`QueryError::Execution`] together with the
/// stage name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct StageError {
    message: String,
}

impl StageError {
    /// Creates a stage error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for StageError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for StageError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

// ---------------------------------------------------------------------------
// Recorded failures
// ---------------------------------------------------------------------------

/// A terminal failure recorded on an engine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    /// What went wrong.
    pub error: QueryError,
    /// The query being evaluated, if the failure concerns a single query.
    pub query: Option<QueryId>,
    /// When the failure was recorded.
    pub recorded_at: Timestamp,
}

impl Failure {
    /// Records `error` at the current time.
    pub fn new(error: QueryError, query: Option<QueryId>) -> Self {
        Self {
            error,
            query,
            recorded_at: Timestamp::now(),
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.query {
            Some(query) => write!(f, "{} (query {query}, at {})", self.error, self.recorded_at),
            None => write!(f, "{} (at {})", self.error, self.recorded_at),
        }
    }
}
