//! Error taxonomy for the analytics core.
//!
//! Two failure families exist: the document store being unreachable
//! (`StoreError`, surfaced to the orchestrator which degrades the affected
//! unit) and the prediction service being unavailable (`PredictError`, always
//! recovered locally via the rule-based fallback). Gaps in progress data are
//! not errors; the aggregator excludes them from denominators and logs them.

use std::time::Duration;

use thiserror::Error;

use crate::model::RecordKind;

/// Errors from the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store is unreachable. Transient; not retried by this core.
    #[error("document store unavailable: {0}")]
    Unavailable(String),

    /// The store did not answer within the client timeout.
    #[error("document store request timed out after {0:?}")]
    Timeout(Duration),

    /// The store answered with a record we could not decode.
    #[error("malformed {kind} record '{id}': {message}")]
    Malformed {
        kind: RecordKind,
        id: String,
        message: String,
    },
}

impl StoreError {
    /// Transient errors may succeed on a later, unrelated call; malformed
    /// records will not.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }
}

/// Errors from the prediction service. Every variant triggers the rule-based
/// fallback; none is ever surfaced as a user-visible failure.
#[derive(Debug, Error)]
pub enum PredictError {
    /// A network error occurred.
    #[error("prediction service unreachable: {0}")]
    Network(String),

    /// The bounded request timeout elapsed.
    #[error("prediction request timed out after {0:?}")]
    Timeout(Duration),

    /// The service answered with an error status.
    #[error("prediction service error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The response was missing the expected numeric risk score or was
    /// otherwise undecodable.
    #[error("malformed prediction response: {0}")]
    Malformed(String),
}
