//! Error types shared across the framework.
//!
//! Registration-time failures (bad expressions, unknown adapters) surface to
//! the caller. Failures inside a running thought process are logged and
//! annotated but never abort the event; see the orchestrator for how
//! [`MiddlewareError`] and [`BranchError`] are absorbed.

use thiserror::Error;

/// Errors raised while compiling match conditions into regular expressions.
#[derive(Debug, Error)]
pub enum ExpressionError {
    /// A string literal was not of the form `/pattern/flags`.
    #[error("invalid expression literal: {0}")]
    InvalidExpression(String),

    /// A `range` condition was outside `0-999` or not `lo-hi`.
    #[error("invalid numeric range: {0}")]
    InvalidRange(String),

    /// The composed pattern failed to compile.
    #[error(transparent)]
    Regex(#[from] regex::Error),
}

/// Errors raised by the adapter registry and by adapter calls made from the
/// core.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The adapter could not be resolved, or resolved to the wrong slot type.
    #[error("invalid adapter '{name}': {reason}")]
    InvalidAdapter { name: String, reason: String },

    /// An adapter call exceeded the configured request timeout.
    #[error("adapter call timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// A storage operation was attempted without a storage adapter.
    #[error("no storage adapter is registered")]
    StorageUnavailable,

    /// The adapter itself reported a failure.
    #[error("adapter operation failed: {0}")]
    Failed(#[source] anyhow::Error),
}

/// A middleware piece (or the stage completion hook) failed.
///
/// Carries the middleware kind so observers can tell which stage's stack
/// produced the error; the state itself stays with the orchestrator call.
#[derive(Debug, Error)]
#[error("middleware '{middleware}' failed: {source}")]
pub struct MiddlewareError {
    /// Kind of the middleware stack, e.g. `listen`.
    pub middleware: String,
    #[source]
    pub source: anyhow::Error,
}

/// A branch callback failed during execution.
#[derive(Debug, Error)]
#[error("branch '{branch_id}' failed: {source}")]
pub struct BranchError {
    /// Id of the branch whose action failed.
    pub branch_id: String,
    #[source]
    pub source: anyhow::Error,
}

/// An envelope was given conflicting dispatch methods.
#[derive(Debug, Error)]
#[error("envelope method already set to '{current}', refusing '{requested}'")]
pub struct EnvelopeMethodConflict {
    pub current: String,
    pub requested: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expression_error_display() {
        let err = ExpressionError::InvalidExpression("hello".to_string());
        assert!(err.to_string().contains("hello"));
    }

    #[test]
    fn test_adapter_error_display() {
        let err = AdapterError::InvalidAdapter {
            name: "slack".to_string(),
            reason: "no factory registered".to_string(),
        };
        assert!(err.to_string().contains("slack"));
        assert!(err.to_string().contains("no factory"));

        let err = AdapterError::Timeout { ms: 250 };
        assert!(err.to_string().contains("250"));
    }

    #[test]
    fn test_middleware_error_carries_kind() {
        let err = MiddlewareError {
            middleware: "listen".to_string(),
            source: anyhow::anyhow!("boom"),
        };
        assert!(err.to_string().contains("listen"));
        assert!(err.to_string().contains("boom"));
    }
}
