//! Error types for the connector operator
//!
//! Errors raised while reconciling carry enough context (resource kind and id,
//! failing phase, adapter operation) to be actionable from a single log line.
//! Admission denials are NOT represented here: they live in
//! [`crate::webhook::ValidationError`] so that a policy denial can never be
//! confused with a system fault.

use std::time::Duration;

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for connector operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error that is neither a not-found nor a conflict
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// The resource record does not exist in the store
    #[error("{kind} {id} not found")]
    NotFound {
        /// Resource kind (e.g. "ObjectBucket")
        kind: String,
        /// Namespaced identifier of the resource
        id: String,
    },

    /// The resource record was modified concurrently (stale resourceVersion)
    #[error("conflict updating {kind} {id}: the object has been modified")]
    Conflict {
        /// Resource kind (e.g. "ObjectBucket")
        kind: String,
        /// Namespaced identifier of the resource
        id: String,
    },

    /// External storage API error
    #[error("adapter error during {operation}: {message}")]
    Adapter {
        /// Adapter operation that failed (describe, create, delete)
        operation: String,
        /// Description of what failed
        message: String,
        /// Whether this error is retryable
        retryable: bool,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// A phase failed while unwinding external state on deletion
    #[error("error during finalization in phase {phase}: {source}")]
    Finalization {
        /// Name of the phase whose cleanup failed
        phase: String,
        /// The cleanup error
        #[source]
        source: Box<Error>,
    },

    /// A reconcile invocation exceeded its deadline
    #[error("reconciliation of {id} timed out after {after:?}")]
    Timeout {
        /// Namespaced identifier of the resource
        id: String,
        /// The deadline that elapsed
        after: Duration,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g. "reconciler", "webhook")
        context: String,
    },
}

impl Error {
    /// Create a not-found error for a resource
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Create a conflict error for a resource
    pub fn conflict(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Conflict {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Create a retryable adapter error
    pub fn adapter(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Adapter {
            operation: operation.into(),
            message: msg.into(),
            retryable: true,
        }
    }

    /// Create a non-retryable adapter error (e.g. the storage API rejected the request)
    pub fn adapter_permanent(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Adapter {
            operation: operation.into(),
            message: msg.into(),
            retryable: false,
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Wrap a cleanup error with the name of the phase that raised it
    pub fn finalization(phase: impl Into<String>, source: Error) -> Self {
        Self::Finalization {
            phase: phase.into(),
            source: Box::new(source),
        }
    }

    /// Create a timeout error for a resource
    pub fn timeout(id: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            id: id.into(),
            after,
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Returns true if the resource record was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Returns true if the update lost an optimistic-concurrency race
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    /// Check if this error is retryable
    ///
    /// Store conflicts, timeouts and transport failures resolve on their own.
    /// Serialization errors and permanent adapter rejections need a fix to
    /// the spec or the code before a retry can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::NotFound { .. } => true,
            Error::Conflict { .. } => true,
            Error::Adapter { retryable, .. } => *retryable,
            Error::Serialization { .. } => false,
            Error::Finalization { source, .. } => source.is_retryable(),
            Error::Timeout { .. } => true,
            Error::Internal { .. } => true,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // Story Tests: Error classification during reconciliation
    // ==========================================================================

    /// Story: A resource deleted between trigger and load is reported as not-found
    #[test]
    fn story_vanished_resource_is_not_found() {
        let err = Error::not_found("ObjectBucket", "default/photos");
        assert!(err.is_not_found());
        assert!(!err.is_conflict());
        assert_eq!(err.to_string(), "ObjectBucket default/photos not found");
    }

    /// Story: Losing a write race surfaces as a conflict that will be retried
    #[test]
    fn story_stale_write_is_conflict() {
        let err = Error::conflict("ObjectBucket", "default/photos");
        assert!(err.is_conflict());
        assert!(err.is_retryable());
        assert!(err.to_string().contains("has been modified"));
    }

    /// Story: Storage API outages are retried, rejections are not
    #[test]
    fn story_adapter_errors_carry_retryability() {
        let outage = Error::adapter("create", "503 Service Unavailable");
        assert!(outage.is_retryable());
        assert!(outage.to_string().contains("during create"));

        let rejected = Error::adapter_permanent("create", "400 invalid storage class");
        assert!(!rejected.is_retryable());
    }

    /// Story: A failed cleanup names the phase and keeps the cause's retryability
    #[test]
    fn story_finalization_wraps_phase_error() {
        let err = Error::finalization("ResourceAllocator", Error::adapter("delete", "timeout"));
        assert!(err.to_string().contains("ResourceAllocator"));
        assert!(err.to_string().contains("timeout"));
        assert!(err.is_retryable());

        let err = Error::finalization(
            "ResourceAllocator",
            Error::adapter_permanent("delete", "forbidden"),
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_timeout_is_retryable() {
        let err = Error::timeout("default/photos", Duration::from_secs(60));
        assert!(err.is_retryable());
        assert!(err.to_string().contains("default/photos"));
    }

    #[test]
    fn test_serialization_from_serde_json() {
        let err: Error = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, Error::Serialization { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_internal_error_default_context() {
        let err = Error::internal("unexpected state");
        assert!(err.to_string().contains("[unknown]"));

        let err = Error::internal_with_context("reconciler", "unexpected state");
        assert!(err.to_string().contains("[reconciler]"));
    }
}
