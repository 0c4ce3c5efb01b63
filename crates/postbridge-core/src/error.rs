use thiserror::Error;

use crate::phase::{Backend, MigrationPhase};

/// Canonical error type for the blog data layer and the migration tooling.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A backend could not be reached (connection refused, timeout, server selection).
    ///
    /// Aborts the current request or the current collection's migration pass.
    #[error("{backend} is unavailable: {message}")]
    BackendUnavailable {
        /// Backend that failed.
        backend: Backend,
        /// Driver-level details.
        message: String,
    },

    /// A phase name that is not one of the four recognized values.
    #[error("invalid migration phase `{value}` (expected one of: {expected})")]
    InvalidPhase {
        /// Rejected input.
        value: String,
        /// Comma-separated list of accepted names.
        expected: String,
    },

    /// Cleanup attempted before the application reads and writes Cassandra only.
    #[error("refusing to delete MongoDB data while phase is `{phase}`; set phase to `cassandra_only` first")]
    UnsafeCleanup {
        /// Phase in effect when cleanup was requested.
        phase: MigrationPhase,
    },

    /// A single document could not be transformed or written during bulk migration.
    #[error("document `{id}` in `{collection}` was not migrated: {message}")]
    PartialMigration {
        /// Source collection.
        collection: String,
        /// Offending document id (or a placeholder when the id itself is unreadable).
        id: String,
        /// Reason reported by the transform or the target store.
        message: String,
    },

    /// Entity was not found in a backend.
    #[error("{entity} `{id}` was not found")]
    NotFound {
        /// Entity type name (e.g. `"table"`).
        entity: &'static str,
        /// Identifier of the missing entity.
        id: String,
    },

    /// Validation error for caller input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Serialization or deserialization of a document failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Backend rejected an operation for a reason other than connectivity.
    #[error("storage error: {0}")]
    Storage(String),

    /// I/O error occurred while reading or writing local state.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected internal error occurred.
    #[error("internal error: {message}")]
    Internal {
        /// Human-readable details for debugging purposes.
        message: String,
    },
}

impl CoreError {
    /// Creates a `BackendUnavailable` variant.
    #[must_use]
    pub fn unavailable(backend: Backend, message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend,
            message: message.into(),
        }
    }

    /// Creates an `InvalidPhase` variant listing the accepted names.
    #[must_use]
    pub fn invalid_phase(value: impl Into<String>) -> Self {
        Self::InvalidPhase {
            value: value.into(),
            expected: MigrationPhase::ALL
                .iter()
                .map(MigrationPhase::as_str)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// Creates a `NotFound` variant.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Creates an `Internal` variant.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true when the error means the backend itself is unreachable.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::BackendUnavailable { .. })
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Convenient result alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_phase_lists_accepted_names() {
        let err = CoreError::invalid_phase("half_way");
        let message = err.to_string();
        assert!(message.contains("half_way"));
        assert!(message.contains("mongo_only, dual_write, read_cassandra, cassandra_only"));
    }

    #[test]
    fn test_unavailable_classification() {
        assert!(CoreError::unavailable(Backend::Cassandra, "timeout").is_unavailable());
        assert!(!CoreError::Storage("rejected".into()).is_unavailable());
    }

    #[test]
    fn test_unsafe_cleanup_message() {
        let err = CoreError::UnsafeCleanup {
            phase: MigrationPhase::DualWrite,
        };
        assert!(err.to_string().contains("dual_write"));
    }
}
