//! Store error type and result alias.

use thiserror::Error;

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying `SQLite` failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool failure.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// JSON (de)serialization failure on a stored payload.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A uniqueness constraint was violated.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// The requested row does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind (table).
        entity: &'static str,
        /// Requested id.
        id: String,
    },
}

impl StoreError {
    /// Whether the underlying error is a `SQLite` unique-constraint violation.
    #[must_use]
    pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
        matches!(
            err,
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

impl From<StoreError> for maestro_core::MaestroError {
    fn from(err: StoreError) -> Self {
        Self::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = StoreError::NotFound {
            entity: "deployment",
            id: "dep-1".into(),
        };
        assert_eq!(err.to_string(), "deployment dep-1 not found");
    }

    #[test]
    fn converts_to_maestro_error() {
        let err = StoreError::Constraint("endpoint_path taken".into());
        let core: maestro_core::MaestroError = err.into();
        assert_eq!(core.kind(), "StorageError");
    }
}
