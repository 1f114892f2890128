use thiserror::Error;

/// Storage-specific error types for the rollcall engine.
///
/// These errors represent failures in database operations and in converting
/// stored rows back into domain types. At crate boundaries they convert into
/// [`rollcall_core::Error`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection or query execution failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration execution failed
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Entity not found in database
    #[error("Entity not found: {entity_type} with {field}={value}")]
    NotFound {
        entity_type: String,
        field: String,
        value: String,
    },

    /// An unfinished enrollment session already exists for the pair
    #[error("Active enrollment already exists for device {device_id}, subject {subject_id}")]
    ActiveEnrollment {
        device_id: String,
        subject_id: String,
    },

    /// Stored data failed domain validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialized column could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl StorageError {
    /// Returns `true` if the underlying database error is a UNIQUE violation.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        match self {
            StorageError::Database(sqlx::Error::Database(db)) => db.is_unique_violation(),
            _ => false,
        }
    }
}

impl From<rollcall_core::Error> for StorageError {
    fn from(err: rollcall_core::Error) -> Self {
        StorageError::Validation(err.to_string())
    }
}

impl From<StorageError> for rollcall_core::Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ActiveEnrollment {
                device_id,
                subject_id,
            } => rollcall_core::Error::Conflict {
                device_id,
                subject_id,
            },
            StorageError::Validation(msg) => rollcall_core::Error::Validation(msg),
            StorageError::Configuration(msg) => rollcall_core::Error::Config(msg),
            other => rollcall_core::Error::Storage(other.to_string()),
        }
    }
}

/// Specialized result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_enrollment_maps_to_conflict() {
        let err: rollcall_core::Error = StorageError::ActiveEnrollment {
            device_id: "D1".into(),
            subject_id: "S1".into(),
        }
        .into();
        assert!(matches!(err, rollcall_core::Error::Conflict { .. }));
    }

    #[test]
    fn test_other_errors_map_to_storage() {
        let err: rollcall_core::Error = StorageError::NotFound {
            entity_type: "device".into(),
            field: "id".into(),
            value: "D9".into(),
        }
        .into();
        assert!(matches!(err, rollcall_core::Error::Storage(_)));
        assert!(!err.is_retryable());
    }
}
