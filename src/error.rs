//! Error types for dbscope.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Store-level errors keep the driver's diagnostic (message and SQLSTATE) so callers
//! see exactly what the database reported.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Missing value for parameter '{name}'")]
    MissingParameter { name: String },

    #[error("Invalid transaction state: cannot {operation} while {state}")]
    InvalidTransactionState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("Connection acquisition failed: {message}")]
    ConnectionAcquisitionFailed { message: String, suggestion: String },

    #[error("Execution failed: {message}")]
    ExecutionFailed {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Release failed: {message}")]
    ReleaseFailed { message: String },

    /// The original error of a transaction, with the failure of the rollback that followed it.
    #[error("{error} (rollback also failed: {rollback_error})")]
    TransactionAborted {
        #[source]
        error: Box<DbError>,
        rollback_error: Box<DbError>,
    },

    #[error("Invalid configuration: {message}")]
    Configuration { message: String },

    #[error("Failed to decode row: {message}")]
    Decode { message: String },

    /// Business error raised from inside a transaction callback.
    #[error("{message}")]
    Application { message: String },
}

impl DbError {
    /// Create a missing parameter error.
    pub fn missing_parameter(name: impl Into<String>) -> Self {
        Self::MissingParameter { name: name.into() }
    }

    /// Create an invalid transaction state error.
    pub fn invalid_transaction_state(operation: &'static str, state: &'static str) -> Self {
        Self::InvalidTransactionState { operation, state }
    }

    /// Create a connection acquisition error with a helpful suggestion.
    pub fn acquisition(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConnectionAcquisitionFailed {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create an execution error with optional SQL state.
    pub fn execution(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::ExecutionFailed {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create a release error.
    pub fn release(message: impl Into<String>) -> Self {
        Self::ReleaseFailed {
            message: message.into(),
        }
    }

    /// Attach a rollback failure to the error that triggered the rollback.
    pub fn with_rollback_failure(self, rollback_error: DbError) -> Self {
        Self::TransactionAborted {
            error: Box::new(self),
            rollback_error: Box::new(rollback_error),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create an application error.
    pub fn application(message: impl Into<String>) -> Self {
        Self::Application {
            message: message.into(),
        }
    }

    /// The error that started it all, looking through attached rollback failures.
    pub fn primary(&self) -> &DbError {
        match self {
            Self::TransactionAborted { error, .. } => error.primary(),
            other => other,
        }
    }

    /// The rollback failure attached to this error, if any.
    pub fn rollback_error(&self) -> Option<&DbError> {
        match self {
            Self::TransactionAborted { rollback_error, .. } => Some(rollback_error),
            _ => None,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::ConnectionAcquisitionFailed { suggestion, .. } => Some(suggestion),
            Self::ExecutionFailed { suggestion, .. } => Some(suggestion),
            Self::TransactionAborted { error, .. } => error.suggestion(),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self.primary(), Self::ConnectionAcquisitionFailed { .. })
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::configuration(msg.to_string()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::execution(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::PoolTimedOut => DbError::acquisition(
                "Timed out waiting for a pooled connection",
                "Increase max_connections or acquire_timeout, or release clients sooner",
            ),
            sqlx::Error::PoolClosed => {
                DbError::acquisition("Connection pool is closed", "Create a new provider")
            }
            sqlx::Error::Io(io_err) => DbError::acquisition(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::acquisition(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::execution(
                format!("Protocol error: {}", msg),
                None,
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::decode(format!("column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::decode(source.to_string()),
            sqlx::Error::WorkerCrashed => DbError::execution(
                "Database worker crashed",
                None,
                "Retry with a fresh connection",
            ),
            other => DbError::execution(
                format!("Unknown database error: {}", other),
                None,
                "Inspect the driver error for details",
            ),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::missing_parameter("user_id");
        assert_eq!(err.to_string(), "Missing value for parameter 'user_id'");

        let err = DbError::invalid_transaction_state("commit", "idle");
        assert!(err.to_string().contains("cannot commit while idle"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::execution(
            "Syntax error",
            Some("42601".to_string()),
            "Check SQL syntax",
        );
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
        assert_eq!(DbError::release("closed").suggestion(), None);
    }

    #[test]
    fn test_error_retryable() {
        assert!(DbError::acquisition("timed out", "wait").is_retryable());
        assert!(!DbError::missing_parameter("id").is_retryable());
        assert!(!DbError::execution("bad", None, "fix").is_retryable());
    }

    #[test]
    fn test_rollback_failure_is_attached_not_substituted() {
        let original = DbError::application("insufficient funds");
        let err = original.with_rollback_failure(DbError::execution(
            "connection reset",
            None,
            "retry",
        ));

        assert!(matches!(err.primary(), DbError::Application { .. }));
        assert!(matches!(
            err.rollback_error(),
            Some(DbError::ExecutionFailed { .. })
        ));
        let msg = err.to_string();
        assert!(msg.starts_with("insufficient funds"));
        assert!(msg.contains("connection reset"));
    }

    #[test]
    fn test_sqlx_pool_timeout_maps_to_acquisition() {
        let err: DbError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, DbError::ConnectionAcquisitionFailed { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_sqlx_row_not_found_maps_to_execution() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DbError::ExecutionFailed { .. }));
    }
}
