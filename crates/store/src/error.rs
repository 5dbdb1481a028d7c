use thiserror::Error;

/// PostgreSQL `serialization_failure`.
const SERIALIZATION_FAILURE: &str = "40001";
/// PostgreSQL `deadlock_detected`.
const DEADLOCK_DETECTED: &str = "40P01";
/// PostgreSQL integrity constraint violation class.
const INTEGRITY_CONSTRAINT_CLASS: &str = "23";
/// PostgreSQL `read_only_sql_transaction`.
const READ_ONLY_SQL_TRANSACTION: &str = "25006";

/// Errors that can occur when interacting with the store.
///
/// These are infrastructure failures. Business rule violations are
/// reported by the domain layer, never through this type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The transaction lost a race with a concurrent transaction
    /// (serialization failure or deadlock). Safe to retry.
    #[error("Transaction conflict: {0}")]
    Conflict(String),

    /// The store could not be reached or the pool is exhausted.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A write violated a schema constraint or was attempted in a
    /// read-only transaction.
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// A stored value could not be decoded.
    #[error("Corrupted record: {0}")]
    Corrupted(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true if the failure is transient and the caller may retry
    /// the whole operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Conflict(_) | StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let code = db_err.code().map(|c| c.into_owned());
            let message = db_err.message().to_string();
            match code.as_deref() {
                Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED) => {
                    return StoreError::Conflict(message);
                }
                Some(READ_ONLY_SQL_TRANSACTION) => {
                    return StoreError::Constraint(message);
                }
                Some(c) if c.starts_with(INTEGRITY_CONSTRAINT_CLASS) => {
                    return StoreError::Constraint(message);
                }
                _ => {}
            }
        }

        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Corrupted(err.to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
