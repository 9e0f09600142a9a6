use sea_orm::error::{DbErr, SqlErr};
use serde::Serialize;

use crate::entities::enums::DocumentType;

/// Stable, machine-readable classification of a [`ServiceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    NotFound,
    Conflict,
    ConcurrentModification,
    InvalidTransition,
    InvariantViolation,
    CreditLimitExceeded,
    TenantContextMissing,
    DatabaseError,
    InternalError,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid field `{field}`: {message}")]
    InvalidField { field: String, message: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("Invalid transition for {document}: {from} -> {to}")]
    InvalidTransition {
        document: DocumentType,
        from: String,
        to: String,
    },

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Credit limit exceeded: {0}")]
    CreditLimitExceeded(String),

    #[error("Tenant context missing: {0}")]
    TenantContextMissing(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

pub trait IntoDbErr {
    fn into_db_err(self) -> DbErr;
}

impl IntoDbErr for DbErr {
    fn into_db_err(self) -> DbErr {
        self
    }
}

impl IntoDbErr for String {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self)
    }
}

impl IntoDbErr for &str {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self.to_string())
    }
}

/// Substrings the SQLite and Postgres drivers use for transient lock failures.
const TRANSIENT_DB_MESSAGES: [&str; 4] = [
    "database is locked",
    "could not serialize access",
    "deadlock detected",
    "database table is locked",
];

impl ServiceError {
    /// Normalizes any supported database error input.
    ///
    /// Unique-constraint violations surface as [`ServiceError::Conflict`] so that
    /// duplicate codes and document numbers carry a stable kind.
    pub fn db_error<E: IntoDbErr>(error: E) -> Self {
        let err = error.into_db_err();
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(detail)) => {
                ServiceError::Conflict(format!("duplicate key: {}", detail))
            }
            _ => ServiceError::DatabaseError(err),
        }
    }

    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        ServiceError::InvalidField {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::ValidationError(_) | ServiceError::InvalidField { .. } => {
                ErrorKind::ValidationError
            }
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::Conflict(_) => ErrorKind::Conflict,
            ServiceError::ConcurrentModification(_) => ErrorKind::ConcurrentModification,
            ServiceError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            ServiceError::InvariantViolation(_) => ErrorKind::InvariantViolation,
            ServiceError::CreditLimitExceeded(_) => ErrorKind::CreditLimitExceeded,
            ServiceError::TenantContextMissing(_) => ErrorKind::TenantContextMissing,
            ServiceError::DatabaseError(_) => ErrorKind::DatabaseError,
            ServiceError::InternalError(_) | ServiceError::Other(_) => ErrorKind::InternalError,
        }
    }

    /// Whether re-running the whole transaction may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::ConcurrentModification(_) => true,
            ServiceError::DatabaseError(err) => {
                let message = err.to_string().to_ascii_lowercase();
                TRANSIENT_DB_MESSAGES
                    .iter()
                    .any(|fragment| message.contains(fragment))
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable_codes() {
        assert_eq!(
            ServiceError::NotFound("x".into()).kind().to_string(),
            "not_found"
        );
        assert_eq!(
            ServiceError::invalid_field("quantity", "must be positive")
                .kind()
                .as_ref(),
            "validation_error"
        );
        let transition = ServiceError::InvalidTransition {
            document: DocumentType::SalesOrder,
            from: "DRAFT".into(),
            to: "COMPLETED".into(),
        };
        assert_eq!(transition.kind(), ErrorKind::InvalidTransition);
        assert_eq!(
            transition.to_string(),
            "Invalid transition for SALES_ORDER: DRAFT -> COMPLETED"
        );
    }

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(ServiceError::ConcurrentModification("row".into()).is_retryable());
        assert!(ServiceError::db_error("database is locked").is_retryable());
        assert!(!ServiceError::db_error("syntax error").is_retryable());
        assert!(!ServiceError::Conflict("dup".into()).is_retryable());
        assert!(!ServiceError::InvariantViolation("neg".into()).is_retryable());
    }
}
