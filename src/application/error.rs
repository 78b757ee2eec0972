use thiserror::Error;

use crate::domain::{UserId, ValidationError};

/// Coarse classification of an `AppError`, for callers deciding whether a
/// resubmission makes sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Conflict,
    Unavailable,
    Internal,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Concurrent updates to business {business_id} kept conflicting after {attempts} attempts")]
    Conflict { business_id: UserId, attempts: u32 },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InvalidInput(_) => ErrorKind::InvalidInput,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Conflict { .. } => ErrorKind::Conflict,
            AppError::Unavailable(_) => ErrorKind::Unavailable,
            AppError::Database(_) => ErrorKind::Internal,
        }
    }

    /// Transient failures the caller may resubmit.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Conflict | ErrorKind::Unavailable)
    }

    /// Sort a storage failure into connectivity problems and everything else.
    pub(crate) fn from_storage(err: anyhow::Error) -> Self {
        let connectivity = err.chain().any(|cause| {
            matches!(
                cause.downcast_ref::<sqlx::Error>(),
                Some(sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_))
            )
        });

        if connectivity {
            AppError::Unavailable(format!("{:#}", err))
        } else {
            AppError::Database(err)
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::InvalidInput(err.to_string())
    }
}
