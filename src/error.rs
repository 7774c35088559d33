use thiserror::Error;

/// Application-wide error types.
///
/// The first six variants are the rejection taxonomy of the workflow engine;
/// every one of them is a refused operation, never a crash.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing mandatory reason, empty content, malformed input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Edge not in the status graph, or status changed underneath the caller.
    #[error("Invalid transition: {0}")]
    TransitionInvalid(String),

    /// Insufficient role/permission, or an actor targeting their own record.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Would leave zero or two primaries of a family.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Lost a storage-level race (version number, compare-and-swap), or a
    /// registration request resolved twice.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code for the error category.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::TransitionInvalid(_) => "TRANSITION_INVALID",
            AppError::Forbidden(_) => "AUTH_FORBIDDEN",
            AppError::InvariantViolation(_) => "INVARIANT_VIOLATION",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Auth(_) => "AUTH_REQUIRED",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Helper conversion from anyhow::Error
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}
