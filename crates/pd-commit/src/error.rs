use thiserror::Error;

/// Errors from reading or writing the edited field.
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("issue not found: {0}")]
    NotFound(String),

    #[error("unexpected status {status} for {key}: {body}")]
    Status { key: String, status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

pub type FieldResult<T> = Result<T, FieldError>;

/// Why a single item of a batch was not committed.
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("field error: {0}")]
    Field(#[from] FieldError),

    #[error("lock error: {0}")]
    Lock(#[from] pd_lock::LockError),

    /// Locking needs the numeric id and the server did not report one.
    #[error("no numeric id known for {0}")]
    MissingEntityId(String),
}

pub type CommitResult<T> = Result<T, CommitError>;
