/// Errors from property store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend answered with a status the caller did not expect.
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response arrived but could not be understood.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The task handle does not refer to a known task.
    #[error("unknown task: {0}")]
    TaskNotFound(String),

    /// The backend itself is unusable (e.g. a poisoned lock).
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
