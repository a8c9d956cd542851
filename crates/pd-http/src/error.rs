use thiserror::Error;

/// Errors building or configuring the HTTP backend.
///
/// Request-level failures surface through the store and field error types
/// instead.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("http client error: {0}")]
    Client(#[from] reqwest::Error),
}

pub type HttpResult<T> = Result<T, HttpError>;

pub(crate) fn transport(e: reqwest::Error) -> pd_store::StoreError {
    pd_store::StoreError::Transport(e.to_string())
}

pub(crate) fn field_transport(e: reqwest::Error) -> pd_commit::FieldError {
    pd_commit::FieldError::Transport(e.to_string())
}
