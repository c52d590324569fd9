use thiserror::Error;

/// Failures surface to the initiating client only; nothing broadcasts on
/// error.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("Poll not found")]
    PollNotFound,
    #[error("{0}")]
    InvalidState(&'static str),
    #[error("Poll has expired")]
    Expired,
    #[error("Storage error: {0}")]
    Persistence(String),
}

impl From<sqlx::Error> for SessionError {
    fn from(error: sqlx::Error) -> Self {
        SessionError::Persistence(error.to_string())
    }
}
