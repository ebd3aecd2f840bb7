use thiserror::Error;

/// Errors surfaced by a judge call
///
/// Everything that goes wrong while running a submission is folded into the
/// report; only a request the engine cannot act on is rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JudgeError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl JudgeError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        JudgeError::InvalidRequest(reason.into())
    }
}
