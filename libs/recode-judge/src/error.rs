//! Failure taxonomy for the execution client.
//!
//! Transport and protocol errors propagate to the orchestrators unchanged.
//! Language resolution never fails outward, so it has no variant here.

use recode_common::types::ExecutionToken;
use std::time::Duration;
use thiserror::Error;

/// Longest slice of a rejected response body kept in the error
pub const MAX_ERROR_BODY_CHARS: usize = 300;

#[derive(Error, Debug)]
pub enum JudgeError {
    /// Could not reach the backend (connect refused, DNS, timeout)
    #[error("transport failure calling {target} after {attempts} attempt(s): {cause}")]
    Transport {
        target: String,
        cause: String,
        attempts: u32,
        connect: bool,
    },

    /// The backend answered with a non-success status
    #[error("backend rejected {target} with status {status}: {body}")]
    BackendRejection {
        target: String,
        status: u16,
        body: String,
    },

    /// The backend answered but the body is unusable
    #[error("malformed response from {target}: {reason}")]
    MalformedResponse { target: String, reason: String },

    /// Deadline elapsed before every job reached a terminal status
    #[error("timed out after {}ms with {} submission(s) still pending", elapsed.as_millis(), pending.len())]
    PollTimeout {
        pending: Vec<ExecutionToken>,
        elapsed: Duration,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("client configuration error: {0}")]
    Configuration(String),
}

pub type JudgeResult<T> = std::result::Result<T, JudgeError>;

impl JudgeError {
    pub fn rejection(target: impl Into<String>, status: u16, body: &str) -> Self {
        JudgeError::BackendRejection {
            target: target.into(),
            status,
            body: truncate_body(body),
        }
    }

    pub fn malformed(target: impl Into<String>, reason: impl Into<String>) -> Self {
        JudgeError::MalformedResponse {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Only failures to establish a connection are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, JudgeError::Transport { connect: true, .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, JudgeError::PollTimeout { .. })
    }

    /// Tokens still unresolved when a deadline fired
    pub fn pending_tokens(&self) -> &[ExecutionToken] {
        match self {
            JudgeError::PollTimeout { pending, .. } => pending,
            _ => &[],
        }
    }
}

pub(crate) fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        return body.to_string();
    }
    let mut cut: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    cut.push('…');
    cut
}
