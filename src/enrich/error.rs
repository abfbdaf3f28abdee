use std::time::Duration;

use thiserror::Error;

/// Why one inference request failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InferenceError {
    #[error("rate limit exceeded (429)")]
    RateLimited { retry_after: Option<Duration> },

    #[error("request timed out")]
    Timeout,

    #[error("connection error: {0}")]
    Connect(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("response parsing error: {0}")]
    Response(String),

    #[error("client error: {0}")]
    Client(String),

    #[error("max retries reached after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<InferenceError>,
    },
}

impl InferenceError {
    /// Rate limits and transient network failures are worth another try.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            InferenceError::RateLimited { .. } | InferenceError::Timeout | InferenceError::Connect(_)
        )
    }

    /// Status label stored next to the message in `parsing_error`.
    pub fn status_label(&self) -> String {
        match self {
            InferenceError::RateLimited { .. } => "429".to_string(),
            InferenceError::Api { status, .. } => status.to_string(),
            InferenceError::Response(_) => "200".to_string(),
            InferenceError::Timeout => "N/A - Timeout".to_string(),
            InferenceError::Connect(_) => "N/A - Connection Error".to_string(),
            InferenceError::Client(_) => "N/A - Client Error".to_string(),
            InferenceError::Exhausted { last, .. } => last.status_label(),
        }
    }
}

impl From<reqwest::Error> for InferenceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            InferenceError::Timeout
        } else if e.is_connect() {
            InferenceError::Connect(e.to_string())
        } else if e.is_decode() {
            InferenceError::Response(e.to_string())
        } else {
            InferenceError::Client(e.to_string())
        }
    }
}
