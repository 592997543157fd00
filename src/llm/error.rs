use thiserror::Error;

/// Failure taxonomy for inference calls. The backoff executor retries only
/// what [`InferenceError::is_retryable`] admits; everything else fails the
/// attempt immediately.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Circuit breaker refused the call. Not a backend failure: callers
    /// treat this as a deferred failure and must not count it against
    /// retries or the breaker itself.
    #[error("circuit breaker is open, refusing call")]
    BreakerOpen,

    #[error("inference backend rate limited the request")]
    RateLimited,

    #[error("inference backend returned http status {0}")]
    Status(u16),

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    /// The completion arrived but was not the JSON we asked for.
    #[error("malformed completion: {0}")]
    MalformedCompletion(String),

    #[error("completion is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl InferenceError {
    pub fn is_retryable(&self) -> bool {
        match self {
            InferenceError::RateLimited | InferenceError::Timeout => true,
            InferenceError::Status(code) => matches!(code, 502 | 503 | 504),
            InferenceError::Transport(_) => true,
            InferenceError::BreakerOpen
            | InferenceError::MalformedCompletion(_)
            | InferenceError::Json(_) => false,
        }
    }
}

impl From<reqwest::Error> for InferenceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            InferenceError::Timeout
        } else if let Some(status) = e.status() {
            if status.as_u16() == 429 {
                InferenceError::RateLimited
            } else {
                InferenceError::Status(status.as_u16())
            }
        } else {
            InferenceError::Transport(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(InferenceError::Timeout.is_retryable());
        assert!(InferenceError::RateLimited.is_retryable());
        assert!(InferenceError::Status(503).is_retryable());
        assert!(InferenceError::Status(502).is_retryable());
        assert!(InferenceError::Transport("reset".into()).is_retryable());

        assert!(!InferenceError::Status(400).is_retryable());
        assert!(!InferenceError::BreakerOpen.is_retryable());
        assert!(!InferenceError::MalformedCompletion("not json".into()).is_retryable());
    }
}
