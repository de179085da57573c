/// Error codes the upstream signals inside otherwise well-formed frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorCode {
    /// Content or account blocked; retryable a bounded number of times.
    Blocked,
    /// Quota exhausted on the active credential.
    RateLimitExceeded,
    /// Credential rejected.
    Unauthorized,
    /// Output withheld by the upstream moderation layer.
    Moderated,
    Other,
}

impl UpstreamErrorCode {
    #[must_use]
    pub fn from_wire(code: &str) -> Self {
        match code {
            "blocked" | "nsfw_filtered" => UpstreamErrorCode::Blocked,
            "rate_limit_exceeded" => UpstreamErrorCode::RateLimitExceeded,
            "unauthorized" | "invalid_token" => UpstreamErrorCode::Unauthorized,
            "moderated" => UpstreamErrorCode::Moderated,
            _ => UpstreamErrorCode::Other,
        }
    }
}

/// Canonical error type used across all modules.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Upstream error ({code:?}): {message}")]
    Upstream {
        code: UpstreamErrorCode,
        message: String,
    },
    #[error("Stream idle for {idle_secs}s with no upstream data")]
    IdleTimeout { idle_secs: u64 },
    #[error("No usable credential available")]
    NoCredential,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AdapterError {
    pub fn upstream(code: UpstreamErrorCode, message: impl Into<String>) -> Self {
        AdapterError::Upstream {
            code,
            message: message.into(),
        }
    }

    /// Upstream code carried by this error, if it is upstream-signaled.
    #[must_use]
    pub fn upstream_code(&self) -> Option<UpstreamErrorCode> {
        match self {
            AdapterError::Upstream { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether the session-level retry loop may try again with another
    /// attempt (possibly after rotating credentials).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            AdapterError::Upstream { code, .. } => matches!(
                code,
                UpstreamErrorCode::Blocked
                    | UpstreamErrorCode::RateLimitExceeded
                    | UpstreamErrorCode::Unauthorized
            ),
            AdapterError::Transport(_) | AdapterError::IdleTimeout { .. } => true,
            _ => false,
        }
    }
}

impl From<serde_yaml::Error> for AdapterError {
    fn from(err: serde_yaml::Error) -> Self {
        AdapterError::Config(err.to_string())
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        AdapterError::Transport(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for AdapterError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        AdapterError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_codes_map_to_categories() {
        assert_eq!(
            UpstreamErrorCode::from_wire("blocked"),
            UpstreamErrorCode::Blocked
        );
        assert_eq!(
            UpstreamErrorCode::from_wire("rate_limit_exceeded"),
            UpstreamErrorCode::RateLimitExceeded
        );
        assert_eq!(
            UpstreamErrorCode::from_wire("unauthorized"),
            UpstreamErrorCode::Unauthorized
        );
        assert_eq!(
            UpstreamErrorCode::from_wire("something_else"),
            UpstreamErrorCode::Other
        );
    }

    #[test]
    fn retryability_follows_code() {
        assert!(AdapterError::upstream(UpstreamErrorCode::Blocked, "x").is_retryable());
        assert!(AdapterError::Transport("reset".into()).is_retryable());
        assert!(!AdapterError::upstream(UpstreamErrorCode::Moderated, "x").is_retryable());
        assert!(!AdapterError::Protocol("bad frame".into()).is_retryable());
    }
}
