use thiserror::Error;

/// Failure of a single provider adapter call.
///
/// Transient failures (rate limits, timeouts, 5xx, exhausted quota) may be
/// retried with backoff; permanent ones (bad credentials, malformed query)
/// must not be.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("transient provider failure: {0}")]
    Transient(String),

    #[error("permanent provider failure: {0}")]
    Permanent(String),

    #[error("provider quota exhausted: {0}")]
    QuotaExceeded(String),
}

impl ProviderError {
    /// Whether the orchestrator is allowed to retry this failure.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Transient(_) | ProviderError::QuotaExceeded(_)
        )
    }

    /// Classify an HTTP transport error from reqwest.
    pub fn from_http(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            return ProviderError::Transient(err.to_string());
        }
        match err.status() {
            Some(status) if status.is_server_error() => {
                ProviderError::Transient(err.to_string())
            }
            Some(status) if status.as_u16() == 429 => {
                ProviderError::Transient(err.to_string())
            }
            Some(_) => ProviderError::Permanent(err.to_string()),
            None => ProviderError::Transient(err.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("all providers failed for request")]
    AllProvidersFailed,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ResolveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_exceeded_counts_as_transient() {
        assert!(ProviderError::QuotaExceeded("daily cap".into()).is_transient());
        assert!(ProviderError::Transient("503".into()).is_transient());
        assert!(!ProviderError::Permanent("bad key".into()).is_transient());
    }
}
