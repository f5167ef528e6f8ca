use thiserror::Error;

/// Failures surfaced by a [`super::GenerationClient`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Authentication failed ({status}): {message}")]
    Auth { status: u16, message: String },
    #[error("Rate limited by provider: {message}")]
    RateLimited {
        /// Seconds, from the provider's `Retry-After` header.
        retry_after: Option<u64>,
        message: String,
    },
    #[error("Model '{model}' not found: {message}")]
    ModelNotFound { model: String, message: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Provider returned HTTP {status}: {message}")]
    Provider { status: u16, message: String },
    #[error("Response exceeded {limit} bytes")]
    ResponseTooLarge { limit: usize },
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
    #[error("Ollama Cloud is not configured (missing OLLAMA_CLOUD_API_KEY)")]
    NotConfigured,
}

impl GenerationError {
    pub fn code(&self) -> &'static str {
        match self {
            GenerationError::Auth { .. } => "AUTH_ERROR",
            GenerationError::RateLimited { .. } => "RATE_LIMITED",
            GenerationError::ModelNotFound { .. } => "MODEL_NOT_FOUND",
            GenerationError::Network(_) => "NETWORK_ERROR",
            GenerationError::Provider { .. } => "PROVIDER_ERROR",
            GenerationError::ResponseTooLarge { .. } => "RESPONSE_TOO_LARGE",
            GenerationError::InvalidResponse(_) => "INVALID_RESPONSE",
            GenerationError::NotConfigured => "NOT_CONFIGURED",
        }
    }

    /// Errors worth retrying inside the client.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GenerationError::Network(_) | GenerationError::RateLimited { .. }
        )
    }

    /// Errors that cannot succeed on any retry with the same configuration.
    pub fn is_terminal_provider(&self) -> bool {
        matches!(
            self,
            GenerationError::Auth { .. }
                | GenerationError::ModelNotFound { .. }
                | GenerationError::NotConfigured
        )
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            GenerationError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GenerationError::Network(format!("request timed out: {err}"))
        } else if err.is_connect() || err.is_request() {
            GenerationError::Network(err.to_string())
        } else if err.is_decode() || err.is_body() {
            GenerationError::InvalidResponse(err.to_string())
        } else {
            GenerationError::Network(err.to_string())
        }
    }
}
