use crate::core::types::{ApiError, ErrorCode};
use thiserror::Error;

/// Failures raised below the converter layer: transport, configuration and
/// signing problems.
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Connection timeout: {0}")]
    ConnectionTimeout(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::core::config::ConfigError),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl ExchangeError {
    /// Canonical classification used when the error surfaces to a caller.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::HttpError(e) if e.is_timeout() => ErrorCode::Timeout,
            Self::HttpError(_) | Self::NetworkError(_) => ErrorCode::Network,
            Self::ConnectionTimeout(_) => ErrorCode::Timeout,
            Self::AuthError(_) => ErrorCode::Unauthorized,
            Self::ConfigError(_) | Self::ConfigurationError(_) => ErrorCode::WrongParam,
            Self::JsonError(_) | Self::ParseError(_) | Self::Other(_) => ErrorCode::Unknown,
        }
    }

    /// Transport failures may be retried by the caller; the rest may not.
    pub fn is_retryable(&self) -> bool {
        matches!(self.error_code(), ErrorCode::Network | ErrorCode::Timeout)
    }
}

impl From<ExchangeError> for ApiError {
    fn from(err: ExchangeError) -> Self {
        Self::new(err.error_code(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_are_classified() {
        let timeout = ExchangeError::ConnectionTimeout("handshake".to_string());
        assert_eq!(timeout.error_code(), ErrorCode::Timeout);
        assert!(timeout.is_retryable());

        let reset = ExchangeError::NetworkError("connection reset".to_string());
        let api: ApiError = reset.into();
        assert_eq!(api.error_code, ErrorCode::Network);
        assert!(api.message.contains("connection reset"));

        let parse = ExchangeError::ParseError("bad frame".to_string());
        assert!(!parse.is_retryable());
        assert_eq!(parse.error_code(), ErrorCode::Unknown);
    }
}
