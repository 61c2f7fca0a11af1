use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EtlError {
    #[error("HTTP {status} while fetching {what}")]
    Http { status: StatusCode, what: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Load job {job_id} failed: {message}")]
    LoadJob { job_id: String, message: String },
}

impl From<reqwest::Error> for EtlError {
    fn from(err: reqwest::Error) -> Self {
        EtlError::Network(err.to_string())
    }
}

impl From<reqwest_middleware::Error> for EtlError {
    fn from(err: reqwest_middleware::Error) -> Self {
        EtlError::Network(err.to_string())
    }
}

// Common result type alias
pub type EtlResult<T> = Result<T, EtlError>;
