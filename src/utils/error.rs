use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a response body could not be turned into a value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParseFailureKind {
    NoPriceFound,
    MalformedResponse,
}

impl std::fmt::Display for ParseFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseFailureKind::NoPriceFound => write!(f, "no price found"),
            ParseFailureKind::MalformedResponse => write!(f, "malformed response"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthFailureKind {
    InvalidCredentials,
    Expired,
    Revoked,
}

impl std::fmt::Display for AuthFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthFailureKind::InvalidCredentials => write!(f, "invalid credentials"),
            AuthFailureKind::Expired => write!(f, "expired"),
            AuthFailureKind::Revoked => write!(f, "revoked"),
        }
    }
}

/// Coarse failure classification carried in run summaries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Fetch,
    Parse,
    Auth,
    RateLimited,
    Connectivity,
    Storage,
    Internal,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("fetch failed with status {status}")]
    Fetch { status: u16, body: Option<String> },

    #[error("parse failure: {0}")]
    Parse(ParseFailureKind),

    #[error("auth failure: {0}")]
    Auth(AuthFailureKind),

    #[error("rate limited")]
    RateLimited { retry_after: Option<u64> },

    #[error("connectivity error: {0}")]
    Connectivity(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the orchestrator may retry the failed operation.
    ///
    /// Transient: connectivity, rate limiting, upstream 5xx. Everything else
    /// (auth rejection, other 4xx, parse failures) fails fast.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Connectivity(_) => true,
            AppError::RateLimited { .. } => true,
            AppError::Fetch { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, AppError::Auth(_))
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            AppError::Fetch { .. } => FailureKind::Fetch,
            AppError::Parse(_) => FailureKind::Parse,
            AppError::Auth(_) => FailureKind::Auth,
            AppError::RateLimited { .. } => FailureKind::RateLimited,
            AppError::Connectivity(_) => FailureKind::Connectivity,
            AppError::Database(_) => FailureKind::Storage,
            AppError::Config(_) | AppError::Validation(_) | AppError::Internal(_) => {
                FailureKind::Internal
            }
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AppError::Parse(ParseFailureKind::MalformedResponse)
        } else {
            // Timeouts, connection refusals, DNS failures and the rest of the
            // transport layer all count as connectivity problems.
            AppError::Connectivity(err.to_string())
        }
    }
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
