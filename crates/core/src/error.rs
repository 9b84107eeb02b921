//! Error types for kbase.
//!
//! One error enum covers the retrieval taxonomy (bad input, missing session,
//! unknown article, failed external generation) and the ambient failures of
//! configuration, storage, prompts and I/O.

use thiserror::Error;

/// Unified error type for kbase.
///
/// All fallible functions return `Result<T, AppError>`. The transport layer
/// uses [`AppError::status_code`] and [`AppError::public_message`] so callers
/// can tell transient failures from permanent ones.
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or empty required field, malformed request body
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Caller has no valid session context
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Referenced article or record does not exist (or lacks an embedding)
    #[error("Not found: {0}")]
    NotFound(String),

    /// External embedding/answer/classification service failed or timed out
    #[error("Generation failure: {0}")]
    Generation(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Article or record store errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "invalid_input",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::NotFound(_) => "not_found",
            AppError::Generation(_) => "generation_failure",
            _ => "internal",
        }
    }

    /// HTTP-style status classification.
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::InvalidInput(_) => 400,
            AppError::Unauthorized(_) => 401,
            AppError::NotFound(_) => 404,
            AppError::Generation(_) => 503,
            _ => 500,
        }
    }

    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Generation(_))
    }

    /// Short message safe to show to end users.
    ///
    /// Input and lookup errors carry their own detail; everything else is
    /// collapsed into a fixed sentence.
    pub fn public_message(&self) -> String {
        match self {
            AppError::InvalidInput(msg) | AppError::NotFound(msg) => msg.clone(),
            AppError::Unauthorized(_) => "unauthorized".to_string(),
            AppError::Generation(_) => "service unavailable, try again".to_string(),
            _ => "internal error".to_string(),
        }
    }

    /// JSON body returned to callers: `{error, kind, transient}`.
    pub fn to_body(&self) -> serde_json::Value {
        serde_json::json!({
            "error": self.public_message(),
            "kind": self.kind(),
            "transient": self.is_transient(),
        })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::InvalidInput("x".into()).status_code(), 400);
        assert_eq!(AppError::Unauthorized("x".into()).status_code(), 401);
        assert_eq!(AppError::NotFound("x".into()).status_code(), 404);
        assert_eq!(AppError::Generation("x".into()).status_code(), 503);
        assert_eq!(AppError::Storage("x".into()).status_code(), 500);
    }

    #[test]
    fn test_transient_only_for_generation() {
        assert!(AppError::Generation("timeout".into()).is_transient());
        assert!(!AppError::InvalidInput("query is required".into()).is_transient());
        assert!(!AppError::NotFound("article".into()).is_transient());
    }

    #[test]
    fn test_body() {
        let body = AppError::Generation("model not loaded".into()).to_body();
        assert_eq!(body["error"], "service unavailable, try again");
        assert_eq!(body["kind"], "generation_failure");
        assert_eq!(body["transient"], true);

        let body = AppError::InvalidInput("query is required".into()).to_body();
        assert_eq!(body["error"], "query is required");
        assert_eq!(body["transient"], false);
    }

    #[test]
    fn test_public_message_hides_internals() {
        let err = AppError::Generation("connection refused to 10.0.0.3".into());
        assert_eq!(err.public_message(), "service unavailable, try again");

        let err = AppError::Storage("disk I/O error".into());
        assert_eq!(err.public_message(), "internal error");

        let err = AppError::InvalidInput("query is required".into());
        assert_eq!(err.public_message(), "query is required");
    }
}
