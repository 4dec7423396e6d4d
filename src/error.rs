//! Error types for the multi-agent assistant

use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, AssistantError>;

#[derive(Error, Debug)]
pub enum AssistantError {

    // =============================
    // Request Errors
    // =============================

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    // =============================
    // Upstream Errors
    // =============================

    #[error("Missing or invalid credential: {0}")]
    MissingCredential(String),

    #[error("Rate limited by {0}")]
    RateLimited(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Tool error: {0}")]
    ToolError(String),

    #[error("Agent error: {0}")]
    AgentError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AssistantError {
    /// Whether the failure was caused by the caller rather than an upstream service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AssistantError::InvalidQuery(_) | AssistantError::InvalidToolInput(_)
        )
    }
}
