//! Error types for the MCP launcher

use thiserror::Error;

/// Main error type for the MCP launcher
#[derive(Error, Debug)]
pub enum LauncherError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Credential error: {0}")]
    CredentialError(String),

    #[error("GCP error: {0}")]
    GcpError(String),

    #[error("Agent error: {0}")]
    AgentError(String),

    #[error("MCP error: {0}")]
    McpError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for LauncherError {
    fn from(err: anyhow::Error) -> Self {
        LauncherError::Internal(err.to_string())
    }
}
