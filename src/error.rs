//! Error types for the LingoMarker engine
//!
//! This module provides the error taxonomy shared by every component using
//! thiserror for structured error definitions. `anyhow` is only used at the
//! binary edge.

use crate::config::ConfigError;
use thiserror::Error;

/// Main error type for LingoMarker operations
#[derive(Error, Debug)]
pub enum LingoError {
    /// Session missing or expired (HTTP 401)
    #[error("Unauthorized ({status})")]
    Unauthorized { status: u16 },

    /// Non-2xx response, optionally carrying the server's message
    #[error("Request failed ({status}){}", message_suffix(.message))]
    RequestFailed { status: u16, message: Option<String> },

    /// Transport failure or request timeout
    #[error("Network error or backend unreachable: {0}")]
    NetworkOrTimeout(String),

    /// No paragraph/URL context could be derived for a node
    #[error("Context unavailable: {0}")]
    ContextUnavailable(String),

    /// The remote store returned data that does not match the expected shape
    #[error("Invalid data shape: {0}")]
    InvalidDataShape(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Highlight pattern could not be compiled
    #[error("Invalid highlight pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Invalid operation (e.g., deleting an unknown entry)
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

fn message_suffix(message: &Option<String>) -> String {
    match message {
        Some(m) if !m.is_empty() => format!(": {}", m),
        _ => String::new(),
    }
}

/// Result type alias for LingoMarker operations
pub type Result<T> = std::result::Result<T, LingoError>;

impl From<reqwest::Error> for LingoError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LingoError::NetworkOrTimeout("Request timed out".to_string())
        } else if err.is_decode() {
            LingoError::InvalidDataShape(err.to_string())
        } else {
            LingoError::NetworkOrTimeout(err.to_string())
        }
    }
}

impl LingoError {
    /// True for 401 responses
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, LingoError::Unauthorized { .. })
    }

    /// Text shown in a blocking notification when a user-initiated action fails
    pub fn user_message(&self) -> String {
        match self {
            LingoError::Unauthorized { .. } => {
                "LingoMarker: Authentication error. Please log in again.".to_string()
            }
            LingoError::ContextUnavailable(_) => {
                "LingoMarker: Could not determine the context (paragraph/URL).".to_string()
            }
            LingoError::RequestFailed { message: Some(m), .. }
                if m.contains("API key not configured") =>
            {
                "LingoMarker: Failed to save the word. Please set your Gemini API key in the LingoMarker settings.".to_string()
            }
            LingoError::RequestFailed { message: Some(m), .. }
                if m.contains("Failed to retrieve word forms") =>
            {
                "LingoMarker: Failed to save the word. Could not get word forms from the API."
                    .to_string()
            }
            _ => "LingoMarker: Failed to save the word.".to_string(),
        }
    }
}
