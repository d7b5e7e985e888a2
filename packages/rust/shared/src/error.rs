//! Error types for gobracket.
//!
//! Library crates use [`GoBracketError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all gobracket operations.
#[derive(Debug, thiserror::Error)]
pub enum GoBracketError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level failure (connection, TLS, timeout). Never retried.
    #[error("network error: {0}")]
    Network(String),

    /// The API kept answering 429 until the retry budget ran out.
    #[error("retries exhausted for {url} after {attempts} throttled attempts")]
    RetriesExhausted { url: String, attempts: u32 },

    /// Response body was not JSON or did not match the expected record shape.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Template markup missing or unusable.
    #[error("template error: {message}")]
    Template { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Invalid input (bad URL, bad query string, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, GoBracketError>;

impl GoBracketError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a template error from any displayable message.
    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = GoBracketError::config("missing base_url");
        assert_eq!(err.to_string(), "config error: missing base_url");

        let err = GoBracketError::RetriesExhausted {
            url: "https://online-go.com/api/v1/players".into(),
            attempts: 20,
        };
        assert!(err.to_string().contains("after 20 throttled attempts"));
    }
}
