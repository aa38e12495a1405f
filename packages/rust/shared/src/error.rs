//! Error types for ResearchFlow.
//!
//! Library crates use [`ResearchFlowError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all ResearchFlow operations.
#[derive(Debug, thiserror::Error)]
pub enum ResearchFlowError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level HTTP failure talking to a hosted service.
    #[error("network error: {0}")]
    Network(String),

    /// A hosted service answered, but with an error or an unusable payload.
    #[error("provider error: {0}")]
    Provider(String),

    /// Parsing error for model or service output.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input validation error (blank topic, dimension mismatch, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A pipeline stage could not produce its result.
    #[error("stage `{stage}` failed: {message}")]
    Stage { stage: String, message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ResearchFlowError>;

impl ResearchFlowError {
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

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a stage error tagged with the stage name.
    pub fn stage(stage: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
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
        let err = ResearchFlowError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = ResearchFlowError::validation("topic must not be blank");
        assert!(err.to_string().contains("topic must not be blank"));
    }

    #[test]
    fn stage_error_names_the_stage() {
        let err = ResearchFlowError::stage("rag_answering_task", "embedding count mismatch");
        assert_eq!(
            err.to_string(),
            "stage `rag_answering_task` failed: embedding count mismatch"
        );
    }
}
