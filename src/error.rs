//! Error types for the turn execution engine
//!
//! Only technical failures live here. A guardrail block is a terminal
//! *status*, not an error, and per-tool denials/failures are recorded in the
//! tool results — neither ever becomes an `EngineError`.

use crate::pipeline::TurnStage;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for turn execution
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Missing collaborator: {name}")]
    MissingCollaborator { name: &'static str },

    #[error("Generator returned an empty response")]
    GenerationEmpty,

    #[error("{stage} stage failed: {message}")]
    StageFailure { stage: TurnStage, message: String },

    #[error("Invocation cancelled before {stage}")]
    Cancelled { stage: TurnStage },

    #[error("Tool error: {0}")]
    ToolError(#[from] crate::tools::ToolError),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),
}

/// Error classification recorded in the performance ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingCollaborator,
    GenerationEmpty,
    StageFailure,
    Cancelled,
    Tool,
    Config,
}

impl EngineError {
    /// Create a stage failure from any collaborator or internal error
    pub fn stage_failure<S: Into<String>>(stage: TurnStage, message: S) -> Self {
        Self::StageFailure {
            stage,
            message: message.into(),
        }
    }

    /// Create a missing-collaborator error
    pub fn missing_collaborator(name: &'static str) -> Self {
        Self::MissingCollaborator { name }
    }

    /// Classify this error for ledger records
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::MissingCollaborator { .. } => ErrorKind::MissingCollaborator,
            EngineError::GenerationEmpty => ErrorKind::GenerationEmpty,
            EngineError::StageFailure { .. } => ErrorKind::StageFailure,
            EngineError::Cancelled { .. } => ErrorKind::Cancelled,
            EngineError::ToolError(_) => ErrorKind::Tool,
            EngineError::ConfigError(_) => ErrorKind::Config,
        }
    }
}

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").expect("secret pattern is valid")
});

static SENSITIVE_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
        .expect("path pattern is valid")
});

const MAX_RECORDED_MESSAGE_LEN: usize = 500;

/// Sanitize error messages before they enter the bounded error log
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = SECRET_PATTERN.replace_all(message, "${1}=***").to_string();

    sanitized = SENSITIVE_PATH_PATTERN
        .replace_all(&sanitized, "/***REDACTED***/")
        .to_string();

    if sanitized.len() > MAX_RECORDED_MESSAGE_LEN {
        let truncate_suffix = "...[truncated]";
        let max_content_len = MAX_RECORDED_MESSAGE_LEN - truncate_suffix.len();
        let mut cut = max_content_len;
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
