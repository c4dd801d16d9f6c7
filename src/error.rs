//! Error taxonomy for the pipeline orchestrator
//!
//! Every failure the controller can observe maps onto one of these variants.
//! Human-facing messages go through [`sanitize_error_message`] before they are
//! attached to progress events.

use crate::pipeline::agents::AgentName;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Main error type for pipeline operations
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    /// A declared predecessor had no finalized output. The controller enforces
    /// ordering, so reaching this is a defect, never a user error.
    #[error("Missing dependency: agent {agent} requires output of {missing}")]
    MissingDependency { agent: AgentName, missing: AgentName },

    #[error("Agent {agent} invocation failed: {cause}")]
    Invocation { agent: AgentName, cause: String },

    #[error("Malformed review for agent {agent}: {message}")]
    MalformedReview { agent: AgentName, message: String },

    #[error("Validation of task '{task}' for agent {agent} failed: {message}")]
    Validation {
        agent: AgentName,
        task: String,
        message: String,
    },

    #[error("Invalid agent sequence: {message}")]
    InvalidSequence { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Command not allowed in state {state}: {message}")]
    InvalidState { state: String, message: String },

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Agent {agent} has no task named '{task}'")]
    UnknownTask { agent: AgentName, task: String },

    #[error("Review surface error: {message}")]
    Review { message: String },

    #[error("Pipeline controller is no longer running")]
    ControllerClosed,

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl PipelineError {
    /// Create an invocation error for the given agent
    pub fn invocation<S: Into<String>>(agent: &AgentName, cause: S) -> Self {
        Self::Invocation {
            agent: agent.clone(),
            cause: cause.into(),
        }
    }

    /// Create a malformed review error
    pub fn malformed_review<S: Into<String>>(agent: &AgentName, message: S) -> Self {
        Self::MalformedReview {
            agent: agent.clone(),
            message: message.into(),
        }
    }

    /// Create a per-task validation error
    pub fn validation<T: Into<String>, S: Into<String>>(
        agent: &AgentName,
        task: T,
        message: S,
    ) -> Self {
        Self::Validation {
            agent: agent.clone(),
            task: task.into(),
            message: message.into(),
        }
    }

    /// Create an invalid sequence error
    pub fn invalid_sequence<S: Into<String>>(message: S) -> Self {
        Self::InvalidSequence {
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state<T: Into<String>, S: Into<String>>(state: T, message: S) -> Self {
        Self::InvalidState {
            state: state.into(),
            message: message.into(),
        }
    }

    /// Create a review surface error
    pub fn review<S: Into<String>>(message: S) -> Self {
        Self::Review {
            message: message.into(),
        }
    }

    /// True for errors that indicate a controller defect rather than an
    /// external or human failure.
    pub fn is_internal(&self) -> bool {
        matches!(self, PipelineError::MissingDependency { .. })
    }

    /// Human-readable cause with secrets redacted, suitable for events.
    pub fn public_message(&self) -> String {
        sanitize_error_message(&self.to_string())
    }
}

impl From<crate::config::ConfigError> for PipelineError {
    fn from(err: crate::config::ConfigError) -> Self {
        PipelineError::Config {
            message: err.to_string(),
        }
    }
}

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret|authorization)[=:]\s*(bearer\s+)?\S+")
        .expect("secret pattern is valid")
});

static SENSITIVE_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
        .expect("path pattern is valid")
});

const MAX_MESSAGE_LEN: usize = 500;

/// Sanitize error messages so remote response bodies and transport errors
/// cannot leak credentials into events or logs.
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = SECRET_PATTERN
        .replace_all(message, "${1}=***")
        .to_string();

    sanitized = SENSITIVE_PATH_PATTERN
        .replace_all(&sanitized, "/***REDACTED***/")
        .to_string();

    if sanitized.len() > MAX_MESSAGE_LEN {
        let truncate_suffix = "...[truncated]";
        let mut cut = MAX_MESSAGE_LEN - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
