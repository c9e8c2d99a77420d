//! Error types for the sqlpilot pipeline.
//!
//! Worker agents, the state merge protocol, the model client and the
//! configuration loader each have their own error enum. All of them roll up
//! into [`SqlPilotError`].

use crate::core::PipelineStage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for sqlpilot operations.
#[derive(Debug, Error)]
pub enum SqlPilotError {
    /// A worker agent failed.
    #[error("{0}")]
    Agent(#[from] AgentError),

    /// A state delta violated the merge protocol.
    #[error("{0}")]
    StateMerge(#[from] StateMergeError),

    /// The model client failed.
    #[error("{0}")]
    Model(#[from] ModelError),

    /// Configuration could not be loaded.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised by worker agents.
///
/// Every variant is treated by the supervisor as a recoverable failure: it is
/// recorded in the error history and consumes retry budget.
#[derive(Debug, Error)]
pub enum AgentError {
    /// A tool used by the agent failed.
    #[error("Tool {tool} of {agent} failed: {reason}")]
    Tool {
        /// The agent name.
        agent: String,
        /// The tool name.
        tool: String,
        /// The reason for failure.
        reason: String,
    },

    /// Schema retrieval returned no tables.
    #[error("No relevant tables found for connection {connection_id}")]
    EmptySchema {
        /// The connection that was searched.
        connection_id: i64,
    },

    /// The invocation exceeded its time budget.
    #[error("{agent} timed out after {timeout_ms}ms")]
    Timeout {
        /// The agent name.
        agent: String,
        /// The timeout in milliseconds.
        timeout_ms: u64,
    },

    /// The model call failed.
    #[error("{0}")]
    Model(#[from] ModelError),

    /// The model answered, but the answer was unusable.
    #[error("Invalid model response: {0}")]
    InvalidResponse(String),

    /// Execution was refused because the SQL was not cleared by validation.
    #[error("Refusing to execute SQL that did not pass validation: {0}")]
    Rejected(String),

    /// The agent has nothing to work on yet.
    #[error("Missing input for {agent}: {what}")]
    MissingInput {
        /// The agent name.
        agent: String,
        /// What was missing.
        what: String,
    },

    /// The agent panicked while running.
    #[error("{agent} panicked: {message}")]
    Panicked {
        /// The agent name.
        agent: String,
        /// The panic payload, if it was a string.
        message: String,
    },

    /// An external collaborator failed.
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] anyhow::Error),
}

impl AgentError {
    /// Creates a tool failure.
    #[must_use]
    pub fn tool(agent: impl Into<String>, tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Tool {
            agent: agent.into(),
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    /// Creates a missing-input failure.
    #[must_use]
    pub fn missing_input(agent: impl Into<String>, what: impl Into<String>) -> Self {
        Self::MissingInput {
            agent: agent.into(),
            what: what.into(),
        }
    }

    /// Returns a short machine-readable kind for the error.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Tool { .. } => "tool",
            Self::EmptySchema { .. } => "empty_schema",
            Self::Timeout { .. } => "timeout",
            Self::Model(_) => "model",
            Self::InvalidResponse(_) => "invalid_response",
            Self::Rejected(_) => "rejected",
            Self::MissingInput { .. } => "missing_input",
            Self::Panicked { .. } => "panicked",
            Self::Collaborator(_) => "collaborator",
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("kind".to_string(), serde_json::json!(self.kind()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// Structural violations of the state merge protocol.
///
/// These indicate a contract violation rather than a transient condition, so
/// the supervisor escalates them straight to error recovery without consuming
/// retry budget.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateMergeError {
    /// A delta named a stage outside the fixed stage set.
    #[error("Unknown pipeline stage '{0}'")]
    InvalidStage(String),

    /// A delta proposed a transition the routing table forbids.
    #[error("Transition {from} -> {to} is not allowed")]
    DisallowedTransition {
        /// Stage before the delta.
        from: PipelineStage,
        /// Proposed stage.
        to: PipelineStage,
    },

    /// A delta tried to lower the retry counter.
    #[error("Retry count cannot decrease ({current} -> {proposed})")]
    RetryCountRegressed {
        /// Current value.
        current: u32,
        /// Proposed value.
        proposed: u32,
    },

    /// A delta tried to shrink the retry budget below what was already spent.
    #[error("Retry budget {proposed} is below the {spent} retries already spent")]
    RetryBudgetShrunk {
        /// Retries already spent.
        spent: u32,
        /// Proposed budget.
        proposed: u32,
    },
}

/// Errors raised by a model client.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The transport failed.
    #[error("Model request failed: {0}")]
    Http(String),

    /// The provider answered with a non-success status.
    #[error("Model provider returned status {code}: {body}")]
    Status {
        /// HTTP status code.
        code: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The provider returned no content.
    #[error("Model returned an empty completion")]
    EmptyCompletion,

    /// The provider response could not be decoded.
    #[error("Could not decode model response: {0}")]
    Decode(String),

    /// No model client is configured.
    #[error("Model client is not configured: {0}")]
    NotConfigured(String),
}

impl ModelError {
    /// Returns true if retrying the request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Status { code, .. } => *code == 429 || *code >= 500,
            Self::EmptyCompletion | Self::Decode(_) | Self::NotConfigured(_) => false,
        }
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Could not read config: {0}")]
    Io(#[from] std::io::Error),

    /// The config could not be parsed.
    #[error("Could not parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// The config parsed but is inconsistent.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Serializable summary of an error, as surfaced in diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Error kind (e.g., "timeout").
    pub kind: String,
    /// Human-readable message.
    pub message: String,
}

impl From<&AgentError> for ErrorInfo {
    fn from(err: &AgentError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<&StateMergeError> for ErrorInfo {
    fn from(err: &StateMergeError) -> Self {
        let kind = match err {
            StateMergeError::InvalidStage(_) => "invalid_stage",
            StateMergeError::DisallowedTransition { .. } => "disallowed_transition",
            StateMergeError::RetryCountRegressed { .. } => "retry_regressed",
            StateMergeError::RetryBudgetShrunk { .. } => "retry_budget_shrunk",
        };
        Self {
            kind: kind.to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_error_to_dict() {
        let err = AgentError::tool("schema_agent", "retrieve_database_schema", "connection refused");
        let dict = err.to_dict();

        assert_eq!(dict.get("kind").unwrap(), "tool");
        assert!(dict
            .get("message")
            .unwrap()
            .as_str()
            .unwrap()
            .contains("retrieve_database_schema"));
    }

    #[test]
    fn test_timeout_display() {
        let err = AgentError::Timeout {
            agent: "sql_executor_agent".to_string(),
            timeout_ms: 500,
        };
        assert_eq!(err.to_string(), "sql_executor_agent timed out after 500ms");
        assert_eq!(err.kind(), "timeout");
    }

    #[test]
    fn test_invalid_stage_display() {
        let err = StateMergeError::InvalidStage("charting".to_string());
        assert!(err.to_string().contains("charting"));
        assert_eq!(ErrorInfo::from(&err).kind, "invalid_stage");
    }

    #[test]
    fn test_model_error_retryable() {
        assert!(ModelError::Http("reset".into()).is_retryable());
        assert!(ModelError::Status { code: 429, body: String::new() }.is_retryable());
        assert!(ModelError::Status { code: 503, body: String::new() }.is_retryable());
        assert!(!ModelError::Status { code: 400, body: String::new() }.is_retryable());
        assert!(!ModelError::EmptyCompletion.is_retryable());
    }

    #[test]
    fn test_agent_error_from_anyhow() {
        let err: AgentError = anyhow::anyhow!("pool exhausted").into();
        assert_eq!(err.kind(), "collaborator");
        assert!(err.to_string().contains("pool exhausted"));
    }
}
