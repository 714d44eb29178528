// SPDX-License-Identifier: MIT

//! Typed error handling for stageflow-rs
//!
//! `StageflowError` is what every stage handler, port and driver call
//! returns. Graph construction problems live in `WorkflowError` so they
//! can be reported before anything runs.

use serde::Serialize;
use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, StageflowError>;

/// Top-level error type for stageflow-rs
#[derive(Debug, Error)]
pub enum StageflowError {
    /// API errors from external services (model provider, search provider)
    #[error("API error from {provider}: {message}")]
    Api { provider: String, message: String },

    /// Configuration errors (missing env vars, invalid config)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Graph construction and wiring errors
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// Input rejected by a guardrail stage before any side effects ran
    #[error("{0}")]
    Guardrail(GuardrailRejection),

    /// Resume requested for an instance with no live checkpoint
    #[error("No checkpoint found for instance '{instance_id}'")]
    CheckpointNotFound { instance_id: String },

    /// Start requested for an instance that is still suspended
    #[error("Instance '{instance_id}' is suspended at stage '{stage}'; resume or discard it first")]
    PendingCheckpoint { instance_id: String, stage: String },

    /// A stage read a state field no predecessor wrote
    #[error("State field '{field}' is missing")]
    MissingField { field: String },

    /// A state field exists but has the wrong shape
    #[error("State field '{field}' is invalid: {reason}")]
    InvalidField { field: String, reason: String },

    /// A router produced a key its edge has no target for
    #[error("Stage '{stage}' routed to unknown key '{key}'")]
    UnknownRoute { stage: String, key: String },

    /// The engine hit its stage invocation limit
    #[error("Workflow exceeded {limit} stage invocations")]
    StepLimitExceeded { limit: usize },

    /// A fan-out sub-task failed or produced nothing
    #[error("Sub-task failed: {0}")]
    SubTask(String),

    /// Model/LLM-specific errors
    #[error(transparent)]
    Model(#[from] ModelError),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Generic error wrapper
    #[error("{0}")]
    Other(String),
}

/// Construction-time graph errors and wiring mistakes
#[derive(Debug, Error, PartialEq)]
pub enum WorkflowError {
    #[error("Stage '{0}' is defined more than once")]
    DuplicateStage(String),

    #[error("Unknown stage '{0}'")]
    UnknownStage(String),

    #[error("'{0}' is a reserved stage name")]
    ReservedName(String),

    #[error("Graph '{0}' has no entry stage")]
    MissingEntry(String),

    /// A stage has more than one outgoing edge definition
    #[error("Stage '{0}' has conflicting outgoing edges")]
    ConflictingEdges(String),

    #[error("Conditional edge from '{0}' has no routes")]
    EmptyRoutes(String),

    #[error("Stage '{0}' has no outgoing edge")]
    NoOutgoingEdge(String),

    /// A handler asked to suspend on a stage not declared as an interrupt point
    #[error("Stage '{0}' requested an interrupt but is not an interrupt point")]
    UnexpectedInterrupt(String),

    #[error("Checkpoint belongs to workflow '{found}', not '{expected}'")]
    WorkflowMismatch { expected: String, found: String },

    #[error("Agent '{0}' is not registered")]
    UnknownAgent(String),

    /// A planned sub-task list failed validation
    #[error("Invalid task plan: {0}")]
    InvalidPlan(String),
}

/// Model/LLM-specific errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// API key not configured
    #[error("API key not configured: {0} is not set")]
    ApiKeyMissing(String),

    /// Provider not supported
    #[error("Model provider not supported: {0}")]
    UnsupportedProvider(String),

    /// Invalid response from model
    #[error("Invalid response from model: {0}")]
    InvalidResponse(String),
}

/// Structured guardrail rejection with human-readable reasons
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GuardrailRejection {
    pub reasons: Vec<String>,
}

impl std::fmt::Display for GuardrailRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Input rejected: {}", self.reasons.join(" "))
    }
}

impl StageflowError {
    /// Create an API error
    pub fn api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a guardrail rejection
    pub fn rejected(reasons: Vec<String>) -> Self {
        Self::Guardrail(GuardrailRejection { reasons })
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Whether the engine's retry policy may re-run a stage after this error
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Api { .. } | Self::Http(_) | Self::Io(_) | Self::SubTask(_)
        )
    }
}

impl From<&str> for StageflowError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for StageflowError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}
