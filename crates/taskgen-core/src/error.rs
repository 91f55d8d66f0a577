//! Structured error types shared across the pipeline's components.
//!
//! Every fallible component returns one of the enums below rather than a
//! bare `anyhow::Error`, so that callers (and the error tracker) can branch
//! on `retryable()` / `recovery_hint()` without string matching.

use serde::Serialize;
use std::collections::HashMap;

/// Errors raised while shelling out to the AI CLI for a single job.
#[derive(Debug, thiserror::Error)]
pub enum InvokerError {
    #[error("failed to spawn AI process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("AI process timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("AI process exited with status {status}: {stderr}")]
    NonZeroExit { status: i32, stderr: String },

    #[error("AI process output was not valid UTF-8")]
    InvalidUtf8,

    #[error("AI response envelope reported an error: {0}")]
    EnvelopeError(String),

    #[error("authentication required: {0}")]
    AuthRequired(String),
}

impl InvokerError {
    pub fn retryable(&self) -> bool {
        match self {
            Self::Spawn(_) => true,
            Self::Timeout { .. } => true,
            Self::NonZeroExit { .. } => true,
            Self::InvalidUtf8 => false,
            Self::EnvelopeError(_) => true,
            Self::AuthRequired(_) => false,
        }
    }

    pub fn recovery_hint(&self) -> &'static str {
        match self {
            Self::Spawn(_) => "verify the AI CLI binary is installed and on PATH",
            Self::Timeout { .. } => "increase invoke_timeout_secs or shorten the prompt",
            Self::NonZeroExit { .. } => "inspect stderr for the underlying CLI failure",
            Self::InvalidUtf8 => "the CLI emitted non-UTF-8 bytes on stdout; this is not retryable",
            Self::EnvelopeError(_) => "the CLI reported a soft failure inside its own envelope",
            Self::AuthRequired(_) => "re-authenticate the AI CLI out of band before retrying",
        }
    }
}

/// Errors raised by the JSON-backed storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path} as JSON: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to rename temp file into place for {path}: {source}")]
    Rename {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    /// Storage errors from `load` are never retried by the caller (the
    /// store itself already falls back to a backup or an empty value); this
    /// exists for symmetry with the other error enums and for callers that
    /// want to log a hint.
    pub fn recovery_hint(&self) -> &'static str {
        match self {
            Self::Read { .. } => "the file may be missing; a fresh store will be created",
            Self::Write { .. } => "check disk space and directory permissions",
            Self::Parse { .. } => "the file is corrupted; falling back to its backup copy",
            Self::Rename { .. } => "the atomic rename step failed; the temp file was left in place",
        }
    }
}

/// Top-level error type surfaced by the pipeline orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invocation failed: {0}")]
    Invoke(#[from] InvokerError),

    #[error("storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("pipeline was cancelled before completion")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),
}

/// Structured view of any of the above errors, suitable for logging or
/// embedding in a [`crate::model::FailedComment`].
#[derive(Debug, Clone, Serialize)]
pub struct StructuredError {
    pub code: String,
    pub message: String,
    pub recovery_action: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl StructuredError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            recovery_action: String::new(),
            retryable: false,
            context: HashMap::new(),
        }
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn with_recovery(mut self, action: impl Into<String>) -> Self {
        self.recovery_action = action.into();
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl From<&InvokerError> for StructuredError {
    fn from(err: &InvokerError) -> Self {
        let code = match err {
            InvokerError::Spawn(_) => "invoke_spawn_failed",
            InvokerError::Timeout { .. } => "invoke_timeout",
            InvokerError::NonZeroExit { .. } => "invoke_nonzero_exit",
            InvokerError::InvalidUtf8 => "invoke_invalid_utf8",
            InvokerError::EnvelopeError(_) => "invoke_envelope_error",
            InvokerError::AuthRequired(_) => "invoke_auth_required",
        };
        StructuredError::new(code, err.to_string())
            .retryable(err.retryable())
            .with_recovery(err.recovery_hint())
    }
}
