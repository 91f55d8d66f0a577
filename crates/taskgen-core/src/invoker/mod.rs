//! Launches the external AI assistant as a subprocess, enforces a deadline,
//! and peels its reply envelope down to the raw result payload.

pub mod process_group;

use crate::error::InvokerError;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

/// Substrings (matched case-insensitively) that identify an authentication
/// failure inside the assistant's own error text. Closed vocabulary per the
/// contract in 4.A — this is intentionally not exhaustive.
const AUTH_FAILURE_SUBSTRINGS: &[&str] = &[
    "not authenticated",
    "authentication required",
    "please log in",
    "invalid api key",
    "unauthorized",
    "auth token",
    "login required",
];

/// Abstraction over "run a prompt through the assistant and get text back",
/// so tests can substitute a scripted fake for the real subprocess.
#[async_trait]
pub trait AiInvoker: Send + Sync {
    async fn invoke(&self, prompt: &str, deadline: Duration) -> Result<String, InvokerError>;

    /// Pre-flight probe: does the backend currently have valid credentials?
    /// Backends that have no separate probe (scripted fakes, anything that
    /// can't fail on auth) can accept the default no-op.
    async fn check_auth(&self) -> Result<(), InvokerError> {
        Ok(())
    }
}

/// Shells out to a real AI CLI binary via `tokio::process::Command`.
pub struct ProcessInvoker {
    command: String,
    model: String,
    extra_args: Vec<String>,
}

impl ProcessInvoker {
    pub fn new(command: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            model: model.into(),
            extra_args: Vec::new(),
        }
    }

    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.arg("--model")
            .arg(&self.model)
            .args(&self.extra_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        process_group::prepare(&mut cmd);
        cmd
    }
}

#[async_trait]
impl AiInvoker for ProcessInvoker {
    #[instrument(skip(self, prompt), fields(prompt_len = prompt.len()))]
    async fn invoke(&self, prompt: &str, deadline: Duration) -> Result<String, InvokerError> {
        let mut cmd = self.build_command();
        let mut child = cmd.spawn().map_err(InvokerError::Spawn)?;
        let pid = child.id();

        #[cfg(windows)]
        let job = process_group::JobHandle::create().ok();
        #[cfg(windows)]
        if let Some(job) = job.as_ref() {
            let _ = job.assign(&child);
        }

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                let _ = child.start_kill();
                return Err(InvokerError::Spawn(e));
            }
            drop(stdin);
        }

        let wait = child.wait_with_output();
        match tokio::time::timeout(deadline, wait).await {
            Ok(Ok(output)) => {
                if !output.status.success() {
                    let stderr = truncate(&String::from_utf8_lossy(&output.stderr), 400);
                    return Err(InvokerError::NonZeroExit {
                        status: output.status.code().unwrap_or(-1),
                        stderr,
                    });
                }
                let stdout = String::from_utf8(output.stdout).map_err(|_| InvokerError::InvalidUtf8)?;
                peel_envelope(&stdout)
            }
            Ok(Err(e)) => Err(InvokerError::Spawn(e)),
            Err(_) => {
                warn!(pid, timeout_secs = deadline.as_secs(), "AI invocation deadline exceeded");
                terminate(pid);
                #[cfg(windows)]
                if let Some(job) = job {
                    let _ = job.kill();
                }
                Err(InvokerError::Timeout {
                    timeout_secs: deadline.as_secs(),
                })
            }
        }
    }

    /// Probes the backend with a minimal invocation and surfaces only an
    /// auth failure; any other outcome (including a non-auth error) counts
    /// as "credentials are fine, something else went wrong".
    async fn check_auth(&self) -> Result<(), InvokerError> {
        match self.invoke("ping", Duration::from_secs(10)).await {
            Err(err @ InvokerError::AuthRequired(_)) => Err(err),
            _ => Ok(()),
        }
    }
}

#[cfg(unix)]
fn terminate(pid: Option<u32>) {
    if let Some(pid) = pid {
        if let Err(e) = process_group::kill_group(pid) {
            debug!(pid, error = %e, "failed to kill process group");
        }
    }
}

#[cfg(not(unix))]
fn terminate(_pid: Option<u32>) {}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{head}…")
    }
}

/// Peel a `{"type": "...", "is_error": bool, "result": "...", "error": "..."}`
/// wrapper envelope down to the bare result text, per 4.A. The Invoker only
/// inspects the error flag and payload strings — no structural validation
/// of the payload itself happens here.
fn peel_envelope(raw: &str) -> Result<String, InvokerError> {
    let trimmed = raw.trim();
    let value: serde_json::Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        // Not an envelope at all: treat the raw text as the payload.
        Err(_) => return Ok(raw.to_string()),
    };

    let is_error = value.get("is_error").and_then(|v| v.as_bool()).unwrap_or(false);
    if is_error {
        let error_text = value
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
            .to_string();
        let lowered = error_text.to_lowercase();
        if AUTH_FAILURE_SUBSTRINGS.iter().any(|s| lowered.contains(s)) {
            return Err(InvokerError::AuthRequired(error_text));
        }
        return Err(InvokerError::EnvelopeError(error_text));
    }

    match value.get("result").and_then(|v| v.as_str()) {
        Some(result) => Ok(result.to_string()),
        None => Ok(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peel_envelope_extracts_result() {
        let raw = r#"{"type":"result","is_error":false,"result":"[{\"description\":\"x\"}]"}"#;
        let peeled = peel_envelope(raw).unwrap();
        assert_eq!(peeled, r#"[{"description":"x"}]"#);
    }

    #[test]
    fn peel_envelope_detects_auth_failure() {
        let raw = r#"{"is_error":true,"error":"Not authenticated. Please log in."}"#;
        let err = peel_envelope(raw).unwrap_err();
        assert!(matches!(err, InvokerError::AuthRequired(_)));
    }

    #[test]
    fn peel_envelope_treats_generic_errors_as_envelope_errors() {
        let raw = r#"{"is_error":true,"error":"model overloaded"}"#;
        let err = peel_envelope(raw).unwrap_err();
        assert!(matches!(err, InvokerError::EnvelopeError(_)));
    }

    #[test]
    fn peel_envelope_passes_through_non_envelope_text() {
        let raw = "[{\"description\":\"bare array, no envelope\"}]";
        let peeled = peel_envelope(raw).unwrap();
        assert_eq!(peeled, raw);
    }

    #[test]
    fn truncate_respects_char_boundary() {
        let s = "hello world";
        assert_eq!(truncate(s, 5), "hello…");
        assert_eq!(truncate(s, 100), s);
    }

    struct AlwaysOkInvoker;

    #[async_trait]
    impl AiInvoker for AlwaysOkInvoker {
        async fn invoke(&self, _prompt: &str, _deadline: Duration) -> Result<String, InvokerError> {
            Ok("[]".to_string())
        }
    }

    #[tokio::test]
    async fn default_check_auth_is_a_no_op() {
        AlwaysOkInvoker.check_auth().await.unwrap();
    }
}
