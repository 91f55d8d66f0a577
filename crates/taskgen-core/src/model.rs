//! Core data model: reviews, comments, task requests, stored tasks, and the
//! failure/recovery records that flow alongside them through the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One code-review attached to a change proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    pub reviewer: String,
    pub state: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

/// One inline (or review-body) remark.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub author: String,
    pub file_path: String,
    pub line: u32,
    pub body: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub replies: Vec<String>,
    pub source_review_id: i64,
}

/// A Comment together with its enclosing review's summary. Carried through
/// the pipeline unchanged until a task is emitted or an error is recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentContext {
    pub comment: Comment,
    pub review_id: i64,
    pub reviewer: String,
    /// Pre-existing tasks for this comment, used to build batched prompts
    /// that avoid re-proposing completed work.
    #[serde(default)]
    pub existing_tasks: Vec<Task>,
}

impl CommentContext {
    pub fn new(comment: Comment, review: &Review) -> Self {
        Self {
            review_id: review.id,
            reviewer: review.reviewer.clone(),
            comment,
            existing_tasks: Vec::new(),
        }
    }
}

/// Priority as understood by the AI-shaped [`TaskRequest`] and the stored
/// [`Task`]. Orders `critical < high < medium < low < unknown` for ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
    /// Unrecognized priority strings fall into this lowest-rank bucket.
    Unknown,
}

impl Priority {
    /// Parse a free-form priority string, defaulting unknown values to
    /// [`Priority::Unknown`] rather than erroring — the recoverer and
    /// orchestrator both need a total function here.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "critical" => Self::Critical,
            "high" => Self::High,
            "medium" => Self::Medium,
            "low" => Self::Low,
            _ => Self::Unknown,
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
            Self::Unknown => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

/// Status of a stored task, as tracked externally. The pipeline only ever
/// writes `todo` (or the configured default); external updaters may mutate
/// status later, but never a task's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Todo,
    Doing,
    Done,
    Pending,
    Cancel,
}

impl TaskStatus {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "doing" => Self::Doing,
            "done" => Self::Done,
            "pending" => Self::Pending,
            "cancel" | "cancelled" | "canceled" => Self::Cancel,
            _ => Self::Todo,
        }
    }

    /// Status glyph used by the batched prompt builder (§4.C).
    pub fn glyph(self) -> &'static str {
        match self {
            Self::Done => "✅",
            Self::Doing => "🔄",
            Self::Todo => "📝",
            Self::Pending => "⏸️",
            Self::Cancel => "❌",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::Doing => "doing",
            Self::Done => "done",
            Self::Pending => "pending",
            Self::Cancel => "cancel",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The AI-shaped task record, as decoded straight out of the assistant's
/// JSON payload (possibly via recovery).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub description: String,
    pub priority: Priority,
    #[serde(default)]
    pub origin_text: Option<String>,
    #[serde(default)]
    pub source_review_id: Option<i64>,
    #[serde(default)]
    pub source_comment_id: Option<i64>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub task_index: Option<u32>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
}

impl TaskRequest {
    /// Whether this request is valid per §4.B: non-empty description, a
    /// recognized priority (unknown priorities are still "recognized" for
    /// ranking purposes — only parse failures are rejected upstream), and
    /// (after the orchestrator fills defaults) a non-zero source comment id.
    pub fn is_valid(&self) -> bool {
        !self.description.trim().is_empty()
    }
}

/// The stored, immutable-identity task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub priority: Priority,
    #[serde(default)]
    pub origin_text: Option<String>,
    pub source_review_id: i64,
    pub source_comment_id: i64,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub line: Option<u32>,
    pub task_index: u32,
    pub status: TaskStatus,
    pub pr_number: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Build a stored Task from an AI-shaped request, filling identity and
    /// timestamps. `source_comment_id` and `task_index` are supplied by the
    /// caller (the Orchestrator), not trusted from the request, per the
    /// uniqueness invariant in §3.
    pub fn from_request(
        request: TaskRequest,
        source_review_id: i64,
        source_comment_id: i64,
        task_index: u32,
        pr_number: u64,
        default_status: TaskStatus,
        now: DateTime<Utc>,
        id: String,
    ) -> Self {
        Self {
            id,
            description: request.description,
            priority: request.priority,
            origin_text: request.origin_text,
            source_review_id,
            source_comment_id,
            file: request.file,
            line: request.line,
            task_index,
            status: request.status.unwrap_or(default_status),
            pr_number,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Categorized error kinds, shared between the Invoker, the Recoverer, and
/// the Retry Strategist. Names match §7 exactly (not Rust type names) so
/// that persisted [`FailedComment`] records are stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvokeFailed,
    Timeout,
    AuthRequired,
    JsonTruncation,
    JsonMalformed,
    JsonTypeMismatch,
    JsonUnknown,
    PromptTooLarge,
    RateLimit,
    StorageError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InvokeFailed => "invoke_failed",
            Self::Timeout => "timeout",
            Self::AuthRequired => "auth_required",
            Self::JsonTruncation => "json_truncation",
            Self::JsonMalformed => "json_malformed",
            Self::JsonTypeMismatch => "json_type_mismatch",
            Self::JsonUnknown => "json_unknown",
            Self::PromptTooLarge => "prompt_too_large",
            Self::RateLimit => "rate_limit",
            Self::StorageError => "storage_error",
        };
        write!(f, "{s}")
    }
}

/// A comment whose retries were exhausted, logged by the Error Tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedComment {
    pub review_id: i64,
    pub comment_id: i64,
    pub file_path: String,
    pub line: u32,
    /// Truncated to 500 chars + ellipsis before persistence (§4.F).
    pub body_excerpt: String,
    pub error_kind: ErrorKind,
    pub error_message: String,
    pub retry_count: u32,
    pub prompt_size: usize,
    pub response_size: usize,
    pub failed_at: DateTime<Utc>,
}

const BODY_EXCERPT_LIMIT: usize = 500;

impl FailedComment {
    pub fn new(
        ctx: &CommentContext,
        error_kind: ErrorKind,
        error_message: impl Into<String>,
        retry_count: u32,
        prompt_size: usize,
        response_size: usize,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            review_id: ctx.review_id,
            comment_id: ctx.comment.id,
            file_path: ctx.comment.file_path.clone(),
            line: ctx.comment.line,
            body_excerpt: truncate_body(&ctx.comment.body),
            error_kind,
            error_message: error_message.into(),
            retry_count,
            prompt_size,
            response_size,
            failed_at: now,
        }
    }
}

fn truncate_body(body: &str) -> String {
    if body.chars().count() <= BODY_EXCERPT_LIMIT {
        body.to_string()
    } else {
        let truncated: String = body.chars().take(BODY_EXCERPT_LIMIT).collect();
        format!("{truncated}…")
    }
}

/// Result of a recovery attempt over malformed AI output (§4.B).
#[derive(Debug, Clone)]
pub struct RecoveryResult {
    pub recovered: bool,
    pub tasks: Vec<TaskRequest>,
    pub error_kind: ErrorKind,
    pub message: String,
    pub original_size: usize,
    pub recovered_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering() {
        let mut ps = vec![
            Priority::Unknown,
            Priority::Low,
            Priority::Critical,
            Priority::Medium,
            Priority::High,
        ];
        ps.sort();
        assert_eq!(
            ps,
            vec![
                Priority::Critical,
                Priority::High,
                Priority::Medium,
                Priority::Low,
                Priority::Unknown,
            ]
        );
    }

    #[test]
    fn priority_parse_unknown_falls_back() {
        assert_eq!(Priority::parse("urgent"), Priority::Unknown);
        assert_eq!(Priority::parse("HIGH"), Priority::High);
    }

    #[test]
    fn status_glyphs() {
        assert_eq!(TaskStatus::Done.glyph(), "✅");
        assert_eq!(TaskStatus::parse("bogus"), TaskStatus::Todo);
    }

    #[test]
    fn body_truncation_at_limit() {
        let exact: String = "a".repeat(BODY_EXCERPT_LIMIT);
        assert_eq!(truncate_body(&exact), exact);
        let over: String = "a".repeat(BODY_EXCERPT_LIMIT + 1);
        let truncated = truncate_body(&over);
        assert_eq!(truncated.chars().count(), BODY_EXCERPT_LIMIT + 1);
        assert!(truncated.ends_with('…'));
    }

    #[test]
    fn task_request_validity() {
        let req = TaskRequest {
            description: "  ".into(),
            priority: Priority::Medium,
            origin_text: None,
            source_review_id: None,
            source_comment_id: None,
            file: None,
            line: None,
            task_index: None,
            status: None,
        };
        assert!(!req.is_valid());
    }
}
