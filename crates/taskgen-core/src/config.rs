//! Pipeline configuration. Every tunable has a literal default and can be
//! overridden via a `TASKGEN_*` environment variable, mirroring the
//! environment-seeded defaults used elsewhere in this codebase's config
//! structs.

use std::env;
use std::time::Duration;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_string_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Which variant of the prompt template to render (§4.C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptProfile {
    Legacy,
    V2,
    Compact,
    Minimal,
}

impl PromptProfile {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "legacy" => Self::Legacy,
            "compact" => Self::Compact,
            "minimal" => Self::Minimal,
            _ => Self::V2,
        }
    }
}

/// Tunables for a single pipeline run. Constructed via [`PipelineConfig::default`]
/// (which reads `TASKGEN_*` env vars) or built up explicitly for tests.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub user_language: String,
    pub prompt_profile: PromptProfile,
    pub max_retries: u32,
    pub max_concurrent_requests: usize,
    pub batch_size: usize,
    pub quality_threshold: f64,
    pub validation_enabled: bool,
    pub enable_json_recovery: bool,
    pub auto_summarize_enabled: bool,
    pub stream_processing_enabled: bool,
    pub deduplication_enabled: bool,
    pub similarity_threshold: f64,
    pub max_tasks_per_comment: usize,
    pub low_priority_patterns: Vec<String>,
    pub default_status: crate::model::TaskStatus,
    pub ai_command_name: String,
    pub ai_model: String,
    pub skip_auth_check: bool,

    /// Deadline for a single AI invocation (§5 "Timeout semantics").
    pub invoke_timeout: Duration,
    /// Bound on the Write Worker's input queue (§4.H).
    pub write_queue_capacity: usize,
    /// Cap on the process-wide error log (§4.F, §8 "Error-log bound").
    pub error_log_capacity: usize,
    /// Body length, in chars, above which a comment is summarized (§8 boundary law).
    pub summarization_threshold: usize,
    /// Chunk size, in chars, used by the content chunker (§4.D).
    pub chunk_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            user_language: env_string_or("TASKGEN_USER_LANGUAGE", "English"),
            prompt_profile: PromptProfile::parse(&env_string_or("TASKGEN_PROMPT_PROFILE", "v2")),
            max_retries: env_or("TASKGEN_MAX_RETRIES", 3),
            max_concurrent_requests: env_or("TASKGEN_MAX_CONCURRENT_REQUESTS", 5),
            batch_size: env_or("TASKGEN_BATCH_SIZE", 4),
            quality_threshold: env_or("TASKGEN_QUALITY_THRESHOLD", 0.8),
            validation_enabled: env_or("TASKGEN_VALIDATION_ENABLED", false),
            enable_json_recovery: env_or("TASKGEN_ENABLE_JSON_RECOVERY", true),
            auto_summarize_enabled: env_or("TASKGEN_AUTO_SUMMARIZE_ENABLED", true),
            stream_processing_enabled: env_or("TASKGEN_STREAM_PROCESSING_ENABLED", true),
            deduplication_enabled: env_or("TASKGEN_DEDUPLICATION_ENABLED", true),
            similarity_threshold: env_or("TASKGEN_SIMILARITY_THRESHOLD", 0.8),
            max_tasks_per_comment: env_or("TASKGEN_MAX_TASKS_PER_COMMENT", 2),
            low_priority_patterns: default_low_priority_patterns(),
            default_status: crate::model::TaskStatus::Todo,
            ai_command_name: env_string_or("TASKGEN_AI_COMMAND_NAME", "claude"),
            ai_model: env_string_or("TASKGEN_AI_MODEL", "auto"),
            skip_auth_check: env_or("TASKGEN_SKIP_AUTH_CHECK", false),
            invoke_timeout: Duration::from_secs(env_or("TASKGEN_INVOKE_TIMEOUT_SECS", 120)),
            write_queue_capacity: env_or("TASKGEN_WRITE_QUEUE_CAPACITY", 100),
            error_log_capacity: env_or("TASKGEN_ERROR_LOG_CAPACITY", 100),
            summarization_threshold: env_or("TASKGEN_SUMMARIZATION_THRESHOLD", 2000),
            chunk_size: env_or("TASKGEN_CHUNK_SIZE", 1500),
        }
    }
}

fn default_low_priority_patterns() -> Vec<String> {
    vec![
        "nit:".to_string(),
        "minor:".to_string(),
        "suggestion:".to_string(),
        "nitpick:".to_string(),
        "optional:".to_string(),
    ]
}

impl PipelineConfig {
    /// Whether `body` demotes to [`crate::model::Priority::Low`] per a
    /// configured substring match, case-insensitive.
    pub fn is_low_priority_text(&self, body: &str) -> bool {
        let lower = body.to_lowercase();
        self.low_priority_patterns
            .iter()
            .any(|pat| lower.contains(&pat.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.max_concurrent_requests, 5);
        assert_eq!(cfg.batch_size, 4);
        assert!((cfg.quality_threshold - 0.8).abs() < f64::EPSILON);
        assert!(!cfg.validation_enabled);
        assert!(cfg.enable_json_recovery);
        assert!(cfg.auto_summarize_enabled);
        assert!(cfg.stream_processing_enabled);
        assert!(cfg.deduplication_enabled);
        assert!((cfg.similarity_threshold - 0.8).abs() < f64::EPSILON);
        assert_eq!(cfg.max_tasks_per_comment, 2);
        assert_eq!(cfg.default_status, crate::model::TaskStatus::Todo);
        assert_eq!(cfg.ai_model, "auto");
        assert!(!cfg.skip_auth_check);
    }

    #[test]
    fn low_priority_pattern_matching_is_case_insensitive() {
        let cfg = PipelineConfig::default();
        assert!(cfg.is_low_priority_text("NIT: rename this variable"));
        assert!(cfg.is_low_priority_text("Suggestion: consider a helper"));
        assert!(!cfg.is_low_priority_text("This is a real bug"));
    }

    #[test]
    fn prompt_profile_parses_with_v2_default() {
        assert_eq!(PromptProfile::parse("legacy"), PromptProfile::Legacy);
        assert_eq!(PromptProfile::parse("bogus"), PromptProfile::V2);
    }
}
