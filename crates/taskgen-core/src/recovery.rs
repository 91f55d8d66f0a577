//! Recovers structured task lists from damaged AI output.
//!
//! The assistant is a black box; its JSON is sometimes truncated, sometimes
//! subtly malformed, and occasionally not JSON at all. This module runs a
//! fixed chain of recovery strategies, in order of how "intact" the input
//! needs to be, and accepts the first one that produces a non-empty,
//! validated task list.

use crate::model::{ErrorKind, Priority, RecoveryResult, TaskRequest, TaskStatus};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, instrument};

const TASK_VERBS: &[&str] = &["fix", "add", "update", "remove", "change", "implement", "check"];

/// Classify the original parse error into one of the four tags used by the
/// Retry Strategist. Matched by lowercased substring, most specific first.
pub fn classify_error(error_text: &str) -> ErrorKind {
    let lower = error_text.to_lowercase();
    if lower.contains("eof while parsing") || lower.contains("unexpected end of") {
        ErrorKind::JsonTruncation
    } else if lower.contains("invalid type") || lower.contains("expected") && lower.contains("found") {
        ErrorKind::JsonTypeMismatch
    } else if lower.contains("expected") || lower.contains("trailing") || lower.contains("key must be") {
        ErrorKind::JsonMalformed
    } else {
        ErrorKind::JsonUnknown
    }
}

/// Attempt to recover a task list from `raw_text`, given the parse error
/// that rejected it as a plain JSON array. Returns `recovered=false` with a
/// diagnostic message if every strategy fails, or if recovery is disabled.
#[instrument(skip(raw_text, original_parse_error), fields(raw_len = raw_text.len()))]
pub fn recover(raw_text: &str, original_parse_error: &str, enabled: bool) -> RecoveryResult {
    let error_kind = classify_error(original_parse_error);
    if !enabled {
        return RecoveryResult {
            recovered: false,
            tasks: Vec::new(),
            error_kind,
            message: "recovery disabled".to_string(),
            original_size: raw_text.len(),
            recovered_size: 0,
        };
    }

    let strategies: [(&str, fn(&str) -> Option<Vec<TaskRequest>>); 5] = [
        ("structural_repair", structural_repair),
        ("truncation_completion", truncation_completion),
        ("partial_object_extraction", partial_object_extraction),
        ("fragment_reconstruction", fragment_reconstruction),
        ("intelligent_field_completion", intelligent_field_completion),
    ];

    for (name, strategy) in strategies {
        if let Some(tasks) = strategy(raw_text) {
            let valid: Vec<TaskRequest> = tasks.into_iter().filter(|t| t.is_valid()).collect();
            if !valid.is_empty() {
                debug!(strategy = name, recovered_tasks = valid.len(), "recovery strategy succeeded");
                let recovered_size = valid
                    .iter()
                    .map(|t| t.description.len())
                    .sum();
                return RecoveryResult {
                    recovered: true,
                    tasks: valid,
                    error_kind,
                    message: format!("recovered via {name}"),
                    original_size: raw_text.len(),
                    recovered_size,
                };
            }
        }
    }

    RecoveryResult {
        recovered: false,
        tasks: Vec::new(),
        error_kind,
        message: "all recovery strategies exhausted".to_string(),
        original_size: raw_text.len(),
        recovered_size: 0,
    }
}

fn decode_task_array(text: &str) -> Option<Vec<TaskRequest>> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let arr = value.as_array()?;
    if arr.is_empty() {
        return None;
    }
    let mut out = Vec::with_capacity(arr.len());
    for item in arr {
        if !item.is_object() {
            return None;
        }
        out.push(task_from_value(item));
    }
    Some(out)
}

fn task_from_value(value: &serde_json::Value) -> TaskRequest {
    let description = value
        .get("description")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let priority = value
        .get("priority")
        .and_then(|v| v.as_str())
        .map(Priority::parse)
        .unwrap_or(Priority::Medium);
    let status = value.get("status").and_then(|v| v.as_str()).map(TaskStatus::parse);
    TaskRequest {
        description,
        priority,
        origin_text: value.get("origin_text").and_then(|v| v.as_str()).map(String::from),
        source_review_id: value.get("source_review_id").and_then(|v| v.as_i64()),
        source_comment_id: value.get("source_comment_id").and_then(|v| v.as_i64()),
        file: value.get("file").and_then(|v| v.as_str()).map(String::from),
        line: value.get("line").and_then(|v| v.as_u64()).map(|v| v as u32),
        task_index: value.get("task_index").and_then(|v| v.as_u64()).map(|v| v as u32),
        status,
    }
}

fn repair_regexes() -> &'static [(Regex, &'static str)] {
    static CELL: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    CELL.get_or_init(|| {
        vec![
            (Regex::new(r"```(?:json)?").unwrap(), ""),
            (Regex::new(r"\}\s*\{").unwrap(), "},{"),
            (Regex::new(r",\s*([\]}])").unwrap(), "$1"),
            (Regex::new(r"(?P<pre>[{,]\s*)([A-Za-z_][A-Za-z0-9_]*)\s*:").unwrap(), "$pre\"$2\":"),
        ]
    })
}

/// Strategy 1: apply an ordered set of regex rewrites for recurring
/// malformations, attempting to parse after each.
fn structural_repair(raw: &str) -> Option<Vec<TaskRequest>> {
    let mut text = raw.trim().to_string();
    for (re, replacement) in repair_regexes() {
        text = re.replace_all(&text, *replacement).into_owned();
        if let Some(tasks) = decode_task_array(text.trim()) {
            return Some(tasks);
        }
    }
    None
}

/// Strategy 2: locate the last `{` and try a fixed set of tail completions.
fn truncation_completion(raw: &str) -> Option<Vec<TaskRequest>> {
    let last_brace = raw.rfind('{')?;
    let head = &raw[..=last_brace];
    let candidates = [
        format!("{head}}}]"),
        format!("{head}\", \"priority\": \"medium\"}}]"),
        format!("{head}\", \"priority\": \"medium\", \"status\": \"todo\"}}]"),
    ];
    for candidate in candidates {
        if let Some(tasks) = decode_task_array(&candidate) {
            return Some(tasks);
        }
    }
    None
}

/// Strategy 3: brace-balanced scan emitting each complete `{...}` run,
/// tracking string boundaries so braces inside string literals don't
/// confuse the balance count.
fn partial_object_extraction(raw: &str) -> Option<Vec<TaskRequest>> {
    let mut depth = 0i32;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;
    let mut objects = Vec::new();
    let bytes: Vec<char> = raw.chars().collect();

    for (i, &c) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        let fragment: String = bytes[s..=i].iter().collect();
                        objects.push(fragment);
                    }
                }
            }
            _ => {}
        }
    }

    if objects.is_empty() {
        return None;
    }

    let mut tasks = Vec::new();
    for obj in objects {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&obj) {
            if value.is_object() {
                let task = task_from_value(&value);
                if !task.description.trim().is_empty() {
                    tasks.push(task);
                }
            }
        }
    }
    if tasks.is_empty() {
        None
    } else {
        Some(tasks)
    }
}

/// Strategy 4: find long quoted strings that look like task descriptions
/// and synthesize a task per fragment.
fn fragment_reconstruction(raw: &str) -> Option<Vec<TaskRequest>> {
    static STRING_RE: OnceLock<Regex> = OnceLock::new();
    let re = STRING_RE.get_or_init(|| Regex::new(r#""((?:[^"\\]|\\.){20,})""#).unwrap());

    let mut tasks = Vec::new();
    for cap in re.captures_iter(raw) {
        let fragment = cap.get(1)?.as_str();
        let lower = fragment.to_lowercase();
        let has_verb = TASK_VERBS.iter().any(|v| lower.contains(v));
        if has_verb || fragment.len() <= 500 {
            tasks.push(TaskRequest {
                description: fragment.to_string(),
                priority: Priority::Medium,
                origin_text: None,
                source_review_id: None,
                source_comment_id: None,
                file: None,
                line: None,
                task_index: None,
                status: Some(TaskStatus::Todo),
            });
        }
    }
    if tasks.is_empty() {
        None
    } else {
        Some(tasks)
    }
}

/// Strategy 5: objects that have `description` but are missing `priority`
/// or `status` get defaults injected, then are re-decoded.
fn intelligent_field_completion(raw: &str) -> Option<Vec<TaskRequest>> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    let arr = value.as_array()?;
    if arr.is_empty() {
        return None;
    }
    let mut tasks = Vec::new();
    for item in arr {
        let obj = item.as_object()?;
        if !obj.contains_key("description") {
            continue;
        }
        let mut completed = obj.clone();
        completed
            .entry("priority")
            .or_insert_with(|| serde_json::Value::String("medium".to_string()));
        completed
            .entry("status")
            .or_insert_with(|| serde_json::Value::String("todo".to_string()));
        tasks.push(task_from_value(&serde_json::Value::Object(completed)));
    }
    if tasks.is_empty() {
        None
    } else {
        Some(tasks)
    }
}
