//! Decides what to do after a job fails: retry as-is, retry with a reduced
//! prompt, back off, or give up.

use crate::model::ErrorKind;
use rand::Rng;
use std::time::Duration;

/// Default size, in prompt characters, above which a prompt is considered
/// "large" for the purposes of the truncation-score heuristic.
pub const PROMPT_LARGE_THRESHOLD: usize = 30_000;

/// What the caller should do before the next attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Retry unchanged.
    SimpleRetry,
    /// Retry with the same prompt, doubling the per-attempt deadline.
    SimpleRetryDoubledDeadline,
    /// Summarize comments and halve the batch size before retrying.
    ReducePromptAggressive,
    /// Drop existing-task context and fall back to single-comment prompts.
    ReducePromptModerate,
    /// Wait `delay` before retrying, unchanged otherwise.
    ExponentialBackoff,
    /// Exhausted: surface the failure.
    GiveUp,
}

/// A decision returned by [`decide`]: a strategy plus how long to wait
/// before acting on it (zero for strategies with no inherent delay).
#[derive(Debug, Clone, PartialEq)]
pub struct RetryDecision {
    pub strategy: RetryStrategy,
    pub delay: Duration,
}

impl RetryDecision {
    fn now(strategy: RetryStrategy) -> Self {
        Self {
            strategy,
            delay: Duration::ZERO,
        }
    }
}

/// Truncation score: `1 - response_size / prompt_size`, capped to `[0, 1]`.
/// A `prompt_size` of zero is treated as score 0 (nothing to compare against).
pub fn truncation_score(prompt_size: usize, response_size: usize) -> f64 {
    if prompt_size == 0 {
        return 0.0;
    }
    let raw = 1.0 - (response_size as f64 / prompt_size as f64);
    raw.clamp(0.0, 1.0)
}

/// Exponential backoff with base 1s, factor 2, +-20% jitter, capped at 60s.
pub fn backoff_delay(attempt_number: u32) -> Duration {
    let base = 1.0_f64;
    let factor = 2.0_f64;
    let raw = base * factor.powi(attempt_number.saturating_sub(1) as i32);
    let capped = raw.min(60.0);
    let jitter_frac = rand::thread_rng().gen_range(-0.2..=0.2);
    let jittered = (capped * (1.0 + jitter_frac)).clamp(0.0, 60.0);
    Duration::from_secs_f64(jittered)
}

/// Decide the next action for a comment that just failed with `error_kind`.
/// `attempt_number` is 1-based (this is the Nth attempt that just failed).
pub fn decide(
    attempt_number: u32,
    error_kind: ErrorKind,
    prompt_size: usize,
    response_size: usize,
    max_retries: u32,
) -> RetryDecision {
    if attempt_number >= max_retries {
        return RetryDecision::now(RetryStrategy::GiveUp);
    }

    match error_kind {
        ErrorKind::AuthRequired => RetryDecision::now(RetryStrategy::GiveUp),
        ErrorKind::JsonTruncation => {
            let score = truncation_score(prompt_size, response_size);
            if score >= 0.9 {
                RetryDecision::now(RetryStrategy::ReducePromptAggressive)
            } else if prompt_size >= PROMPT_LARGE_THRESHOLD {
                RetryDecision::now(RetryStrategy::ReducePromptModerate)
            } else {
                RetryDecision::now(RetryStrategy::SimpleRetry)
            }
        }
        ErrorKind::JsonMalformed => {
            if attempt_number == 1 {
                RetryDecision::now(RetryStrategy::SimpleRetry)
            } else {
                RetryDecision::now(RetryStrategy::ReducePromptModerate)
            }
        }
        ErrorKind::RateLimit => RetryDecision {
            strategy: RetryStrategy::ExponentialBackoff,
            delay: backoff_delay(attempt_number),
        },
        ErrorKind::Timeout => {
            if attempt_number == 1 {
                RetryDecision::now(RetryStrategy::SimpleRetryDoubledDeadline)
            } else {
                RetryDecision::now(RetryStrategy::SimpleRetry)
            }
        }
        ErrorKind::JsonTypeMismatch
        | ErrorKind::JsonUnknown
        | ErrorKind::InvokeFailed
        | ErrorKind::PromptTooLarge
        | ErrorKind::StorageError => RetryDecision::now(RetryStrategy::SimpleRetry),
    }
}
