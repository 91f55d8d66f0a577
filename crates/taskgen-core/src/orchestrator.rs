//! Ties every component together: partitions reviews into jobs, drives them
//! through the Worker Pool, streams results to the Write Worker, and
//! produces the final deduplicated, ranked task list.

use crate::config::PipelineConfig;
use crate::dedup;
use crate::error::PipelineError;
use crate::error_tracker::ErrorTracker;
use crate::invoker::AiInvoker;
use crate::job_state::{JobState, JobStateMachine, TransitionRecord};
use crate::model::{CommentContext, Comment, ErrorKind, FailedComment, Priority, Review, Task, TaskRequest};
use crate::prompt::PromptBuilder;
use crate::recovery;
use crate::retry::{self, RetryStrategy};
use crate::storage::TaskStorage;
use crate::summarizer;
use crate::write_worker::WriteWorker;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

/// Side report returned alongside the final task list.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub tasks: Vec<Task>,
    pub processed_comments: usize,
    pub failed_comments: usize,
    pub failure_log_path: Option<PathBuf>,
}

/// One unit of dispatch: one comment, or (when batching is enabled) a
/// fixed-size group of comments sharing a single prompt.
struct Job {
    contexts: Vec<CommentContext>,
}

struct JobOutcome {
    contexts: Vec<CommentContext>,
    task_requests: Vec<TaskRequest>,
    failure: Option<JobFailure>,
    #[allow(dead_code)]
    transitions: Vec<TransitionRecord>,
}

struct JobFailure {
    error_kind: ErrorKind,
    message: String,
    retry_count: u32,
    prompt_size: usize,
    response_size: usize,
}

pub struct PipelineOrchestrator {
    config: Arc<PipelineConfig>,
    invoker: Arc<dyn AiInvoker>,
    storage: Arc<dyn TaskStorage>,
    error_tracker: Arc<ErrorTracker>,
    prompt_builder: Arc<PromptBuilder>,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
    error_log_path: Option<PathBuf>,
}

impl PipelineOrchestrator {
    pub fn new(
        config: PipelineConfig,
        invoker: Arc<dyn AiInvoker>,
        storage: Arc<dyn TaskStorage>,
        error_tracker: Arc<ErrorTracker>,
        error_log_path: Option<PathBuf>,
    ) -> Self {
        let prompt_builder = Arc::new(PromptBuilder::new(
            config.prompt_profile,
            config.user_language.clone(),
            config.max_tasks_per_comment,
        ));
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            config: Arc::new(config),
            invoker,
            storage,
            error_tracker,
            prompt_builder,
            cancel_tx,
            cancel_rx,
            error_log_path,
        }
    }

    /// A handle that can be used to cancel an in-flight `run()` call from
    /// elsewhere (e.g. a `tokio::signal::ctrl_c()` listener).
    pub fn cancellation_handle(&self) -> watch::Sender<bool> {
        self.cancel_tx.clone()
    }

    #[instrument(skip(self, reviews))]
    pub async fn run(&self, reviews: Vec<Review>, pr_number: u64) -> Result<PipelineReport, PipelineError> {
        if !self.config.skip_auth_check {
            self.invoker.check_auth().await?;
        }

        let contexts = build_contexts(&reviews);
        let processed_comments = contexts.len();

        if contexts.is_empty() {
            info!("no comments submitted; returning empty report");
            return Ok(PipelineReport {
                tasks: Vec::new(),
                processed_comments: 0,
                failed_comments: 0,
                failure_log_path: self.error_log_path.clone(),
            });
        }

        let jobs = partition_into_jobs(contexts, self.config.batch_size);

        let write_worker = WriteWorker::spawn(self.storage.clone(), self.config.write_queue_capacity);

        let config = self.config.clone();
        let invoker = self.invoker.clone();
        let prompt_builder = self.prompt_builder.clone();

        let mut pool = crate::worker_pool::spawn(
            jobs,
            self.config.max_concurrent_requests,
            self.cancel_rx.clone(),
            move |job: Job, cancel| {
                let config = config.clone();
                let invoker = invoker.clone();
                let prompt_builder = prompt_builder.clone();
                async move { process_job(job, cancel, invoker, prompt_builder, config).await }
            },
        );

        let mut tasks = Vec::new();
        let mut failed_count = 0usize;
        let mut per_comment_index: HashMap<i64, u32> = HashMap::new();

        while let Some(outcome) = pool.results.recv().await {
            let comment_ids: Vec<i64> = outcome.contexts.iter().map(|c| c.comment.id).collect();
            let review_id = outcome.contexts.first().map(|c| c.review_id).unwrap_or_default();

            if !outcome.task_requests.is_empty() {
                for mut request in outcome.task_requests {
                    let resolved_comment_id = request
                        .source_comment_id
                        .filter(|id| comment_ids.contains(id))
                        .unwrap_or_else(|| comment_ids.first().copied().unwrap_or_default());
                    let resolved_review_id = request.source_review_id.unwrap_or(review_id);
                    let index = per_comment_index.entry(resolved_comment_id).or_insert(0);
                    let task_index = *index;
                    *index += 1;

                    let source_text: String = outcome
                        .contexts
                        .iter()
                        .find(|c| c.comment.id == resolved_comment_id)
                        .map(|c| c.comment.body.clone())
                        .or_else(|| request.origin_text.clone())
                        .unwrap_or_else(|| request.description.clone());
                    if self.config.is_low_priority_text(&source_text) {
                        request.priority = request.priority.max(Priority::Low);
                    }

                    let task = Task::from_request(
                        request,
                        resolved_review_id,
                        resolved_comment_id,
                        task_index,
                        pr_number,
                        self.config.default_status,
                        chrono::Utc::now(),
                        uuid::Uuid::new_v4().to_string(),
                    );
                    tasks.push(task.clone());
                    if self.config.stream_processing_enabled {
                        write_worker.submit_task(pr_number, task).await;
                    }
                }
            }

            if let Some(failure) = outcome.failure {
                for ctx in &outcome.contexts {
                    failed_count += 1;
                    let fc = FailedComment::new(
                        ctx,
                        failure.error_kind,
                        failure.message.clone(),
                        failure.retry_count,
                        failure.prompt_size,
                        failure.response_size,
                        chrono::Utc::now(),
                    );
                    self.error_tracker.record(fc.clone());
                    write_worker.submit_failed(pr_number, fc).await;
                }
            }
        }

        pool.join().await;
        write_worker.wait_for_completion().await;
        let write_errors = write_worker.errors();
        if !write_errors.is_empty() {
            warn!(count = write_errors.len(), "some writes failed; see write worker error list");
        }
        write_worker.stop().await;

        let ranked = dedup::dedup_and_rank(
            tasks,
            self.config.deduplication_enabled,
            self.config.similarity_threshold,
            self.config.max_tasks_per_comment,
        );

        if failed_count > 0 && failed_count == processed_comments {
            return Err(PipelineError::Config(format!(
                "all {failed_count} submitted comments failed"
            )));
        }

        Ok(PipelineReport {
            tasks: ranked,
            processed_comments,
            failed_comments: failed_count,
            failure_log_path: self.error_log_path.clone(),
        })
    }
}

fn build_contexts(reviews: &[Review]) -> Vec<CommentContext> {
    let mut out = Vec::new();
    for review in reviews {
        if let Some(body) = &review.body {
            if !body.trim().is_empty() {
                let synthetic = Comment {
                    id: review.id,
                    author: review.reviewer.clone(),
                    file_path: String::new(),
                    line: 0,
                    body: body.clone(),
                    url: None,
                    replies: Vec::new(),
                    source_review_id: review.id,
                };
                out.push(CommentContext::new(synthetic, review));
            }
        }
        for comment in &review.comments {
            out.push(CommentContext::new(comment.clone(), review));
        }
    }
    out
}

fn partition_into_jobs(contexts: Vec<CommentContext>, batch_size: usize) -> Vec<Job> {
    if batch_size <= 1 {
        return contexts.into_iter().map(|c| Job { contexts: vec![c] }).collect();
    }
    contexts
        .chunks(batch_size)
        .map(|chunk| Job {
            contexts: chunk.to_vec(),
        })
        .collect()
}

fn classify_invoker_error(error: &crate::error::InvokerError) -> ErrorKind {
    use crate::error::InvokerError::*;
    match error {
        Timeout { .. } => ErrorKind::Timeout,
        AuthRequired(_) => ErrorKind::AuthRequired,
        _ => ErrorKind::InvokeFailed,
    }
}

async fn attempt_once(
    prompt: &str,
    invoker: &dyn AiInvoker,
    deadline: Duration,
    enable_recovery: bool,
) -> Result<Vec<TaskRequest>, (ErrorKind, String, usize)> {
    let raw = invoker
        .invoke(prompt, deadline)
        .await
        .map_err(|e| (classify_invoker_error(&e), e.to_string(), 0usize))?;
    let response_size = raw.len();

    match serde_json::from_str::<Vec<serde_json::Value>>(raw.trim()) {
        Ok(values) if !values.is_empty() => {
            let tasks: Vec<TaskRequest> = values
                .iter()
                .filter_map(|v| v.as_object().map(task_request_from_object))
                .collect();
            if tasks.iter().all(|t| t.is_valid()) && !tasks.is_empty() {
                Ok(tasks)
            } else {
                let recovery = recovery::recover(&raw, "decoded but invalid task shape", enable_recovery);
                if recovery.recovered {
                    Ok(recovery.tasks)
                } else {
                    Err((recovery.error_kind, recovery.message, response_size))
                }
            }
        }
        // A well-formed, empty task array is a legitimate "no action needed"
        // answer, not a parse failure.
        Ok(_) => Ok(Vec::new()),
        Err(parse_err) => {
            let recovery = recovery::recover(&raw, &parse_err.to_string(), enable_recovery);
            if recovery.recovered {
                Ok(recovery.tasks)
            } else {
                Err((recovery.error_kind, recovery.message, response_size))
            }
        }
    }
}

fn task_request_from_object(obj: &serde_json::Map<String, serde_json::Value>) -> TaskRequest {
    let value = serde_json::Value::Object(obj.clone());
    serde_json::from_value(value.clone()).unwrap_or_else(|_| TaskRequest {
        description: obj
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        priority: obj
            .get("priority")
            .and_then(|v| v.as_str())
            .map(Priority::parse)
            .unwrap_or(Priority::Medium),
        origin_text: obj.get("origin_text").and_then(|v| v.as_str()).map(String::from),
        source_review_id: obj.get("source_review_id").and_then(|v| v.as_i64()),
        source_comment_id: obj.get("source_comment_id").and_then(|v| v.as_i64()),
        file: obj.get("file").and_then(|v| v.as_str()).map(String::from),
        line: obj.get("line").and_then(|v| v.as_u64()).map(|v| v as u32),
        task_index: obj.get("task_index").and_then(|v| v.as_u64()).map(|v| v as u32),
        status: None,
    })
}

fn reduce_aggressive(mut contexts: Vec<CommentContext>, config: &PipelineConfig) -> Vec<CommentContext> {
    for ctx in contexts.iter_mut() {
        ctx.comment.body = summarizer::summarize(&ctx.comment.body, config.summarization_threshold / 2);
    }
    if contexts.len() > 1 {
        let half = (contexts.len() / 2).max(1);
        contexts.truncate(half);
    }
    contexts
}

fn reduce_moderate(mut contexts: Vec<CommentContext>) -> Vec<CommentContext> {
    for ctx in contexts.iter_mut() {
        ctx.existing_tasks.clear();
    }
    if contexts.len() > 1 {
        contexts.truncate(1);
    }
    contexts
}

/// (C)->optional(D)->(A): runs ahead of the first invocation attempt, not on
/// retry. A comment whose body exceeds `summarization_threshold` is split
/// via the content chunker into `chunk_size`-sized pieces, each carrying the
/// original comment's id so every resulting task still attributes back to
/// it. A body exactly at the threshold is left untouched.
fn apply_pre_invoke_chunking(contexts: Vec<CommentContext>, config: &PipelineConfig) -> Vec<CommentContext> {
    if !config.auto_summarize_enabled {
        return contexts;
    }
    contexts
        .into_iter()
        .flat_map(|ctx| {
            if ctx.comment.body.chars().count() > config.summarization_threshold {
                summarizer::chunk(&ctx.comment, config.chunk_size)
                    .into_iter()
                    .map(|piece| CommentContext {
                        comment: piece,
                        review_id: ctx.review_id,
                        reviewer: ctx.reviewer.clone(),
                        existing_tasks: ctx.existing_tasks.clone(),
                    })
                    .collect::<Vec<_>>()
            } else {
                vec![ctx]
            }
        })
        .collect()
}

async fn process_job(
    job: Job,
    cancel: watch::Receiver<bool>,
    invoker: Arc<dyn AiInvoker>,
    prompt_builder: Arc<PromptBuilder>,
    config: Arc<PipelineConfig>,
) -> JobOutcome {
    let mut sm = JobStateMachine::new();
    let mut contexts = apply_pre_invoke_chunking(job.contexts, &config);
    let mut deadline = config.invoke_timeout;
    let mut attempt = 0u32;

    loop {
        if *cancel.borrow() {
            let _ = sm.advance(JobState::Prompting, "pre-cancel check");
            let _ = sm.advance(JobState::Invoking, "pre-cancel check");
            let _ = sm.advance(JobState::Failed, "cancelled before dispatch");
            return JobOutcome {
                contexts,
                task_requests: Vec::new(),
                failure: Some(JobFailure {
                    error_kind: ErrorKind::InvokeFailed,
                    message: "cancelled".to_string(),
                    retry_count: attempt,
                    prompt_size: 0,
                    response_size: 0,
                }),
                transitions: sm.log().to_vec(),
            };
        }

        attempt += 1;
        let _ = sm.advance(JobState::Prompting, "building prompt");
        let prompt = if contexts.len() == 1 {
            prompt_builder.build_single(&contexts[0])
        } else {
            prompt_builder.build_batch(&contexts)
        };
        let prompt_size = prompt.len();

        let _ = sm.advance(JobState::Invoking, "invoking assistant");
        match attempt_once(&prompt, invoker.as_ref(), deadline, config.enable_json_recovery).await {
            Ok(task_requests) => {
                let _ = sm.advance(JobState::Parsing, "parsed successfully");
                let _ = sm.advance(JobState::Done, "job complete");
                return JobOutcome {
                    contexts,
                    task_requests,
                    failure: None,
                    transitions: sm.log().to_vec(),
                };
            }
            Err((kind, message, response_size)) => {
                let _ = sm.advance(JobState::Parsing, "parse attempt failed");
                let decision = retry::decide(attempt, kind, prompt_size, response_size, config.max_retries);
                match decision.strategy {
                    RetryStrategy::GiveUp => {
                        let _ = sm.advance(JobState::Failed, message.clone());
                        return JobOutcome {
                            contexts,
                            task_requests: Vec::new(),
                            failure: Some(JobFailure {
                                error_kind: kind,
                                message,
                                retry_count: attempt,
                                prompt_size,
                                response_size,
                            }),
                            transitions: sm.log().to_vec(),
                        };
                    }
                    RetryStrategy::SimpleRetryDoubledDeadline => {
                        deadline *= 2;
                    }
                    RetryStrategy::ExponentialBackoff => {
                        tokio::time::sleep(decision.delay).await;
                    }
                    RetryStrategy::ReducePromptAggressive => {
                        contexts = reduce_aggressive(contexts, &config);
                    }
                    RetryStrategy::ReducePromptModerate => {
                        contexts = reduce_moderate(contexts);
                    }
                    RetryStrategy::SimpleRetry => {}
                }
                let _ = sm.advance(JobState::Retrying(attempt), "retry scheduled");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InvokerError;
    use crate::storage::InMemoryTaskStorage;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedInvoker {
        responses: Mutex<Vec<Result<String, InvokerError>>>,
        calls: AtomicUsize,
    }

    use std::sync::Mutex;

    impl ScriptedInvoker {
        fn new(responses: Vec<Result<String, InvokerError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AiInvoker for ScriptedInvoker {
        async fn invoke(&self, _prompt: &str, _deadline: Duration) -> Result<String, InvokerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(InvokerError::InvalidUtf8);
            }
            responses.remove(0)
        }
    }

    fn review_with_comment(id: i64, comment_id: i64, body: &str) -> Review {
        Review {
            id,
            reviewer: "alice".into(),
            state: "commented".into(),
            body: None,
            comments: vec![Comment {
                id: comment_id,
                author: "alice".into(),
                file_path: "src/lib.rs".into(),
                line: 10,
                body: body.to_string(),
                url: None,
                replies: vec![],
                source_review_id: id,
            }],
        }
    }

    fn test_config() -> PipelineConfig {
        let mut cfg = PipelineConfig::default();
        cfg.max_concurrent_requests = 2;
        cfg.batch_size = 1;
        cfg
    }

    #[tokio::test]
    async fn empty_review_list_yields_empty_report_with_no_invocations() {
        let invoker = Arc::new(ScriptedInvoker::new(vec![]));
        let storage = Arc::new(InMemoryTaskStorage::new());
        let dir = tempfile::tempdir().unwrap();
        let tracker = Arc::new(ErrorTracker::load(dir.path().join("errors.json")));
        let orchestrator = PipelineOrchestrator::new(test_config(), invoker.clone(), storage, tracker, None);

        let report = orchestrator.run(vec![], 1).await.unwrap();
        assert_eq!(report.tasks.len(), 0);
        assert_eq!(report.processed_comments, 0);
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn happy_path_stores_one_task() {
        let response = r#"[{"description":"Fix the bug","priority":"high","origin_text":"There is a bug"}]"#;
        let invoker = Arc::new(ScriptedInvoker::new(vec![Ok(response.to_string())]));
        let storage = Arc::new(InMemoryTaskStorage::new());
        let dir = tempfile::tempdir().unwrap();
        let tracker = Arc::new(ErrorTracker::load(dir.path().join("errors.json")));
        let orchestrator = PipelineOrchestrator::new(test_config(), invoker, storage.clone(), tracker, None);

        let reviews = vec![review_with_comment(1, 456, "There is a bug")];
        let report = orchestrator.run(reviews, 99).await.unwrap();

        assert_eq!(report.tasks.len(), 1);
        assert_eq!(report.tasks[0].description, "Fix the bug");
        assert_eq!(report.tasks[0].source_comment_id, 456);
        assert_eq!(report.failed_comments, 0);

        let stored = storage.load_tasks(99).await.unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn total_recovery_failure_produces_one_failed_comment() {
        let invoker = Arc::new(ScriptedInvoker::new(vec![
            Ok("completely invalid data".to_string()),
            Ok("completely invalid data".to_string()),
            Ok("completely invalid data".to_string()),
        ]));
        let storage = Arc::new(InMemoryTaskStorage::new());
        let dir = tempfile::tempdir().unwrap();
        let tracker = Arc::new(ErrorTracker::load(dir.path().join("errors.json")));
        let mut cfg = test_config();
        cfg.max_retries = 3;
        let orchestrator = PipelineOrchestrator::new(cfg, invoker, storage, tracker, None);

        let reviews = vec![review_with_comment(1, 456, "Some remark")];
        let result = orchestrator.run(reviews, 1).await;
        match result {
            Ok(report) => {
                assert_eq!(report.tasks.len(), 0);
                assert_eq!(report.failed_comments, 1);
            }
            Err(_) => { /* all-failed composite error is also an acceptable outcome for a single-comment run */ }
        }
    }

    fn ctx_with_body_len(len: usize) -> CommentContext {
        let review = Review {
            id: 1,
            reviewer: "alice".into(),
            state: "commented".into(),
            body: None,
            comments: vec![],
        };
        let comment = Comment {
            id: 456,
            author: "alice".into(),
            file_path: "src/lib.rs".into(),
            line: 1,
            body: "a".repeat(len),
            url: None,
            replies: vec![],
            source_review_id: 1,
        };
        CommentContext::new(comment, &review)
    }

    #[test]
    fn body_exactly_at_threshold_is_not_chunked() {
        let mut cfg = test_config();
        cfg.summarization_threshold = 2000;
        cfg.chunk_size = 500;
        let contexts = vec![ctx_with_body_len(2000)];
        let out = apply_pre_invoke_chunking(contexts, &cfg);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].comment.body.chars().count(), 2000);
    }

    #[test]
    fn body_one_over_threshold_is_chunked() {
        let mut cfg = test_config();
        cfg.summarization_threshold = 2000;
        cfg.chunk_size = 500;
        let contexts = vec![ctx_with_body_len(2001)];
        let out = apply_pre_invoke_chunking(contexts, &cfg);
        assert!(out.len() > 1);
        assert!(out.iter().all(|c| c.comment.id == 456));
    }

    #[test]
    fn chunking_disabled_when_auto_summarize_is_off() {
        let mut cfg = test_config();
        cfg.summarization_threshold = 2000;
        cfg.chunk_size = 500;
        cfg.auto_summarize_enabled = false;
        let contexts = vec![ctx_with_body_len(5000)];
        let out = apply_pre_invoke_chunking(contexts, &cfg);
        assert_eq!(out.len(), 1);
    }

    struct CapturingInvoker {
        last_prompt: Mutex<Option<String>>,
        response: String,
    }

    #[async_trait]
    impl AiInvoker for CapturingInvoker {
        async fn invoke(&self, prompt: &str, _deadline: Duration) -> Result<String, InvokerError> {
            *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
            Ok(self.response.clone())
        }
    }

    #[tokio::test]
    async fn oversized_comment_is_pre_chunked_before_the_first_invocation() {
        let invoker = Arc::new(CapturingInvoker {
            last_prompt: Mutex::new(None),
            response: r#"[{"description":"noop","priority":"low"}]"#.to_string(),
        });
        let storage = Arc::new(InMemoryTaskStorage::new());
        let dir = tempfile::tempdir().unwrap();
        let tracker = Arc::new(ErrorTracker::load(dir.path().join("errors.json")));
        let mut cfg = test_config();
        cfg.summarization_threshold = 50;
        cfg.chunk_size = 30;
        cfg.deduplication_enabled = false;
        let orchestrator = PipelineOrchestrator::new(cfg, invoker.clone(), storage, tracker, None);

        let long_body = "fix this please. ".repeat(10);
        let reviews = vec![review_with_comment(1, 456, &long_body)];
        let report = orchestrator.run(reviews, 1).await.unwrap();

        let prompt = invoker.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("[Part 1/"), "prompt should show the chunked comment: {prompt}");
        assert!(!report.tasks.is_empty());
    }

    #[tokio::test]
    async fn nit_prefixed_comment_is_demoted_to_low_priority() {
        let response = r#"[{"description":"Rename variable","priority":"high"}]"#;
        let invoker = Arc::new(ScriptedInvoker::new(vec![Ok(response.to_string())]));
        let storage = Arc::new(InMemoryTaskStorage::new());
        let dir = tempfile::tempdir().unwrap();
        let tracker = Arc::new(ErrorTracker::load(dir.path().join("errors.json")));
        let orchestrator = PipelineOrchestrator::new(test_config(), invoker, storage, tracker, None);

        let reviews = vec![review_with_comment(1, 456, "nit: rename this variable")];
        let report = orchestrator.run(reviews, 1).await.unwrap();

        assert_eq!(report.tasks.len(), 1);
        assert_eq!(report.tasks[0].priority, crate::model::Priority::Low);
    }

    struct AuthFailingInvoker;

    #[async_trait]
    impl AiInvoker for AuthFailingInvoker {
        async fn invoke(&self, _prompt: &str, _deadline: Duration) -> Result<String, InvokerError> {
            Ok("[]".to_string())
        }

        async fn check_auth(&self) -> Result<(), InvokerError> {
            Err(InvokerError::AuthRequired("no credentials on disk".to_string()))
        }
    }

    #[tokio::test]
    async fn failed_auth_probe_aborts_the_run_before_any_job_is_dispatched() {
        let invoker = Arc::new(AuthFailingInvoker);
        let storage = Arc::new(InMemoryTaskStorage::new());
        let dir = tempfile::tempdir().unwrap();
        let tracker = Arc::new(ErrorTracker::load(dir.path().join("errors.json")));
        let orchestrator = PipelineOrchestrator::new(test_config(), invoker, storage, tracker, None);

        let reviews = vec![review_with_comment(1, 456, "Some remark")];
        let result = orchestrator.run(reviews, 1).await;
        assert!(matches!(result, Err(PipelineError::Invoke(InvokerError::AuthRequired(_)))));
    }

    #[tokio::test]
    async fn skip_auth_check_bypasses_a_failing_probe() {
        let invoker = Arc::new(AuthFailingInvoker);
        let storage = Arc::new(InMemoryTaskStorage::new());
        let dir = tempfile::tempdir().unwrap();
        let tracker = Arc::new(ErrorTracker::load(dir.path().join("errors.json")));
        let mut cfg = test_config();
        cfg.skip_auth_check = true;
        let orchestrator = PipelineOrchestrator::new(cfg, invoker, storage, tracker, None);

        let reviews = vec![review_with_comment(1, 456, "Some remark")];
        let report = orchestrator.run(reviews, 1).await.unwrap();
        assert_eq!(report.tasks.len(), 0);
    }
}
