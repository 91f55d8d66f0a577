//! Builds the prompt text handed to the AI Invoker.

use crate::config::PromptProfile;
use crate::model::{CommentContext, TaskStatus};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Status glyph used when listing pre-existing tasks in a batched prompt.
/// Anything not covered by [`TaskStatus`] falls through to `•`.
pub fn status_glyph(status: TaskStatus) -> &'static str {
    status.glyph()
}

/// Builds prompts for either a single comment or a batch, in the selected
/// profile, in the user's configured language.
pub struct PromptBuilder {
    pub profile: PromptProfile,
    pub user_language: String,
    pub max_tasks_per_comment: usize,
    /// Optional on-disk directory to look for override templates in,
    /// named `<profile>.txt`. Falls back to the built-in template when the
    /// file is absent.
    pub template_dir: Option<std::path::PathBuf>,
}

impl PromptBuilder {
    pub fn new(profile: PromptProfile, user_language: impl Into<String>, max_tasks_per_comment: usize) -> Self {
        Self {
            profile,
            user_language: user_language.into(),
            max_tasks_per_comment,
            template_dir: None,
        }
    }

    pub fn with_template_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.template_dir = Some(dir.into());
        self
    }

    fn header(&self) -> String {
        if let Some(dir) = &self.template_dir {
            let name = match self.profile {
                PromptProfile::Legacy => "legacy.txt",
                PromptProfile::V2 => "v2.txt",
                PromptProfile::Compact => "compact.txt",
                PromptProfile::Minimal => "minimal.txt",
            };
            let path: &Path = &dir.join(name);
            if let Ok(contents) = fs::read_to_string(path) {
                return contents.replace("{language}", &self.user_language).replace(
                    "{max_tasks}",
                    &self.max_tasks_per_comment.to_string(),
                );
            }
        }
        self.builtin_header()
    }

    fn builtin_header(&self) -> String {
        let lang = &self.user_language;
        let cap = self.max_tasks_per_comment;
        match self.profile {
            PromptProfile::Legacy => format!(
                "You are reviewing source code comments. For each comment below, decide whether it \
                 describes actionable work. Write every task description in {lang}. Always include the \
                 original comment text verbatim in an `origin_text` field. Return your answer as a single \
                 JSON array of task objects and nothing else — no explanation, no markdown fence, no prose \
                 before or after the array. Propose at most {cap} tasks per comment.\n\n"
            ),
            PromptProfile::V2 => format!(
                "Task: read the review comments below and extract actionable engineering tasks.\n\
                 Rules:\n\
                 - Write each `description` in {lang}.\n\
                 - Copy the source comment text into `origin_text` unchanged.\n\
                 - Output ONLY a JSON array of task objects. No prose, no code fence.\n\
                 - At most {cap} tasks per comment.\n\n"
            ),
            PromptProfile::Compact => format!(
                "Extract tasks from the comments below. JSON array only. Descriptions in {lang}. \
                 Keep `origin_text` verbatim. Max {cap} tasks/comment.\n\n"
            ),
            PromptProfile::Minimal => format!(
                "Comments -> JSON array of tasks. Language: {lang}. Max {cap}/comment.\n\n"
            ),
        }
    }

    /// Build a prompt for a single comment.
    pub fn build_single(&self, ctx: &CommentContext) -> String {
        let mut out = self.header();
        self.write_comment(&mut out, ctx, false);
        out
    }

    /// Build a prompt covering a batch of comments, listing any
    /// pre-existing tasks for each so the assistant avoids duplicating
    /// already-completed work.
    pub fn build_batch(&self, contexts: &[CommentContext]) -> String {
        let mut out = self.header();
        for ctx in contexts {
            self.write_comment(&mut out, ctx, true);
        }
        out
    }

    fn write_comment(&self, out: &mut String, ctx: &CommentContext, show_existing: bool) {
        let c = &ctx.comment;
        let _ = writeln!(
            out,
            "- id={} file={}:{} author={}\n  body: {}",
            c.id, c.file_path, c.line, c.author, c.body
        );
        if show_existing && !ctx.existing_tasks.is_empty() {
            out.push_str("  existing tasks:\n");
            for task in &ctx.existing_tasks {
                let _ = writeln!(
                    out,
                    "    {} {}",
                    status_glyph(task.status),
                    task.description
                );
            }
        }
        out.push('\n');
    }
}
