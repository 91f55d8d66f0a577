//! Splits or compresses an oversized comment body so it fits a AI Invoker's
//! prompt budget.

use crate::model::Comment;

const TASK_VERBS: &[&str] = &[
    "fix", "add", "update", "remove", "change", "implement", "check", "should", "must", "need",
];

/// Split `comment`'s body into chunk-comments, each with a body under
/// `budget` characters. Metadata is duplicated on every chunk; `replies`
/// is attached to the first chunk only. Chunk bodies are prefixed with
/// `[Part k/N]`.
pub fn chunk(comment: &Comment, budget: usize) -> Vec<Comment> {
    if comment.body.chars().count() <= budget {
        return vec![comment.clone()];
    }

    let pieces = split_into_pieces(&comment.body, budget);
    let total = pieces.len();
    pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| Comment {
            id: comment.id,
            author: comment.author.clone(),
            file_path: comment.file_path.clone(),
            line: comment.line,
            body: format!("[Part {}/{}] {}", i + 1, total, piece),
            url: comment.url.clone(),
            replies: if i == 0 { comment.replies.clone() } else { Vec::new() },
            source_review_id: comment.source_review_id,
        })
        .collect()
}

fn split_into_pieces(text: &str, budget: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut pieces = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let remaining = chars.len() - start;
        if remaining <= budget {
            pieces.push(chars[start..].iter().collect());
            break;
        }
        let window_end = start + budget;
        let cut = find_break_point(&chars, start, window_end).unwrap_or(window_end);
        pieces.push(chars[start..cut].iter().collect::<String>().trim().to_string());
        start = cut;
    }
    pieces
}

/// Search `[start, window_end)` for the best break point, preferring (in
/// order) sentence terminators, paragraph/list markers, any newline, any
/// space. Only accepted if it falls in the second half of the window, to
/// avoid degenerate tiny chunks.
fn find_break_point(chars: &[char], start: usize, window_end: usize) -> Option<usize> {
    let window_end = window_end.min(chars.len());
    let half = start + (window_end - start) / 2;

    let mut best: Option<usize> = None;
    let mut record = |pos: usize, priority: u8, current_best: &mut Option<(usize, u8)>| {
        if pos < half {
            return;
        }
        match current_best {
            Some((_, best_priority)) if *best_priority <= priority => {}
            _ => *current_best = Some((pos, priority)),
        }
    };

    let mut ranked: Option<(usize, u8)> = None;
    for i in start..window_end {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        if matches!(c, '.' | '!' | '?') && matches!(next, Some(' ') | Some('\n')) {
            record(i + 1, 4, &mut ranked);
        } else if c == '\n' && matches!(next, Some('\n')) {
            record(i + 2, 3, &mut ranked);
        } else if c == '\n' && matches!(next, Some('-') | Some('*')) {
            record(i + 1, 3, &mut ranked);
        } else if c == '\n' {
            record(i + 1, 2, &mut ranked);
        } else if c == ' ' {
            record(i + 1, 1, &mut ranked);
        }
    }
    if let Some((pos, _)) = ranked {
        best = Some(pos);
    }
    best
}

/// Reduce a comment body to a shorter form that retains actionable
/// clauses. Guaranteed to be no longer than `ceiling` chars and strictly
/// shorter than the input (when the input exceeds `ceiling`).
pub fn summarize(body: &str, ceiling: usize) -> String {
    if body.chars().count() <= ceiling {
        return body.to_string();
    }

    let sentences: Vec<&str> = body
        .split(|c| c == '.' || c == '\n')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if sentences.is_empty() {
        return hard_truncate(body, ceiling);
    }

    let mut kept: Vec<&str> = sentences
        .iter()
        .filter(|s| {
            let lower = s.to_lowercase();
            TASK_VERBS.iter().any(|v| lower.contains(v))
        })
        .copied()
        .collect();

    if kept.is_empty() {
        kept.push(sentences[0]);
        if sentences.len() > 1 {
            kept.push(sentences[sentences.len() - 1]);
        }
    }

    let joined = kept.join(". ");
    if joined.chars().count() <= ceiling {
        joined
    } else {
        hard_truncate(&joined, ceiling)
    }
}

fn hard_truncate(text: &str, ceiling: usize) -> String {
    text.chars().take(ceiling).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(body: &str) -> Comment {
        Comment {
            id: 1,
            author: "bob".into(),
            file_path: "a.rs".into(),
            line: 1,
            body: body.to_string(),
            url: None,
            replies: vec!["thanks".to_string()],
            source_review_id: 1,
        }
    }

    #[test]
    fn body_at_threshold_is_not_chunked() {
        let body = "a".repeat(50);
        let c = comment(&body);
        let chunks = chunk(&c, 50);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].body, body);
    }

    #[test]
    fn body_over_threshold_is_chunked() {
        let body = "a".repeat(51);
        let c = comment(&body);
        let chunks = chunk(&c, 50);
        assert!(chunks.len() > 1);
    }

    #[test]
    fn chunking_prefixes_each_part_and_preserves_replies_on_first_only() {
        let body = "This is sentence one. This is sentence two. This is sentence three that is a bit longer than the rest of the text here.";
        let c = comment(body);
        let chunks = chunk(&c, 40);
        assert!(chunks.len() > 1);
        for (i, ch) in chunks.iter().enumerate() {
            assert!(ch.body.starts_with(&format!("[Part {}/", i + 1)));
        }
        assert!(!chunks[0].replies.is_empty());
        assert!(chunks[1].replies.is_empty());
    }

    #[test]
    fn chunk_reassembly_matches_original_modulo_whitespace() {
        let body = "Sentence one is here. Sentence two follows after. And a third one to push well past the budget threshold for this particular test case.";
        let c = comment(body);
        let chunks = chunk(&c, 40);
        let reassembled: String = chunks
            .iter()
            .map(|c| {
                let stripped = c.body.splitn(2, "] ").nth(1).unwrap_or(&c.body);
                stripped.to_string()
            })
            .collect::<Vec<_>>()
            .join(" ");
        let normalize = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ");
        assert_eq!(normalize(&reassembled), normalize(body));
    }

    #[test]
    fn summarize_below_ceiling_is_unchanged() {
        let body = "Short body.";
        assert_eq!(summarize(body, 100), body);
    }

    #[test]
    fn summarize_above_ceiling_is_shorter_and_keeps_actionable_clause() {
        let body = "This comment just provides background context that goes on for a while and does not ask for anything in particular. You should fix the null check here though. Thanks for reading all of this.";
        let out = summarize(body, 80);
        assert!(out.len() < body.len());
        assert!(out.to_lowercase().contains("fix"));
    }
}
