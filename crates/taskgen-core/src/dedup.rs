//! Groups near-duplicate tasks per comment, caps group size, and ranks the
//! final flattened list.

use crate::model::Task;
use std::collections::{HashMap, HashSet};

/// Jaccard similarity over case-folded, whitespace-split token sets.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let tokens = |s: &str| -> HashSet<String> {
        s.to_lowercase().split_whitespace().map(String::from).collect()
    };
    let ta = tokens(a);
    let tb = tokens(b);
    if ta.is_empty() && tb.is_empty() {
        return 1.0;
    }
    let intersection = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Deduplicate and rank `tasks`. When `deduplication_enabled` is false,
/// only the final ranking step runs.
pub fn dedup_and_rank(
    tasks: Vec<Task>,
    deduplication_enabled: bool,
    similarity_threshold: f64,
    max_tasks_per_comment: usize,
) -> Vec<Task> {
    let mut surviving = if deduplication_enabled {
        let grouped = group_by_comment(tasks);
        grouped
            .into_iter()
            .flat_map(|(_, group)| cap_group(collapse_near_duplicates(group, similarity_threshold), max_tasks_per_comment))
            .collect::<Vec<_>>()
    } else {
        tasks
    };

    surviving.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.task_index.cmp(&b.task_index)));
    surviving
}

fn group_by_comment(tasks: Vec<Task>) -> HashMap<i64, Vec<Task>> {
    let mut groups: HashMap<i64, Vec<Task>> = HashMap::new();
    for task in tasks {
        groups.entry(task.source_comment_id).or_default().push(task);
    }
    groups
}

/// Collapse near-duplicates within one comment's group: two tasks whose
/// descriptions score >= `threshold` are merged into one equivalence
/// class, keeping the highest-priority member (ties by smallest
/// `task_index`).
fn collapse_near_duplicates(group: Vec<Task>, threshold: f64) -> Vec<Task> {
    let mut representatives: Vec<Task> = Vec::new();

    'outer: for task in group {
        for rep in representatives.iter_mut() {
            if jaccard_similarity(&rep.description, &task.description) >= threshold {
                if better(&task, rep) {
                    *rep = task;
                }
                continue 'outer;
            }
        }
        representatives.push(task);
    }
    representatives
}

fn better(candidate: &Task, incumbent: &Task) -> bool {
    match candidate.priority.cmp(&incumbent.priority) {
        std::cmp::Ordering::Less => true,
        std::cmp::Ordering::Greater => false,
        std::cmp::Ordering::Equal => match candidate.task_index.cmp(&incumbent.task_index) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Greater => false,
            std::cmp::Ordering::Equal => candidate.description < incumbent.description,
        },
    }
}

fn cap_group(mut group: Vec<Task>, max: usize) -> Vec<Task> {
    if group.len() <= max {
        return group;
    }
    group.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.task_index.cmp(&b.task_index)));
    group.truncate(max);
    group
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Priority, TaskStatus};
    use chrono::Utc;

    fn task(task_index: u32, comment_id: i64, priority: Priority, description: &str) -> Task {
        Task {
            id: format!("t{task_index}"),
            description: description.to_string(),
            priority,
            origin_text: None,
            source_review_id: 1,
            source_comment_id: comment_id,
            file: None,
            line: None,
            task_index,
            status: TaskStatus::Todo,
            pr_number: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn jaccard_identical_strings_is_one() {
        assert_eq!(jaccard_similarity("fix the bug", "fix the bug"), 1.0);
    }

    #[test]
    fn jaccard_disjoint_strings_is_zero() {
        assert_eq!(jaccard_similarity("alpha beta", "gamma delta"), 0.0);
    }

    #[test]
    fn near_duplicates_collapse_keeping_higher_priority() {
        let tasks = vec![
            task(0, 1, Priority::Medium, "fix the null pointer bug in parser"),
            task(1, 1, Priority::High, "fix the null pointer bug in the parser"),
        ];
        let result = dedup_and_rank(tasks, true, 0.8, 2);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].priority, Priority::High);
    }

    #[test]
    fn distinct_descriptions_are_not_merged() {
        let tasks = vec![
            task(0, 1, Priority::Medium, "fix the null pointer bug"),
            task(1, 1, Priority::Medium, "add a missing unit test"),
        ];
        let result = dedup_and_rank(tasks, true, 0.8, 2);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn group_capped_to_max_tasks_per_comment() {
        let tasks = vec![
            task(0, 1, Priority::Low, "alpha task about something"),
            task(1, 1, Priority::Medium, "bravo task about something else"),
            task(2, 1, Priority::High, "charlie task about yet another thing"),
        ];
        let result = dedup_and_rank(tasks, true, 0.8, 2);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].priority, Priority::High);
    }

    #[test]
    fn rank_orders_by_priority_then_task_index() {
        let tasks = vec![
            task(1, 1, Priority::Low, "one"),
            task(0, 2, Priority::Critical, "two"),
            task(2, 3, Priority::Low, "three"),
        ];
        let result = dedup_and_rank(tasks, false, 0.8, 2);
        assert_eq!(result[0].priority, Priority::Critical);
        assert_eq!(result[1].task_index, 1);
        assert_eq!(result[2].task_index, 2);
    }

    #[test]
    fn disabled_dedup_skips_collapse_but_still_ranks() {
        let tasks = vec![
            task(0, 1, Priority::Medium, "same text same text"),
            task(1, 1, Priority::Medium, "same text same text"),
        ];
        let result = dedup_and_rank(tasks, false, 0.8, 2);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn dedup_is_idempotent_on_its_own_output() {
        let tasks = vec![
            task(0, 1, Priority::Medium, "fix the null pointer bug in parser"),
            task(1, 1, Priority::High, "fix the null pointer bug in the parser"),
            task(2, 2, Priority::Low, "totally unrelated task here"),
        ];
        let once = dedup_and_rank(tasks, true, 0.8, 2);
        let twice = dedup_and_rank(once.clone(), true, 0.8, 2);
        assert_eq!(once.len(), twice.len());
    }
}
