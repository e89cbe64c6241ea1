//! Label construction and reconciliation.
//!
//! Every migrated issue carries a `jira:<KEY>` label, which is what makes
//! re-runs idempotent: it is the lookup key for existing issues. Status,
//! priority and type labels are "managed": updates replace them while
//! leaving any other label on the issue alone.

use crate::types::JiraIssue;

/// Label present on every migrated issue.
pub const MIGRATED_LABEL: &str = "migrated-from-jira";

/// Label prefixes owned by the migration; stale ones are removed on update.
pub const MANAGED_PREFIXES: &[&str] = &["status:", "priority:", "type:"];

/// The unique lookup label for a source issue key.
#[must_use]
pub fn lookup_label(jira_key: &str) -> String {
    format!("jira:{jira_key}")
}

/// Normalizes text into a valid label fragment: lowercase, whitespace runs
/// collapsed to single hyphens. `None` becomes "unknown".
#[must_use]
pub fn normalize_label(text: Option<&str>) -> String {
    match text {
        Some(t) if !t.trim().is_empty() => t
            .trim()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-"),
        _ => "unknown".to_string(),
    }
}

/// Deterministic color for a label, keyed by prefix.
#[must_use]
pub fn label_color(label: &str) -> &'static str {
    if label.starts_with("jira:") {
        "0052CC"
    } else if label.starts_with("status:") {
        "0E8A16"
    } else if label.starts_with("priority:1") {
        "B60205"
    } else if label.starts_with("priority:2") {
        "D93F0B"
    } else if label.starts_with("priority:3") {
        "FBCA04"
    } else if label.starts_with("priority:4") {
        "0E8A16"
    } else if label.starts_with("priority:5") {
        "C2E0C6"
    } else if label.starts_with("type:") {
        "1D76DB"
    } else if label == MIGRATED_LABEL {
        "5319E7"
    } else {
        "ededed"
    }
}

/// Builds the managed status/priority/type labels for an issue.
#[must_use]
pub fn managed_labels(issue: &JiraIssue) -> Vec<String> {
    let mut labels = Vec::new();

    if let Some(status) = &issue.fields.status {
        labels.push(format!("status:{}", normalize_label(Some(&status.name))));
    }
    if let Some(priority) = &issue.fields.priority {
        labels.push(format!(
            "priority:{}",
            normalize_label(Some(priority.name()))
        ));
    }
    if let Some(issuetype) = &issue.fields.issuetype {
        labels.push(format!("type:{}", normalize_label(Some(&issuetype.name))));
    }

    labels
}

/// Builds the full label set applied at creation time.
#[must_use]
pub fn creation_labels(issue: &JiraIssue) -> Vec<String> {
    let mut labels = vec![MIGRATED_LABEL.to_string(), lookup_label(&issue.key)];
    labels.extend(managed_labels(issue));
    labels
}

/// Whether a label is inside the managed prefixes.
#[must_use]
pub fn is_managed(label: &str) -> bool {
    MANAGED_PREFIXES.iter().any(|p| label.starts_with(p))
}

/// Diffs an issue's current labels against the desired managed set.
///
/// Returns `(to_remove, to_add)`. Labels outside the managed prefixes are
/// never touched.
#[must_use]
pub fn diff_labels(current: &[String], desired: &[String]) -> (Vec<String>, Vec<String>) {
    let to_remove = current
        .iter()
        .filter(|label| is_managed(label) && !desired.contains(label))
        .cloned()
        .collect();

    let to_add = desired
        .iter()
        .filter(|label| !current.contains(label))
        .cloned()
        .collect();

    (to_remove, to_add)
}
