//! Per-issue outcomes and the run report.
//!
//! Every issue produces exactly one [`MigrationResult`]; the orchestrator
//! folds them into a [`MigrationReport`] that is printed as a summary and,
//! outside dry-run, persisted to disk as the audit artifact of the run.

use serde::Serialize;
use std::path::Path;

use crate::types::GithubIssueRef;

/// Outcome of migrating a single issue.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationResult {
    /// Source issue key.
    pub jira_key: String,

    /// Source issue URL.
    pub jira_url: String,

    /// Destination issue, when create/update got that far.
    pub github_issue: Option<GithubIssueRef>,

    /// Whether the core create/update succeeded. Downstream step failures
    /// (board, linking, comments, attachments) do not clear this.
    pub success: bool,

    /// Error message when the issue failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Attachments uploaded to the destination issue.
    pub attachments_uploaded: usize,

    /// Comments posted to the destination issue.
    pub comments_added: usize,

    /// True when an existing issue was updated rather than created.
    pub updated: bool,

    /// Whether the source issue is an epic.
    pub is_epic: bool,

    /// Parent epic key when the issue was linked to its parent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_to_epic: Option<String>,

    /// Story points written to the board estimate field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimate_set: Option<f64>,
}

impl MigrationResult {
    /// A fresh, not-yet-successful result for an issue.
    #[must_use]
    pub fn new(jira_key: String, jira_url: String, is_epic: bool) -> Self {
        Self {
            jira_key,
            jira_url,
            github_issue: None,
            success: false,
            error: None,
            attachments_uploaded: 0,
            comments_added: 0,
            updated: false,
            is_epic,
            linked_to_epic: None,
            estimate_set: None,
        }
    }
}

/// Aggregate report for a complete run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    /// Run start, RFC 3339.
    pub started_at: String,

    /// Run end, RFC 3339. Empty until [`MigrationReport::finish`].
    pub completed_at: String,

    /// Issues in scope for this run.
    pub total_issues: usize,

    /// Issues whose create/update succeeded.
    pub successful_migrations: usize,

    /// Issues whose create/update failed.
    pub failed_migrations: usize,

    /// Issues created new.
    pub created_count: usize,

    /// Issues updated in place.
    pub updated_count: usize,

    /// Epics migrated successfully.
    pub epics_created: usize,

    /// Children linked to a parent epic.
    pub children_linked: usize,

    /// Successful children with no linked parent.
    pub orphans_created: usize,

    /// Comments posted across all issues.
    pub total_comments_added: usize,

    /// Attachments uploaded across all issues.
    pub total_attachments_uploaded: usize,

    /// Per-issue results in processing order.
    pub results: Vec<MigrationResult>,
}

impl MigrationReport {
    /// Starts a report for `total_issues` issues.
    #[must_use]
    pub fn new(total_issues: usize) -> Self {
        Self {
            started_at: chrono::Utc::now().to_rfc3339(),
            completed_at: String::new(),
            total_issues,
            successful_migrations: 0,
            failed_migrations: 0,
            created_count: 0,
            updated_count: 0,
            epics_created: 0,
            children_linked: 0,
            orphans_created: 0,
            total_comments_added: 0,
            total_attachments_uploaded: 0,
            results: Vec::new(),
        }
    }

    /// Folds one per-issue result into the totals.
    pub fn record(&mut self, result: MigrationResult) {
        if result.success {
            self.successful_migrations += 1;

            if result.is_epic {
                self.epics_created += 1;
            } else if result.linked_to_epic.is_some() {
                self.children_linked += 1;
            } else {
                self.orphans_created += 1;
            }

            if result.updated {
                self.updated_count += 1;
            } else {
                self.created_count += 1;
            }
        } else {
            self.failed_migrations += 1;
        }

        self.total_comments_added += result.comments_added;
        self.total_attachments_uploaded += result.attachments_uploaded;
        self.results.push(result);
    }

    /// Stamps the completion time.
    pub fn finish(&mut self) {
        self.completed_at = chrono::Utc::now().to_rfc3339();
    }

    /// Whether any issue's core migration failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed_migrations > 0
    }

    /// Writes the report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error when serialization or the write fails.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn success(key: &str, is_epic: bool, updated: bool, linked: Option<&str>) -> MigrationResult {
        MigrationResult {
            success: true,
            updated,
            linked_to_epic: linked.map(str::to_string),
            comments_added: 2,
            attachments_uploaded: 1,
            ..MigrationResult::new(key.to_string(), format!("https://jira/browse/{key}"), is_epic)
        }
    }

    #[test]
    fn record_tallies_created_updated_and_linkage() {
        let mut report = MigrationReport::new(4);

        report.record(success("VIBE-1", true, false, None));
        report.record(success("VIBE-2", false, false, Some("VIBE-1")));
        report.record(success("VIBE-3", false, true, None));
        let mut failed = MigrationResult::new(
            "VIBE-4".to_string(),
            "https://jira/browse/VIBE-4".to_string(),
            false,
        );
        failed.error = Some("boom".to_string());
        report.record(failed);

        assert_eq!(report.successful_migrations, 3);
        assert_eq!(report.failed_migrations, 1);
        assert_eq!(report.epics_created, 1);
        assert_eq!(report.children_linked, 1);
        assert_eq!(report.orphans_created, 1);
        assert_eq!(report.created_count, 2);
        assert_eq!(report.updated_count, 1);
        assert_eq!(report.total_comments_added, 6);
        assert_eq!(report.total_attachments_uploaded, 3);
        assert!(report.has_failures());
    }

    #[test]
    fn save_writes_camel_case_json() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("migration-report.json");

        let mut report = MigrationReport::new(1);
        report.record(success("VIBE-1", false, false, None));
        report.finish();
        report.save(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();

        assert_eq!(value["totalIssues"], 1);
        assert_eq!(value["successfulMigrations"], 1);
        assert_eq!(value["results"][0]["jiraKey"], "VIBE-1");
        assert!(value["completedAt"].as_str().is_some_and(|s| !s.is_empty()));
    }
}
