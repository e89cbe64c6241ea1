//! Two-phase migration orchestration.
//!
//! Epics migrate first so their destination issue numbers are known, then
//! children migrate and link to their parents. Within a phase, issues run
//! in fixed-size parallel batches: a batch is submitted, fully awaited,
//! then the next starts. The epic mapping is only written between batches,
//! from completed results, and only read in Phase 2 - phase separation is
//! what makes the shared map safe, not a lock.

use futures::future;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::{JiraConfig, RepoTarget};
use crate::github::{migrate_comments, BoardState, GithubError, IssueSink};
use crate::jira::{fetch_all, IssueSource, JiraError, DEFAULT_PAGE_SIZE};
use crate::report::{MigrationReport, MigrationResult};
use crate::types::{GithubIssueRef, JiraIssue};
use crate::uploader::{UploadError, Uploader};

/// Issues migrated concurrently within one batch.
pub const PARALLEL_BATCH_SIZE: usize = 10;

/// Mapping from source epic key to destination issue number.
pub type EpicMapping = HashMap<String, u64>;

/// Fatal, pre-flight failures. Per-issue failures never surface here; they
/// are recorded in the report instead.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// Configuration failure before the run started.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    /// Source tracker failure while fetching the issue list.
    #[error(transparent)]
    Jira(#[from] JiraError),

    /// Browser session failure before the batch started.
    #[error(transparent)]
    Upload(#[from] UploadError),

    /// The destination tracker rejected the authentication check.
    #[error("GitHub authentication check failed: {0}")]
    Auth(#[source] GithubError),

    /// Project board setup failed outside dry-run.
    #[error("Project board setup failed: {0}")]
    BoardSetup(#[source] GithubError),

    /// Could not create the attachment scratch directory.
    #[error("Failed to create attachment scratch directory: {0}")]
    Scratch(#[source] std::io::Error),

    /// Could not write the migration report.
    #[error("Failed to write migration report '{path}': {source}")]
    Report {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Knobs for a single migration run.
#[derive(Debug, Clone)]
pub struct MigrationOptions {
    /// Destination repository.
    pub repo: RepoTarget,

    /// List and preview without writing anything.
    pub dry_run: bool,

    /// Skip attachment download and upload.
    pub skip_attachments: bool,

    /// Skip comment migration.
    pub skip_comments: bool,

    /// Migrate only the first N issues.
    pub limit: Option<usize>,

    /// Project board number to place issues on.
    pub board: Option<u64>,

    /// Where the JSON report is written after a non-dry-run.
    pub report_path: PathBuf,
}

/// Drives the full two-phase migration.
pub struct Migrator<S, K> {
    source: S,
    sink: K,
    uploader: Option<Mutex<Box<dyn Uploader>>>,
    jira: JiraConfig,
    options: MigrationOptions,
}

impl<S: IssueSource, K: IssueSink> Migrator<S, K> {
    /// Creates a migrator without attachment upload capability.
    #[must_use]
    pub fn new(source: S, sink: K, jira: JiraConfig, options: MigrationOptions) -> Self {
        Self {
            source,
            sink,
            uploader: None,
            jira,
            options,
        }
    }

    /// Attaches a browser uploader. The single browser session is shared
    /// across batch tasks behind a lock, so uploads serialize.
    #[must_use]
    pub fn with_uploader(mut self, uploader: Box<dyn Uploader>) -> Self {
        self.uploader = Some(Mutex::new(uploader));
        self
    }

    /// Runs the migration end to end and returns the report.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError`] only for pre-flight failures (auth, board
    /// setup outside dry-run, the initial fetch, report persistence).
    /// Per-issue failures are recorded in the report.
    pub async fn run(&self) -> Result<MigrationReport, MigrateError> {
        info!(
            repo = %self.options.repo.full_name(),
            project = %self.jira.project,
            label = %self.jira.label,
            dry_run = self.options.dry_run,
            "Starting JIRA to GitHub migration"
        );

        if !self.options.dry_run {
            self.sink.verify_auth().await.map_err(MigrateError::Auth)?;
        }

        let board = self.setup_board().await?;

        let jql = self.jira.migration_jql();
        let mut issues = fetch_all(&self.source, &jql, DEFAULT_PAGE_SIZE).await?;

        if let Some(limit) = self.options.limit {
            if limit < issues.len() {
                info!(limit, "Limiting issue count");
                issues.truncate(limit);
            }
        }

        let (epics, children): (Vec<JiraIssue>, Vec<JiraIssue>) =
            issues.into_iter().partition(JiraIssue::is_epic);

        info!(
            total = epics.len() + children.len(),
            epics = epics.len(),
            children = children.len(),
            "Fetched issues"
        );

        let mut report = MigrationReport::new(epics.len() + children.len());
        if epics.is_empty() && children.is_empty() {
            report.finish();
            return Ok(report);
        }

        self.prepare_uploader(&epics, &children).await?;

        let mut mapping = EpicMapping::new();

        if !epics.is_empty() {
            info!(
                count = epics.len(),
                batch = PARALLEL_BATCH_SIZE,
                "Phase 1: migrating epics"
            );
            self.run_phase(&epics, board.as_ref(), &mut mapping, &mut report)
                .await;
        }

        if !children.is_empty() {
            info!(
                count = children.len(),
                batch = PARALLEL_BATCH_SIZE,
                "Phase 2: migrating child issues"
            );
            self.run_phase(&children, board.as_ref(), &mut mapping, &mut report)
                .await;
        }

        report.finish();

        if !self.options.dry_run {
            report
                .save(&self.options.report_path)
                .map_err(|e| MigrateError::Report {
                    path: self.options.report_path.display().to_string(),
                    source: e,
                })?;
            info!(path = %self.options.report_path.display(), "Migration report saved");
        }

        Ok(report)
    }

    /// Discovers the board when one is configured. Failure is fatal except
    /// in dry-run, where board placement is skipped instead.
    async fn setup_board(&self) -> Result<Option<BoardState>, MigrateError> {
        let Some(board_number) = self.options.board else {
            return Ok(None);
        };

        match self.sink.setup_board(board_number).await {
            Ok(state) => Ok(Some(state)),
            Err(e) if self.options.dry_run => {
                warn!(error = %e, "Board setup failed, skipping board placement in dry run");
                Ok(None)
            }
            Err(e) => Err(MigrateError::BoardSetup(e)),
        }
    }

    /// Performs the one-time interactive login check when attachments will
    /// be uploaded this run.
    async fn prepare_uploader(
        &self,
        epics: &[JiraIssue],
        children: &[JiraIssue],
    ) -> Result<(), MigrateError> {
        if self.options.dry_run || self.options.skip_attachments {
            return Ok(());
        }
        let Some(uploader) = &self.uploader else {
            return Ok(());
        };

        let has_attachments = epics
            .iter()
            .chain(children)
            .any(|i| !i.fields.attachment.is_empty());
        if has_attachments {
            uploader.lock().await.ensure_login().await?;
        }
        Ok(())
    }

    /// Migrates one phase's issues in fan-out/fan-in batches. All of batch
    /// N completes before batch N+1 starts; epic mappings from completed
    /// results are recorded between batches.
    async fn run_phase(
        &self,
        issues: &[JiraIssue],
        board: Option<&BoardState>,
        mapping: &mut EpicMapping,
        report: &mut MigrationReport,
    ) {
        for batch in issues.chunks(PARALLEL_BATCH_SIZE) {
            let mapping_snapshot: &EpicMapping = mapping;
            let results = future::join_all(
                batch
                    .iter()
                    .map(|issue| self.migrate_issue(issue, board, mapping_snapshot)),
            )
            .await;

            for result in results {
                if result.is_epic && result.success {
                    if let Some(gh) = &result.github_issue {
                        mapping.insert(result.jira_key.clone(), gh.number);
                    }
                }
                report.record(result);
            }
        }
    }

    /// Migrates a single issue through the full per-issue state machine.
    ///
    /// A create/update failure marks the issue failed. Failures in any
    /// later step (board, estimate, linking, attachments, comments) are
    /// logged and leave the issue successful with partial counts.
    async fn migrate_issue(
        &self,
        issue: &JiraIssue,
        board: Option<&BoardState>,
        epic_mapping: &EpicMapping,
    ) -> MigrationResult {
        let span = info_span!("migrate", key = %issue.key);

        async {
            let is_epic = issue.is_epic();
            let jira_url = issue.browse_url(&self.jira.base_url);
            let mut result = MigrationResult::new(issue.key.clone(), jira_url, is_epic);

            info!(
                issue_type = issue.fields.issuetype.as_ref().map_or("Issue", |t| t.name.as_str()),
                summary = %truncate(&issue.fields.summary, 50),
                "Migrating issue"
            );

            let github_issue = match self.create_or_update(issue, &mut result).await {
                Ok(gh) => gh,
                Err(e) => {
                    warn!(error = %e, "Failed to migrate issue");
                    result.error = Some(e.to_string());
                    return result;
                }
            };
            result.github_issue = Some(github_issue.clone());

            self.place_on_board(issue, &github_issue, board, is_epic, &mut result)
                .await;
            self.link_to_parent(issue, &github_issue, epic_mapping, is_epic, &mut result)
                .await;
            self.handle_attachments(issue, &github_issue, &mut result).await;
            self.handle_comments(issue, &github_issue, &mut result).await;

            result.success = true;
            result
        }
        .instrument(span)
        .await
    }

    /// Finds an existing destination issue and updates it, or creates a new
    /// one. In dry-run nothing is looked up or written; a placeholder
    /// reference flows through the rest of the state machine.
    async fn create_or_update(
        &self,
        issue: &JiraIssue,
        result: &mut MigrationResult,
    ) -> Result<GithubIssueRef, GithubError> {
        if self.options.dry_run {
            info!("[dry run] Would create or update issue");
            return Ok(GithubIssueRef {
                number: 0,
                url: format!("{}/issues/0", self.options.repo.url()),
                node_id: String::new(),
            });
        }

        match self.sink.find_existing(&issue.key).await? {
            Some(existing) => {
                info!(number = existing.number, "Found existing issue, updating");
                let updated = self.sink.update_issue(existing.number, issue).await?;
                result.updated = true;
                Ok(updated)
            }
            None => {
                info!("Creating new issue");
                self.sink.create_issue(issue).await
            }
        }
    }

    async fn place_on_board(
        &self,
        issue: &JiraIssue,
        github_issue: &GithubIssueRef,
        board: Option<&BoardState>,
        is_epic: bool,
        result: &mut MigrationResult,
    ) {
        let Some(board) = board else { return };

        let status = issue.fields.status.as_ref().map_or("new", |s| s.name.as_str());

        if self.options.dry_run {
            info!(board = board.number, status, "[dry run] Would add to project board");
            return;
        }

        let item_id = match self.sink.add_to_board(board, github_issue, status).await {
            Ok(Some(item_id)) => item_id,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Failed to add issue to board");
                return;
            }
        };

        // Epics carry no estimate; their size is the sum of their children.
        if is_epic {
            return;
        }
        let Some(points) = issue.fields.story_points else {
            return;
        };

        match self.sink.set_estimate(board, &item_id, points).await {
            Ok(set) => result.estimate_set = set,
            Err(e) => warn!(error = %e, "Failed to set estimate"),
        }
    }

    async fn link_to_parent(
        &self,
        issue: &JiraIssue,
        github_issue: &GithubIssueRef,
        epic_mapping: &EpicMapping,
        is_epic: bool,
        result: &mut MigrationResult,
    ) {
        if is_epic {
            return;
        }
        let Some(parent_key) = issue.fields.epic_link.as_deref() else {
            return;
        };

        let Some(&parent_number) = epic_mapping.get(parent_key) else {
            warn!(
                parent = parent_key,
                "Epic not found in mapping (may not be in migration scope)"
            );
            return;
        };

        if self.options.dry_run {
            info!(parent = parent_key, "[dry run] Would link as sub-issue");
            result.linked_to_epic = Some(parent_key.to_string());
            return;
        }

        match self.sink.link_sub_issue(parent_number, github_issue.number).await {
            Ok(true) => result.linked_to_epic = Some(parent_key.to_string()),
            Ok(false) => {}
            Err(e) => warn!(parent = parent_key, error = %e, "Failed to link sub-issue"),
        }
    }

    async fn handle_attachments(
        &self,
        issue: &JiraIssue,
        github_issue: &GithubIssueRef,
        result: &mut MigrationResult,
    ) {
        if self.options.skip_attachments
            || self.options.dry_run
            || issue.fields.attachment.is_empty()
        {
            return;
        }
        let Some(uploader) = &self.uploader else {
            return;
        };

        info!(count = issue.fields.attachment.len(), "Migrating attachments");

        match self.migrate_attachments(issue, github_issue, uploader).await {
            Ok(count) => result.attachments_uploaded = count,
            Err(e) => warn!(error = %e, "Failed to migrate attachments"),
        }
    }

    /// Downloads an issue's attachments into a scratch directory and pushes
    /// them through the shared browser session. The scratch directory is
    /// removed when the guard drops.
    async fn migrate_attachments(
        &self,
        issue: &JiraIssue,
        github_issue: &GithubIssueRef,
        uploader: &Mutex<Box<dyn Uploader>>,
    ) -> Result<usize, MigrateError> {
        let scratch = tempfile::Builder::new()
            .prefix(&format!("jira-migration-{}", issue.key))
            .tempdir()
            .map_err(MigrateError::Scratch)?;

        let files = self
            .source
            .download_all_attachments(issue, scratch.path())
            .await?;
        if files.is_empty() {
            return Ok(0);
        }

        let mut guard = uploader.lock().await;
        guard.upload(&github_issue.url, &files).await?;
        Ok(files.len())
    }

    async fn handle_comments(
        &self,
        issue: &JiraIssue,
        github_issue: &GithubIssueRef,
        result: &mut MigrationResult,
    ) {
        if self.options.skip_comments {
            return;
        }
        if self.options.dry_run {
            debug!("[dry run] Skipping comment fetch");
            return;
        }

        match self.source.get_comments(&issue.key).await {
            Ok(comments) if !comments.is_empty() => {
                info!(count = comments.len(), "Migrating comments");
                result.comments_added =
                    migrate_comments(&self.sink, github_issue.number, &comments).await;
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to fetch comments"),
        }
    }
}

/// Truncates a summary for log lines.
fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}
