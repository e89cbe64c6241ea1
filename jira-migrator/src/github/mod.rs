//! Destination tracker client.
//!
//! This module handles issue creation and updating, label management,
//! project-board placement, sub-issue linking and comment posting against
//! GitHub, behind the [`IssueSink`] seam so orchestration logic never
//! touches a concrete transport and tests can substitute fakes.

mod board;
mod body;
mod comments;
mod error;
pub mod labels;

pub use board::{column_for_status, BoardState};
pub use body::{format_comment, issue_body, issue_title};
pub use comments::{add_comment_with_retry, migrate_comments};
pub use error::GithubError;

use async_trait::async_trait;
use octocrab::Octocrab;
use serde_json::json;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::RepoTarget;
use crate::rate_limit::ensure_core_rate_limit;
use crate::types::{GithubIssueRef, JiraIssue};

/// Write access to the destination tracker.
///
/// All operations are idempotent with respect to the per-source-key lookup
/// label: re-running a migration updates rather than duplicates.
#[async_trait]
pub trait IssueSink: Send + Sync {
    /// Verifies the client is authenticated. Called once pre-flight.
    async fn verify_auth(&self) -> Result<(), GithubError>;

    /// Finds the issue previously migrated from `jira_key`, if any.
    async fn find_existing(&self, jira_key: &str) -> Result<Option<GithubIssueRef>, GithubError>;

    /// Creates a new issue from a source snapshot.
    async fn create_issue(&self, issue: &JiraIssue) -> Result<GithubIssueRef, GithubError>;

    /// Replaces an existing issue's title, body and managed labels.
    async fn update_issue(
        &self,
        number: u64,
        issue: &JiraIssue,
    ) -> Result<GithubIssueRef, GithubError>;

    /// Discovers board identifiers. Runs once before any board mutation.
    async fn setup_board(&self, board_number: u64) -> Result<BoardState, GithubError>;

    /// Adds an issue to the board and sets its status column.
    async fn add_to_board(
        &self,
        board: &BoardState,
        issue: &GithubIssueRef,
        jira_status: &str,
    ) -> Result<Option<String>, GithubError>;

    /// Sets the estimate field on a board item.
    async fn set_estimate(
        &self,
        board: &BoardState,
        item_id: &str,
        points: f64,
    ) -> Result<Option<f64>, GithubError>;

    /// Links `child` as a sub-issue of `parent`. Returns whether the link
    /// exists afterwards.
    async fn link_sub_issue(&self, parent: u64, child: u64) -> Result<bool, GithubError>;

    /// Posts a single comment. No retries at this level; see
    /// [`add_comment_with_retry`].
    async fn post_comment(&self, issue_number: u64, body: &str) -> Result<(), GithubError>;
}

const SUB_ISSUES_QUERY: &str = r"
query($owner: String!, $name: String!, $number: Int!) {
  repository(owner: $owner, name: $name) {
    issue(number: $number) {
      subIssues(first: 100) { nodes { number } }
    }
  }
}";

const ISSUE_NODE_ID_QUERY: &str = r"
query($owner: String!, $name: String!, $number: Int!) {
  repository(owner: $owner, name: $name) {
    issue(number: $number) { id }
  }
}";

const ADD_SUB_ISSUE_MUTATION: &str = r"
mutation($parentId: ID!, $childId: ID!) {
  addSubIssue(input: { issueId: $parentId, subIssueId: $childId }) {
    issue { number }
    subIssue { number }
  }
}";

/// GitHub client over REST and GraphQL.
pub struct GithubClient {
    octocrab: Octocrab,
    repo: RepoTarget,
    jira_base_url: String,
}

impl GithubClient {
    /// Creates a client for a target repository.
    ///
    /// `jira_base_url` is used to build the provenance links embedded in
    /// migrated issue bodies.
    #[must_use]
    pub fn new(octocrab: Octocrab, repo: RepoTarget, jira_base_url: String) -> Self {
        Self {
            octocrab,
            repo,
            jira_base_url,
        }
    }

    /// Creates a client from an optional personal token. Anonymous clients
    /// are only useful for dry-run previews.
    ///
    /// # Errors
    ///
    /// Returns [`GithubError::Api`] when the underlying client cannot be
    /// built.
    pub fn from_token(
        token: Option<String>,
        repo: RepoTarget,
        jira_base_url: String,
    ) -> Result<Self, GithubError> {
        let builder = Octocrab::builder();
        let octocrab = match token {
            Some(token) => builder.personal_token(token).build(),
            None => builder.build(),
        }?;
        Ok(Self::new(octocrab, repo, jira_base_url))
    }

    /// The target repository.
    #[must_use]
    pub fn repo(&self) -> &RepoTarget {
        &self.repo
    }

    /// Runs a GraphQL operation, surfacing payload-level errors.
    pub(crate) async fn graphql(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<serde_json::Value, GithubError> {
        let payload = json!({ "query": query, "variables": variables });
        let response: serde_json::Value = self
            .octocrab
            .graphql(&payload)
            .await
            .map_err(GithubError::from_api)?;

        if let Some(errors) = response.get("errors").and_then(serde_json::Value::as_array) {
            if !errors.is_empty() {
                let message = errors
                    .iter()
                    .filter_map(|e| e.pointer("/message").and_then(serde_json::Value::as_str))
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(GithubError::Graphql { message });
            }
        }

        Ok(response)
    }

    /// Creates every label in `labels` that does not already exist.
    ///
    /// Issue creation with an unknown label fails, so this runs first. A
    /// label that already exists is success, not an error.
    async fn ensure_labels(&self, labels: &[String]) -> Result<(), GithubError> {
        for label in labels {
            let result = self
                .octocrab
                .issues(&self.repo.owner, &self.repo.name)
                .create_label(label, labels::label_color(label), "")
                .await;

            match result {
                Ok(_) => debug!(label, "Created label"),
                Err(e) if label_already_exists(&e) => {}
                Err(e) => return Err(GithubError::Api(e)),
            }
        }
        Ok(())
    }

    async fn issue_node_id(&self, number: u64) -> Result<Option<String>, GithubError> {
        let variables = json!({
            "owner": self.repo.owner,
            "name": self.repo.name,
            "number": number,
        });
        let response = self.graphql(ISSUE_NODE_ID_QUERY, variables).await?;

        Ok(response
            .pointer("/data/repository/issue/id")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string))
    }

    async fn is_sub_issue(&self, parent: u64, child: u64) -> Result<bool, GithubError> {
        let variables = json!({
            "owner": self.repo.owner,
            "name": self.repo.name,
            "number": parent,
        });
        let response = self.graphql(SUB_ISSUES_QUERY, variables).await?;

        let linked = response
            .pointer("/data/repository/issue/subIssues/nodes")
            .and_then(serde_json::Value::as_array)
            .is_some_and(|nodes| {
                nodes.iter().any(|n| {
                    n.pointer("/number").and_then(serde_json::Value::as_u64) == Some(child)
                })
            });

        Ok(linked)
    }
}

/// Whether a label-creation error means the label is already present.
fn label_already_exists(error: &octocrab::Error) -> bool {
    let message = error.to_string().to_lowercase();
    message.contains("already_exists") || message.contains("already exists")
}

#[async_trait]
impl IssueSink for GithubClient {
    async fn verify_auth(&self) -> Result<(), GithubError> {
        let user = self
            .octocrab
            .current()
            .user()
            .await
            .map_err(GithubError::Api)?;
        info!(login = %user.login, "GitHub authentication verified");
        Ok(())
    }

    async fn find_existing(&self, jira_key: &str) -> Result<Option<GithubIssueRef>, GithubError> {
        let labels = vec![labels::lookup_label(jira_key)];
        let page = self
            .octocrab
            .issues(&self.repo.owner, &self.repo.name)
            .list()
            .labels(&labels)
            .state(octocrab::params::State::All)
            .per_page(1)
            .send()
            .await?;

        Ok(page.items.into_iter().next().map(|issue| GithubIssueRef {
            number: issue.number,
            url: issue.html_url.to_string(),
            node_id: issue.node_id,
        }))
    }

    async fn create_issue(&self, issue: &JiraIssue) -> Result<GithubIssueRef, GithubError> {
        let span = info_span!("create_issue", key = %issue.key);

        async {
            let title = issue_title(issue);
            let body = issue_body(issue, &self.jira_base_url);
            let labels = labels::creation_labels(issue);

            self.ensure_labels(&labels).await?;
            ensure_core_rate_limit(&self.octocrab).await?;

            let created = self
                .octocrab
                .issues(&self.repo.owner, &self.repo.name)
                .create(title.as_str())
                .body(body.as_str())
                .labels(labels)
                .send()
                .await?;

            info!(number = created.number, "Issue created");
            Ok(GithubIssueRef {
                number: created.number,
                url: created.html_url.to_string(),
                node_id: created.node_id,
            })
        }
        .instrument(span)
        .await
    }

    async fn update_issue(
        &self,
        number: u64,
        issue: &JiraIssue,
    ) -> Result<GithubIssueRef, GithubError> {
        let span = info_span!("update_issue", key = %issue.key, number);

        async {
            let title = issue_title(issue);
            let body = issue_body(issue, &self.jira_base_url);

            ensure_core_rate_limit(&self.octocrab).await?;
            let handler = self.octocrab.issues(&self.repo.owner, &self.repo.name);
            let updated = handler
                .update(number)
                .title(&title)
                .body(&body)
                .send()
                .await?;

            // Reconcile managed labels against the issue's current set.
            let current: Vec<String> = updated.labels.iter().map(|l| l.name.clone()).collect();
            let desired = labels::managed_labels(issue);
            let (to_remove, to_add) = labels::diff_labels(&current, &desired);

            for label in &to_remove {
                handler.remove_label(number, label).await?;
            }
            if !to_add.is_empty() {
                self.ensure_labels(&to_add).await?;
                handler.add_labels(number, &to_add).await?;
            }

            info!(
                number,
                removed = to_remove.len(),
                added = to_add.len(),
                "Issue updated"
            );
            Ok(GithubIssueRef {
                number: updated.number,
                url: updated.html_url.to_string(),
                node_id: updated.node_id,
            })
        }
        .instrument(span)
        .await
    }

    async fn setup_board(&self, board_number: u64) -> Result<BoardState, GithubError> {
        self.discover_board(board_number).await
    }

    async fn add_to_board(
        &self,
        board: &BoardState,
        issue: &GithubIssueRef,
        jira_status: &str,
    ) -> Result<Option<String>, GithubError> {
        self.place_on_board(board, issue, jira_status).await
    }

    async fn set_estimate(
        &self,
        board: &BoardState,
        item_id: &str,
        points: f64,
    ) -> Result<Option<f64>, GithubError> {
        self.set_board_estimate(board, item_id, points).await
    }

    async fn link_sub_issue(&self, parent: u64, child: u64) -> Result<bool, GithubError> {
        if self.is_sub_issue(parent, child).await? {
            info!(parent, child, "Already linked as sub-issue");
            return Ok(true);
        }

        let (Some(parent_id), Some(child_id)) = (
            self.issue_node_id(parent).await?,
            self.issue_node_id(child).await?,
        ) else {
            warn!(parent, child, "Could not resolve node ids for linking");
            return Ok(false);
        };

        let variables = json!({ "parentId": parent_id, "childId": child_id });
        self.graphql(ADD_SUB_ISSUE_MUTATION, variables).await?;

        info!(parent, child, "Linked as sub-issue");
        Ok(true)
    }

    async fn post_comment(&self, issue_number: u64, body: &str) -> Result<(), GithubError> {
        self.octocrab
            .issues(&self.repo.owner, &self.repo.name)
            .create_comment(issue_number, body)
            .await
            .map_err(GithubError::from_api)?;
        Ok(())
    }
}
