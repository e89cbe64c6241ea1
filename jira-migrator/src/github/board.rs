//! Project board discovery and mutation.
//!
//! Board field ids and status options are discovered once per process,
//! before any issue is touched, and cached in [`BoardState`]. If discovery
//! fails, per-issue board operations are skipped rather than attempted
//! blind.

use serde_json::json;
use std::collections::HashMap;
use tracing::{info, warn};

use super::{GithubClient, GithubError};
use crate::types::GithubIssueRef;

/// JIRA status name (normalized) to board column name.
///
/// Keys are lowercase with whitespace collapsed to hyphens, matching
/// [`crate::github::labels::normalize_label`].
const STATUS_COLUMNS: &[(&str, &str)] = &[
    // Backlog statuses
    ("new", "Backlog"),
    ("open", "Backlog"),
    ("backlog", "Backlog"),
    ("to-do", "Backlog"),
    ("todo", "Backlog"),
    // Prioritised/Refined statuses
    ("prioritised-backlog", "Prioritised Backlog"),
    ("next---prioritised", "Prioritised Backlog"),
    ("ready-for-progress", "Refined Tickets"),
    ("ready-for-development", "Refined Tickets"),
    ("refined", "Refined Tickets"),
    // In Progress statuses
    ("in-progress", "In Progress"),
    ("in-development", "In Progress"),
    ("development", "In Progress"),
    // Code Review statuses
    ("code-review", "Code Review"),
    ("in-review", "Code Review"),
    ("review", "Code Review"),
    // Test statuses
    ("ready-for-test", "Ready For Test"),
    ("ready-for-testing", "Ready For Test"),
    ("in-test", "In Test"),
    ("in-testing", "In Test"),
    ("testing", "In Test"),
    ("test", "In Test"),
    // Sign off statuses
    ("ready-for-sign-off", "Ready For Sign Off"),
    ("ready-for-signoff", "Ready For Sign Off"),
    ("awaiting-sign-off", "Ready For Sign Off"),
    ("acceptance", "Ready For Sign Off"),
    // Done statuses
    ("closed", "Done"),
    ("done", "Done"),
    ("resolved", "Done"),
    ("complete", "Done"),
    ("completed", "Done"),
    ("finished", "Done"),
    ("withdrawn", "Done"),
    ("cancelled", "Done"),
    ("canceled", "Done"),
    ("rejected", "Done"),
    ("won't-do", "Done"),
    ("wontdo", "Done"),
    ("wont-do", "Done"),
    ("prod-release", "Done"),
];

/// Process-lifetime cache of project board identifiers.
#[derive(Debug, Clone)]
pub struct BoardState {
    /// Board number as shown in its URL.
    pub number: u64,

    /// Project GraphQL node id.
    pub project_id: String,

    /// Single-select "Status" field id.
    pub status_field_id: String,

    /// "Estimate" number field id; absence makes estimate-setting a no-op.
    pub estimate_field_id: Option<String>,

    /// Status option name to option id. Keys are stored verbatim plus
    /// lowercase and hyphenated for flexible matching.
    pub options: HashMap<String, String>,
}

impl BoardState {
    /// Looks up a status option id by column name, trying the exact name,
    /// then lowercase, then lowercase-hyphenated.
    #[must_use]
    pub fn column_option_id(&self, column_name: &str) -> Option<&str> {
        let lower = column_name.to_lowercase();
        let hyphenated = lower.split_whitespace().collect::<Vec<_>>().join("-");
        self.options
            .get(column_name)
            .or_else(|| self.options.get(&lower))
            .or_else(|| self.options.get(&hyphenated))
            .map(String::as_str)
    }

    /// Resolves a normalized JIRA status to the matching column option id.
    #[must_use]
    pub fn option_id_for_status(&self, normalized_status: &str) -> Option<&str> {
        column_for_status(normalized_status).and_then(|column| self.column_option_id(column))
    }

    /// The backlog-like column used when a status has no mapping.
    #[must_use]
    pub fn fallback_option_id(&self) -> Option<&str> {
        self.column_option_id("Backlog")
    }
}

/// Maps a normalized JIRA status to its board column name.
#[must_use]
pub fn column_for_status(normalized_status: &str) -> Option<&'static str> {
    STATUS_COLUMNS
        .iter()
        .find(|(status, _)| *status == normalized_status)
        .map(|(_, column)| *column)
}

const PROJECT_FIELDS_QUERY: &str = r#"
query($login: String!, $number: Int!) {
  organization(login: $login) {
    projectV2(number: $number) {
      id
      status: field(name: "Status") {
        ... on ProjectV2SingleSelectField { id options { id name } }
      }
      estimate: field(name: "Estimate") {
        ... on ProjectV2FieldCommon { id }
      }
    }
  }
}"#;

const PROJECT_FIELDS_QUERY_USER: &str = r#"
query($login: String!, $number: Int!) {
  user(login: $login) {
    projectV2(number: $number) {
      id
      status: field(name: "Status") {
        ... on ProjectV2SingleSelectField { id options { id name } }
      }
      estimate: field(name: "Estimate") {
        ... on ProjectV2FieldCommon { id }
      }
    }
  }
}"#;

const ADD_ITEM_MUTATION: &str = r"
mutation($projectId: ID!, $contentId: ID!) {
  addProjectV2ItemById(input: { projectId: $projectId, contentId: $contentId }) {
    item { id }
  }
}";

const PROJECT_ITEMS_QUERY: &str = r"
query($owner: String!, $name: String!, $number: Int!) {
  repository(owner: $owner, name: $name) {
    issue(number: $number) {
      projectItems(first: 10) {
        nodes { id project { number } }
      }
    }
  }
}";

const SET_STATUS_MUTATION: &str = r"
mutation($projectId: ID!, $itemId: ID!, $fieldId: ID!, $optionId: String!) {
  updateProjectV2ItemFieldValue(
    input: { projectId: $projectId, itemId: $itemId, fieldId: $fieldId, value: { singleSelectOptionId: $optionId } }
  ) { projectV2Item { id } }
}";

const SET_NUMBER_MUTATION: &str = r"
mutation($projectId: ID!, $itemId: ID!, $fieldId: ID!, $value: Float!) {
  updateProjectV2ItemFieldValue(
    input: { projectId: $projectId, itemId: $itemId, fieldId: $fieldId, value: { number: $value } }
  ) { projectV2Item { id } }
}";

impl GithubClient {
    /// Discovers a project board's field ids and status options.
    ///
    /// Tries the organization scope first and falls back to the user scope,
    /// since a repository owner can be either.
    ///
    /// # Errors
    ///
    /// Returns [`GithubError::Board`] when the project or its "Status"
    /// field cannot be found. A missing "Estimate" field is only a warning.
    pub async fn discover_board(&self, board_number: u64) -> Result<BoardState, GithubError> {
        info!(board = board_number, "Setting up project board");

        let variables = json!({ "login": self.repo().owner, "number": board_number });
        let response = self.graphql(PROJECT_FIELDS_QUERY, variables.clone()).await;

        let project = match response {
            Ok(data) => data.pointer("/data/organization/projectV2").cloned(),
            Err(_) => None,
        };
        let project = match project.filter(|p| !p.is_null()) {
            Some(p) => p,
            None => self
                .graphql(PROJECT_FIELDS_QUERY_USER, variables)
                .await?
                .pointer("/data/user/projectV2")
                .filter(|p| !p.is_null())
                .cloned()
                .ok_or_else(|| GithubError::Board {
                    message: format!("project {board_number} not found for {}", self.repo().owner),
                })?,
        };

        let project_id = project
            .pointer("/id")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| GithubError::Board {
                message: "project id missing from response".to_string(),
            })?
            .to_string();

        let status_field_id = project
            .pointer("/status/id")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| GithubError::Board {
                message: "Status field not found in project".to_string(),
            })?
            .to_string();

        let estimate_field_id = project
            .pointer("/estimate/id")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
        if estimate_field_id.is_none() {
            warn!("Estimate field not found in project, story points will not be set");
        }

        let raw_options = project
            .pointer("/status/options")
            .and_then(serde_json::Value::as_array)
            .cloned()
            .unwrap_or_default();
        if raw_options.is_empty() {
            return Err(GithubError::Board {
                message: "no status options found in project".to_string(),
            });
        }

        let mut options = HashMap::new();
        for option in &raw_options {
            let (Some(id), Some(name)) = (
                option.pointer("/id").and_then(serde_json::Value::as_str),
                option.pointer("/name").and_then(serde_json::Value::as_str),
            ) else {
                continue;
            };
            let lower = name.to_lowercase();
            let hyphenated = lower.split_whitespace().collect::<Vec<_>>().join("-");
            options.insert(name.to_string(), id.to_string());
            options.insert(lower, id.to_string());
            options.insert(hyphenated, id.to_string());
        }

        info!(
            columns = raw_options.len(),
            estimate = estimate_field_id.is_some(),
            "Project board ready"
        );

        Ok(BoardState {
            number: board_number,
            project_id,
            status_field_id,
            estimate_field_id,
            options,
        })
    }

    /// Adds an issue to the board and sets its status column.
    ///
    /// If the issue is already on the board, the existing item id is looked
    /// up instead of failing. An unmapped status falls back to the backlog
    /// column; no usable column at all degrades to a warning.
    ///
    /// # Errors
    ///
    /// Returns an error only when the issue can neither be added nor found
    /// on the board.
    pub async fn place_on_board(
        &self,
        board: &BoardState,
        issue: &GithubIssueRef,
        jira_status: &str,
    ) -> Result<Option<String>, GithubError> {
        let item_id = match self.add_board_item(board, issue).await {
            Ok(id) => Some(id),
            Err(e) if e.to_string().contains("already exists") => {
                info!(issue = issue.number, "Already on project board");
                self.find_board_item(board, issue.number).await?
            }
            Err(e) => return Err(e),
        };

        let Some(item_id) = item_id else {
            warn!(
                issue = issue.number,
                "Could not resolve board item, skipping status update"
            );
            return Ok(None);
        };

        let normalized = crate::github::labels::normalize_label(Some(jira_status));
        let option_id = board
            .option_id_for_status(&normalized)
            .or_else(|| board.fallback_option_id());

        match option_id {
            Some(option_id) => {
                let variables = json!({
                    "projectId": board.project_id,
                    "itemId": item_id,
                    "fieldId": board.status_field_id,
                    "optionId": option_id,
                });
                if let Err(e) = self.graphql(SET_STATUS_MUTATION, variables).await {
                    warn!(
                        issue = issue.number,
                        status = jira_status,
                        error = %e,
                        "Failed to set board status"
                    );
                } else {
                    info!(issue = issue.number, status = jira_status, "Board status set");
                }
            }
            None => {
                warn!(
                    issue = issue.number,
                    status = %normalized,
                    "No board column for status, skipping status update"
                );
            }
        }

        Ok(Some(item_id))
    }

    /// Sets the estimate field on a board item. No-op when the board has no
    /// estimate field.
    ///
    /// # Errors
    ///
    /// Returns an error when the mutation itself fails.
    pub async fn set_board_estimate(
        &self,
        board: &BoardState,
        item_id: &str,
        points: f64,
    ) -> Result<Option<f64>, GithubError> {
        let Some(field_id) = board.estimate_field_id.as_deref() else {
            return Ok(None);
        };

        let variables = json!({
            "projectId": board.project_id,
            "itemId": item_id,
            "fieldId": field_id,
            "value": points,
        });
        self.graphql(SET_NUMBER_MUTATION, variables).await?;

        info!(points, "Estimate set");
        Ok(Some(points))
    }

    async fn add_board_item(
        &self,
        board: &BoardState,
        issue: &GithubIssueRef,
    ) -> Result<String, GithubError> {
        let variables = json!({ "projectId": board.project_id, "contentId": issue.node_id });
        let response = self.graphql(ADD_ITEM_MUTATION, variables).await?;

        response
            .pointer("/data/addProjectV2ItemById/item/id")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| GithubError::Board {
                message: "no item id in add-to-board response".to_string(),
            })
    }

    async fn find_board_item(
        &self,
        board: &BoardState,
        issue_number: u64,
    ) -> Result<Option<String>, GithubError> {
        let variables = json!({
            "owner": self.repo().owner,
            "name": self.repo().name,
            "number": issue_number,
        });
        let response = self.graphql(PROJECT_ITEMS_QUERY, variables).await?;

        let nodes = response
            .pointer("/data/repository/issue/projectItems/nodes")
            .and_then(serde_json::Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(nodes
            .iter()
            .find(|node| {
                node.pointer("/project/number")
                    .and_then(serde_json::Value::as_u64)
                    == Some(board.number)
            })
            .and_then(|node| node.pointer("/id").and_then(serde_json::Value::as_str))
            .map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board() -> BoardState {
        let mut options = HashMap::new();
        for (name, id) in [
            ("Backlog", "opt-backlog"),
            ("In Progress", "opt-progress"),
            ("Done", "opt-done"),
        ] {
            let lower = name.to_lowercase();
            let hyphenated = lower.split_whitespace().collect::<Vec<_>>().join("-");
            options.insert(name.to_string(), id.to_string());
            options.insert(lower, id.to_string());
            options.insert(hyphenated, id.to_string());
        }
        BoardState {
            number: 42,
            project_id: "P_1".to_string(),
            status_field_id: "F_status".to_string(),
            estimate_field_id: None,
            options,
        }
    }

    #[test]
    fn maps_known_statuses_to_columns() {
        assert_eq!(column_for_status("in-progress"), Some("In Progress"));
        assert_eq!(column_for_status("prod-release"), Some("Done"));
        assert_eq!(column_for_status("new"), Some("Backlog"));
        assert_eq!(column_for_status("mystery"), None);
    }

    #[test]
    fn resolves_option_ids_with_flexible_matching() {
        let board = board();
        assert_eq!(board.option_id_for_status("in-progress"), Some("opt-progress"));
        assert_eq!(board.option_id_for_status("resolved"), Some("opt-done"));
        assert_eq!(board.column_option_id("in-progress"), Some("opt-progress"));
        assert_eq!(board.fallback_option_id(), Some("opt-backlog"));
    }

    #[test]
    fn unmapped_status_resolves_to_none() {
        let board = board();
        assert_eq!(board.option_id_for_status("mystery"), None);
    }
}
