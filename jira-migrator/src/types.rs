//! Core types for the migration engine.
//!
//! This module contains the data structures shared across the library:
//! - [`JiraIssue`] and its nested field types - an immutable snapshot of a
//!   source tracker issue, fetched once per run
//! - [`JiraComment`] and [`JiraAttachment`] - issue sub-resources
//! - [`GithubIssueRef`] - the create/update result on the destination tracker

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::JiraConfig;

/// A file attached to a JIRA issue.
#[derive(Debug, Clone, Deserialize)]
pub struct JiraAttachment {
    /// Attachment id.
    pub id: String,

    /// Original file name.
    pub filename: String,

    /// URL the attachment content is downloaded from.
    pub content: String,

    /// MIME type reported by the tracker.
    #[serde(default, rename = "mimeType")]
    pub mime_type: Option<String>,

    /// Size in bytes.
    #[serde(default)]
    pub size: Option<u64>,
}

/// A comment on a JIRA issue.
#[derive(Debug, Clone, Deserialize)]
pub struct JiraComment {
    /// Comment id.
    pub id: String,

    /// Comment author, absent for system-generated comments.
    #[serde(default)]
    pub author: Option<JiraUser>,

    /// Comment body in JIRA wiki markup.
    #[serde(default)]
    pub body: String,

    /// Creation timestamp.
    pub created: String,

    /// Last-update timestamp.
    pub updated: String,
}

/// A JIRA user reference.
#[derive(Debug, Clone, Deserialize)]
pub struct JiraUser {
    /// Human-readable name.
    #[serde(rename = "displayName")]
    pub display_name: String,
}

/// A named JIRA field such as a status.
#[derive(Debug, Clone, Deserialize)]
pub struct NamedField {
    /// Field value name, e.g. "In Progress".
    pub name: String,
}

/// A JIRA issue type.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueType {
    /// Type name, e.g. "Epic", "Story", "Bug".
    pub name: String,

    /// Whether this type is a sub-task type.
    #[serde(default)]
    pub subtask: bool,
}

/// A JIRA priority, which the API returns either as a bare string or as an
/// object carrying a `name`.
///
/// The shape is resolved here, once, at deserialization; callers only ever
/// see [`Priority::name`].
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Priority {
    /// Plain string form.
    Name(String),
    /// Object form.
    Object {
        /// Priority name.
        name: String,
    },
}

impl Priority {
    /// Returns the priority name regardless of wire shape.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) | Self::Object { name } => name,
        }
    }
}

/// The `fields` object of a JIRA issue.
///
/// Story points and the epic link arrive under instance-specific custom
/// field names; they are lifted out of [`JiraFields::custom`] by
/// [`JiraIssue::resolve_custom_fields`] right after fetching, so the rest
/// of the code never touches raw custom-field ids.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JiraFields {
    /// One-line summary.
    pub summary: String,

    /// Description in JIRA wiki markup.
    #[serde(default)]
    pub description: Option<String>,

    /// Workflow status.
    #[serde(default)]
    pub status: Option<NamedField>,

    /// Assigned user.
    #[serde(default)]
    pub assignee: Option<JiraUser>,

    /// Issue type.
    #[serde(default)]
    pub issuetype: Option<IssueType>,

    /// Priority, string or object form.
    #[serde(default)]
    pub priority: Option<Priority>,

    /// Creation timestamp.
    #[serde(default)]
    pub created: Option<String>,

    /// Last-update timestamp.
    #[serde(default)]
    pub updated: Option<String>,

    /// Label set.
    #[serde(default)]
    pub labels: Vec<String>,

    /// Attachments.
    #[serde(default)]
    pub attachment: Vec<JiraAttachment>,

    /// Story point estimate, resolved from the configured custom field.
    #[serde(skip)]
    pub story_points: Option<f64>,

    /// Parent epic key, resolved from the configured custom field.
    #[serde(skip)]
    pub epic_link: Option<String>,

    /// Unrecognized fields, including the instance's custom fields.
    #[serde(flatten)]
    pub custom: HashMap<String, serde_json::Value>,
}

/// An immutable snapshot of a JIRA issue.
#[derive(Debug, Clone, Deserialize)]
pub struct JiraIssue {
    /// Project-scoped human-readable key, e.g. "VIBE-338".
    pub key: String,

    /// Numeric id.
    pub id: String,

    /// Issue fields.
    pub fields: JiraFields,
}

impl JiraIssue {
    /// Lifts story points and the epic link out of the raw custom-field map
    /// using the field ids carried by the configuration.
    ///
    /// Values of an unexpected JSON type are dropped rather than erroring:
    /// a missing estimate or parent is a normal state for an issue.
    pub fn resolve_custom_fields(&mut self, config: &JiraConfig) {
        self.fields.story_points = self
            .fields
            .custom
            .get(&config.story_points_field)
            .and_then(serde_json::Value::as_f64);
        self.fields.epic_link = self
            .fields
            .custom
            .get(&config.epic_link_field)
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned);
    }

    /// Whether this issue is an epic (a parent-level grouping issue).
    #[must_use]
    pub fn is_epic(&self) -> bool {
        self.fields
            .issuetype
            .as_ref()
            .is_some_and(|t| t.name.eq_ignore_ascii_case("epic"))
    }

    /// The issue's URL on the source tracker.
    #[must_use]
    pub fn browse_url(&self, base_url: &str) -> String {
        format!("{}/browse/{}", base_url.trim_end_matches('/'), self.key)
    }
}

/// Reference to an issue on the destination tracker.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GithubIssueRef {
    /// Issue number.
    pub number: u64,

    /// Canonical issue URL.
    pub url: String,

    /// GraphQL node id, needed for board and sub-issue mutations.
    #[serde(skip)]
    pub node_id: String,
}
