//! Source tracker client.
//!
//! This module provides paginated issue search, comment retrieval and
//! attachment downloads against the JIRA REST API, behind the
//! [`IssueSource`] seam so the orchestrator can run against fakes.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::JiraConfig;
use crate::types::{JiraComment, JiraIssue};

/// Page size used for live pagination.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Errors that can occur talking to the source tracker.
#[derive(Debug, Error)]
pub enum JiraError {
    /// Transport-level HTTP error.
    #[error("JIRA request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response from the tracker API.
    #[error("JIRA API returned {status} for {url}")]
    Upstream { status: u16, url: String },

    /// Lookup miss for a specific issue.
    #[error("JIRA issue {key} not found")]
    NotFound { key: String },

    /// Filesystem failure while writing an attachment.
    #[error("Failed to write '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// One page of search results.
#[derive(Debug)]
pub struct SearchPage {
    /// Issues on this page.
    pub issues: Vec<JiraIssue>,

    /// Total number of issues matching the query across all pages.
    pub total: u32,
}

/// Read access to the source tracker.
///
/// [`JiraClient`] is the production implementation; tests substitute
/// in-memory fakes.
#[async_trait]
pub trait IssueSource: Send + Sync {
    /// Fetches one page of issues matching a JQL query.
    ///
    /// Never retries internally; the caller decides what a failure means.
    async fn search(
        &self,
        jql: &str,
        page_size: u32,
        start_at: u32,
    ) -> Result<SearchPage, JiraError>;

    /// Fetches all comments of an issue.
    async fn get_comments(&self, key: &str) -> Result<Vec<JiraComment>, JiraError>;

    /// Downloads all attachments of an issue into `dest_dir`, returning the
    /// paths written. Best-effort: a single attachment's failure is logged
    /// and skipped, not fatal.
    async fn download_all_attachments(
        &self,
        issue: &JiraIssue,
        dest_dir: &Path,
    ) -> Result<Vec<PathBuf>, JiraError>;
}

/// Fetches every issue matching a JQL query, advancing the offset page by
/// page until the accumulated count reaches the tracker-reported total.
///
/// # Errors
///
/// Returns the first [`JiraError`] from an underlying page fetch.
pub async fn fetch_all<S: IssueSource + ?Sized>(
    source: &S,
    jql: &str,
    page_size: u32,
) -> Result<Vec<JiraIssue>, JiraError> {
    let mut all_issues = Vec::new();
    let mut start_at = 0;

    loop {
        let page = source.search(jql, page_size, start_at).await?;
        all_issues.extend(page.issues);

        info!(
            fetched = all_issues.len(),
            total = page.total,
            "Fetched issues from JIRA"
        );

        if all_issues.len() as u32 >= page.total {
            break;
        }
        start_at += page_size;
    }

    Ok(all_issues)
}

/// Fields requested on every search, beyond the configured custom fields.
const BASE_FIELDS: &[&str] = &[
    "summary",
    "status",
    "description",
    "assignee",
    "created",
    "updated",
    "labels",
    "issuetype",
    "priority",
    "attachment",
];

#[derive(Debug, Deserialize)]
struct SearchResponse {
    issues: Vec<JiraIssue>,
    total: u32,
}

#[derive(Debug, Deserialize)]
struct CommentsResponse {
    comments: Vec<JiraComment>,
}

/// JIRA REST client using bearer-token authentication.
pub struct JiraClient {
    http: reqwest::Client,
    config: JiraConfig,
}

impl JiraClient {
    /// Creates a client from the given configuration.
    #[must_use]
    pub fn new(config: JiraConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// The configuration this client was built with.
    #[must_use]
    pub fn config(&self) -> &JiraConfig {
        &self.config
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.config.token)
    }

    /// The field list sent with searches: base fields plus the configured
    /// story-points and epic-link custom fields.
    fn search_fields(&self) -> String {
        let mut fields: Vec<&str> = BASE_FIELDS.to_vec();
        fields.push(&self.config.story_points_field);
        fields.push(&self.config.epic_link_field);
        fields.join(",")
    }

    /// Fetches a single issue by key.
    ///
    /// # Errors
    ///
    /// Returns [`JiraError::NotFound`] on a 404 and [`JiraError::Upstream`]
    /// on any other non-2xx response.
    pub async fn get_issue(&self, key: &str) -> Result<JiraIssue, JiraError> {
        let url = self.api_url(&format!("/rest/api/2/issue/{key}"));
        let response = self
            .http
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(JiraError::NotFound {
                key: key.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(JiraError::Upstream {
                status: response.status().as_u16(),
                url,
            });
        }

        let mut issue: JiraIssue = response.json().await?;
        issue.resolve_custom_fields(&self.config);
        Ok(issue)
    }

    /// Downloads a single attachment to `dest`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`JiraError::Upstream`] when the fetch fails and
    /// [`JiraError::Io`] when the write fails.
    pub async fn download_attachment(&self, url: &str, dest: &Path) -> Result<(), JiraError> {
        let response = self
            .http
            .get(url)
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(JiraError::Upstream {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| JiraError::Io {
                    path: parent.display().to_string(),
                    source: e,
                })?;
        }

        let bytes = response.bytes().await?;
        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| JiraError::Io {
                path: dest.display().to_string(),
                source: e,
            })
    }
}

#[async_trait]
impl IssueSource for JiraClient {
    async fn search(
        &self,
        jql: &str,
        page_size: u32,
        start_at: u32,
    ) -> Result<SearchPage, JiraError> {
        let url = self.api_url("/rest/api/2/search");
        debug!(jql, page_size, start_at, "Searching JIRA issues");

        let fields = self.search_fields();
        let max_results = page_size.to_string();
        let start = start_at.to_string();
        let response = self
            .http
            .get(&url)
            .query(&[
                ("jql", jql),
                ("fields", fields.as_str()),
                ("maxResults", max_results.as_str()),
                ("startAt", start.as_str()),
            ])
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(JiraError::Upstream {
                status: response.status().as_u16(),
                url,
            });
        }

        let body: SearchResponse = response.json().await?;
        let mut issues = body.issues;
        for issue in &mut issues {
            issue.resolve_custom_fields(&self.config);
        }

        Ok(SearchPage {
            issues,
            total: body.total,
        })
    }

    async fn get_comments(&self, key: &str) -> Result<Vec<JiraComment>, JiraError> {
        let url = self.api_url(&format!("/rest/api/2/issue/{key}/comment"));
        let response = self
            .http
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(JiraError::NotFound {
                key: key.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(JiraError::Upstream {
                status: response.status().as_u16(),
                url,
            });
        }

        let body: CommentsResponse = response.json().await?;
        Ok(body.comments)
    }

    async fn download_all_attachments(
        &self,
        issue: &JiraIssue,
        dest_dir: &Path,
    ) -> Result<Vec<PathBuf>, JiraError> {
        let mut written = Vec::new();

        for attachment in &issue.fields.attachment {
            let dest = dest_dir.join(&attachment.filename);
            info!(filename = %attachment.filename, "Downloading attachment");

            match self.download_attachment(&attachment.content, &dest).await {
                Ok(()) => written.push(dest),
                Err(e) => {
                    warn!(
                        filename = %attachment.filename,
                        error = %e,
                        "Failed to download attachment, skipping"
                    );
                }
            }
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Fake source handing out a fixed total in fixed-size slices.
    struct PagingSource {
        total: u32,
        calls: Mutex<Vec<u32>>,
    }

    impl PagingSource {
        fn new(total: u32) -> Self {
            Self {
                total,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn issue(n: u32) -> JiraIssue {
            serde_json::from_value(serde_json::json!({
                "key": format!("VIBE-{n}"),
                "id": n.to_string(),
                "fields": { "summary": format!("issue {n}") }
            }))
            .unwrap()
        }
    }

    #[async_trait]
    impl IssueSource for PagingSource {
        async fn search(
            &self,
            _jql: &str,
            page_size: u32,
            start_at: u32,
        ) -> Result<SearchPage, JiraError> {
            self.calls.lock().unwrap().push(start_at);
            let remaining = self.total.saturating_sub(start_at);
            let count = remaining.min(page_size);
            let issues = (start_at..start_at + count).map(Self::issue).collect();
            Ok(SearchPage {
                issues,
                total: self.total,
            })
        }

        async fn get_comments(&self, _key: &str) -> Result<Vec<JiraComment>, JiraError> {
            Ok(Vec::new())
        }

        async fn download_all_attachments(
            &self,
            _issue: &JiraIssue,
            _dest_dir: &Path,
        ) -> Result<Vec<PathBuf>, JiraError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn fetch_all_terminates_at_reported_total() {
        let source = PagingSource::new(25);

        let issues = fetch_all(&source, "project = X", 10).await.unwrap();

        assert_eq!(issues.len(), 25);
        let calls = source.calls.lock().unwrap();
        assert_eq!(*calls, vec![0, 10, 20]);
    }

    #[tokio::test]
    async fn fetch_all_handles_single_short_page() {
        let source = PagingSource::new(3);

        let issues = fetch_all(&source, "project = X", 10).await.unwrap();

        assert_eq!(issues.len(), 3);
        assert_eq!(source.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fetch_all_handles_empty_result() {
        let source = PagingSource::new(0);

        let issues = fetch_all(&source, "project = X", 10).await.unwrap();

        assert!(issues.is_empty());
        assert_eq!(source.calls.lock().unwrap().len(), 1);
    }
}
