//! Comment migration with rate-limit backoff.
//!
//! GitHub rejects rapid comment bursts with a secondary rate limit, so
//! posting retries with bounded exponential backoff and the per-issue
//! migration inserts a delay between consecutive comments.

use std::time::Duration;
use tracing::{info, warn};

use super::{GithubError, IssueSink};
use crate::github::body::format_comment;
use crate::types::JiraComment;

/// Attempts per comment before giving up.
const MAX_ATTEMPTS: u32 = 3;

/// First backoff delay; doubles on each further attempt.
const BACKOFF_BASE: Duration = Duration::from_secs(2);

/// Pause between consecutive comments on the same issue.
const INTER_COMMENT_DELAY: Duration = Duration::from_millis(1500);

/// Posts a comment, retrying rate-limit rejections with exponential
/// backoff. Any other error aborts immediately without retry.
///
/// # Errors
///
/// Returns the last error once attempts are exhausted, or the first
/// non-rate-limit error.
pub async fn add_comment_with_retry<K: IssueSink + ?Sized>(
    sink: &K,
    issue_number: u64,
    body: &str,
) -> Result<(), GithubError> {
    let mut delay = BACKOFF_BASE;
    let mut attempt = 1;

    loop {
        match sink.post_comment(issue_number, body).await {
            Ok(()) => return Ok(()),
            Err(GithubError::RateLimited { .. }) if attempt < MAX_ATTEMPTS => {
                warn!(
                    issue = issue_number,
                    attempt,
                    delay_secs = delay.as_secs(),
                    "Rate limited posting comment, backing off"
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Migrates an issue's comments sequentially, returning how many were
/// posted. A failed comment is logged and skipped; the rest still post.
pub async fn migrate_comments<K: IssueSink + ?Sized>(
    sink: &K,
    issue_number: u64,
    comments: &[JiraComment],
) -> usize {
    let mut posted = 0;

    for comment in comments {
        let body = format_comment(comment);
        match add_comment_with_retry(sink, issue_number, &body).await {
            Ok(()) => posted += 1,
            Err(e) => {
                warn!(
                    issue = issue_number,
                    comment_id = %comment.id,
                    error = %e,
                    "Failed to migrate comment"
                );
            }
        }

        tokio::time::sleep(INTER_COMMENT_DELAY).await;
    }

    if posted > 0 {
        info!(
            issue = issue_number,
            posted,
            total = comments.len(),
            "Migrated comments"
        );
    }

    posted
}
