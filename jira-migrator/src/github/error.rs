//! Destination tracker error types.

use thiserror::Error;

/// Errors that can occur against the destination tracker.
#[derive(Debug, Error)]
pub enum GithubError {
    /// GitHub API error.
    #[error("GitHub API error: {0}")]
    Api(#[from] octocrab::Error),

    /// Rate limited. The only class retried with backoff, and only for
    /// comment posting.
    #[error("GitHub rate limited: {message}")]
    RateLimited { message: String },

    /// A GraphQL call returned errors in its payload.
    #[error("GitHub GraphQL error: {message}")]
    Graphql { message: String },

    /// Project board discovery or mutation failure.
    #[error("Project board error: {message}")]
    Board { message: String },
}

impl GithubError {
    /// Whether an error message looks like a secondary-rate-limit rejection.
    #[must_use]
    pub fn message_is_rate_limit(message: &str) -> bool {
        let lower = message.to_lowercase();
        lower.contains("rate limit")
            || lower.contains("submitted too quickly")
            || lower.contains("secondary rate")
            || lower.contains("abuse detection")
    }

    /// Classifies an API error, promoting rate-limit rejections to
    /// [`GithubError::RateLimited`] so retry logic can match on them.
    #[must_use]
    pub fn from_api(error: octocrab::Error) -> Self {
        let message = error.to_string();
        if Self::message_is_rate_limit(&message) {
            Self::RateLimited { message }
        } else {
            Self::Api(error)
        }
    }
}
