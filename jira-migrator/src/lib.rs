#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

pub mod config;
pub mod github;
pub mod jira;
pub mod markdown;
pub mod migrate;
pub mod rate_limit;
pub mod report;
pub mod types;
pub mod uploader;

pub use config::{ConfigError, JiraConfig, RepoTarget, DEFAULT_ENV_FILE};
pub use github::{
    add_comment_with_retry, migrate_comments, BoardState, GithubClient, GithubError, IssueSink,
};
pub use jira::{fetch_all, IssueSource, JiraClient, JiraError, SearchPage, DEFAULT_PAGE_SIZE};
pub use markdown::jira_to_markdown;
pub use migrate::{
    EpicMapping, MigrateError, MigrationOptions, Migrator, PARALLEL_BATCH_SIZE,
};
pub use report::{MigrationReport, MigrationResult};
pub use types::{GithubIssueRef, JiraAttachment, JiraComment, JiraIssue};
pub use uploader::{BrowserUploader, UploadError, Uploader};
