//! Configuration and credential loading.
//!
//! Credentials for the source tracker come from a local env file
//! (`KEY=VALUE` lines; `#` comments and blank lines skipped; values already
//! present in the process environment win). Everything configurable is
//! collected into explicit structs constructed at startup and passed by
//! reference, so no module carries mutable globals.

use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Default env file searched relative to the working directory.
pub const DEFAULT_ENV_FILE: &str = ".claude/.mcp.env";

/// Errors that can occur while loading configuration.
///
/// All of these are pre-flight failures: they abort the run before any
/// issue is touched.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a file.
    #[error("Failed to read file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The source tracker token is missing.
    #[error("JIRA authentication not configured. Ensure JIRA_PERSONAL_TOKEN is set in {env_file} or the environment")]
    MissingToken { env_file: String },

    /// The destination tracker token is missing on a live run.
    #[error("GitHub authentication not configured. Set GITHUB_TOKEN or use --dry-run")]
    MissingGithubToken,

    /// The source tracker base URL does not parse.
    #[error("Invalid JIRA base URL '{value}'")]
    InvalidBaseUrl { value: String },

    /// The destination repository is not in `owner/name` form.
    #[error("Invalid repository format: {value}. Expected format: owner/repo")]
    InvalidRepo { value: String },
}

/// Source tracker configuration.
///
/// The story-points and epic-link identifiers are instance-specific custom
/// field names, so they are configuration rather than constants.
#[derive(Debug, Clone)]
pub struct JiraConfig {
    /// Base URL of the JIRA instance.
    pub base_url: String,

    /// Personal access token used as a bearer token.
    pub token: String,

    /// Project whose issues are migrated.
    pub project: String,

    /// Label filtering the issues to migrate.
    pub label: String,

    /// Custom field holding the story point estimate.
    pub story_points_field: String,

    /// Custom field holding the parent epic key.
    pub epic_link_field: String,
}

impl JiraConfig {
    /// Loads configuration from an env file merged with the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingToken`] when no token is found, and
    /// [`ConfigError::InvalidBaseUrl`] when the base URL does not parse.
    /// A missing env file is only a warning; the process environment may
    /// carry everything needed.
    pub fn from_env(env_file: &Path) -> Result<Self, ConfigError> {
        let mut vars = match load_env_file(env_file) {
            Ok(vars) => vars,
            Err(ConfigError::IoError { path, source })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                warn!(path, "Env file not found, relying on process environment");
                HashMap::new()
            }
            Err(e) => return Err(e),
        };

        // Process environment wins over file contents.
        for (key, value) in std::env::vars() {
            vars.insert(key, value);
        }

        let token = vars
            .get("JIRA_PERSONAL_TOKEN")
            .filter(|t| !t.is_empty())
            .cloned()
            .ok_or_else(|| ConfigError::MissingToken {
                env_file: env_file.display().to_string(),
            })?;

        let base_url = vars
            .get("JIRA_URL")
            .cloned()
            .unwrap_or_else(|| "https://tools.hmcts.net/jira".to_string());
        if Url::parse(&base_url).is_err() {
            return Err(ConfigError::InvalidBaseUrl { value: base_url });
        }

        let get_or = |key: &str, default: &str| {
            vars.get(key)
                .filter(|v| !v.is_empty())
                .cloned()
                .unwrap_or_else(|| default.to_string())
        };

        Ok(Self {
            base_url,
            token,
            project: get_or("JIRA_PROJECT", "VIBE"),
            label: get_or("JIRA_LABEL", "CaTH"),
            story_points_field: get_or("JIRA_STORY_POINTS_FIELD", "customfield_10004"),
            epic_link_field: get_or("JIRA_EPIC_LINK_FIELD", "customfield_10008"),
        })
    }

    /// Builds the JQL query selecting the issues to migrate.
    ///
    /// Epics sort before stories and tasks so Phase 1 material comes first
    /// in the fetched list.
    #[must_use]
    pub fn migration_jql(&self) -> String {
        format!(
            "project = \"{}\" AND labels = \"{}\" ORDER BY issuetype ASC, key ASC",
            self.project, self.label
        )
    }
}

/// Destination repository, parsed from `owner/name`.
#[derive(Debug, Clone)]
pub struct RepoTarget {
    /// Repository owner (user or organization).
    pub owner: String,

    /// Repository name.
    pub name: String,
}

impl RepoTarget {
    /// Parses an `owner/name` string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRepo`] unless the input is exactly two
    /// non-empty segments separated by a slash.
    pub fn parse(repo: &str) -> Result<Self, ConfigError> {
        match repo.split('/').collect::<Vec<_>>().as_slice() {
            [owner, name] if !owner.is_empty() && !name.is_empty() => Ok(Self {
                owner: (*owner).to_string(),
                name: (*name).to_string(),
            }),
            _ => Err(ConfigError::InvalidRepo {
                value: repo.to_string(),
            }),
        }
    }

    /// Full `owner/name` form.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Repository URL on the destination tracker.
    #[must_use]
    pub fn url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.name)
    }
}

/// Parses an env file into a key/value map.
///
/// Lines are `KEY=VALUE`; values may contain `=`. Blank lines and lines
/// starting with `#` are skipped.
fn load_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.display().to_string(),
        source: e,
    })?;

    let mut vars = HashMap::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if let Some((key, value)) = trimmed.split_once('=') {
            if !key.is_empty() && !value.is_empty() {
                vars.insert(key.to_string(), value.to_string());
            }
        }
    }

    debug!(path = %path.display(), count = vars.len(), "Loaded env file");
    Ok(vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn env_file_parsing_skips_comments_and_keeps_equals_in_values() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".mcp.env");
        fs::write(
            &path,
            "# comment\n\nJIRA_PERSONAL_TOKEN=abc=def\nJIRA_URL=https://jira.example.com\n",
        )
        .unwrap();

        let vars = load_env_file(&path).unwrap();

        assert_eq!(vars.get("JIRA_PERSONAL_TOKEN").unwrap(), "abc=def");
        assert_eq!(vars.get("JIRA_URL").unwrap(), "https://jira.example.com");
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn from_env_reads_token_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".mcp.env");
        fs::write(
            &path,
            "JIRA_PERSONAL_TOKEN=file-token\nJIRA_URL=https://jira.example.com\nJIRA_PROJECT=ABC\n",
        )
        .unwrap();

        temp_env::with_vars(
            [
                ("JIRA_PERSONAL_TOKEN", None::<&str>),
                ("JIRA_URL", None),
                ("JIRA_PROJECT", None),
            ],
            || {
                let config = JiraConfig::from_env(&path).unwrap();
                assert_eq!(config.token, "file-token");
                assert_eq!(config.base_url, "https://jira.example.com");
                assert_eq!(config.project, "ABC");
                assert_eq!(config.story_points_field, "customfield_10004");
            },
        );
    }

    #[test]
    fn from_env_process_environment_wins_over_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".mcp.env");
        fs::write(&path, "JIRA_PERSONAL_TOKEN=file-token\n").unwrap();

        temp_env::with_var("JIRA_PERSONAL_TOKEN", Some("env-token"), || {
            let config = JiraConfig::from_env(&path).unwrap();
            assert_eq!(config.token, "env-token");
        });
    }

    #[test]
    fn from_env_missing_token_is_fatal() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".mcp.env");
        fs::write(&path, "JIRA_URL=https://jira.example.com\n").unwrap();

        temp_env::with_vars([("JIRA_PERSONAL_TOKEN", None::<&str>)], || {
            let result = JiraConfig::from_env(&path);
            assert!(matches!(result, Err(ConfigError::MissingToken { .. })));
        });
    }

    #[test]
    fn from_env_rejects_invalid_base_url() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".mcp.env");
        fs::write(
            &path,
            "JIRA_PERSONAL_TOKEN=t\nJIRA_URL=not a url at all\n",
        )
        .unwrap();

        temp_env::with_vars(
            [("JIRA_PERSONAL_TOKEN", None::<&str>), ("JIRA_URL", None)],
            || {
                let result = JiraConfig::from_env(&path);
                assert!(matches!(result, Err(ConfigError::InvalidBaseUrl { .. })));
            },
        );
    }

    #[test]
    fn repo_target_parses_owner_and_name() {
        let repo = RepoTarget::parse("hmcts/cath-service").unwrap();
        assert_eq!(repo.owner, "hmcts");
        assert_eq!(repo.name, "cath-service");
        assert_eq!(repo.full_name(), "hmcts/cath-service");
        assert_eq!(repo.url(), "https://github.com/hmcts/cath-service");
    }

    #[test]
    fn repo_target_rejects_malformed_input() {
        assert!(matches!(
            RepoTarget::parse("no-slash"),
            Err(ConfigError::InvalidRepo { .. })
        ));
        assert!(matches!(
            RepoTarget::parse("a/b/c"),
            Err(ConfigError::InvalidRepo { .. })
        ));
        assert!(matches!(
            RepoTarget::parse("/name"),
            Err(ConfigError::InvalidRepo { .. })
        ));
    }

    #[test]
    fn migration_jql_orders_epics_first() {
        let config = JiraConfig {
            base_url: "https://jira.example.com".to_string(),
            token: "t".to_string(),
            project: "VIBE".to_string(),
            label: "CaTH".to_string(),
            story_points_field: "customfield_10004".to_string(),
            epic_link_field: "customfield_10008".to_string(),
        };

        assert_eq!(
            config.migration_jql(),
            "project = \"VIBE\" AND labels = \"CaTH\" ORDER BY issuetype ASC, key ASC"
        );
    }
}
