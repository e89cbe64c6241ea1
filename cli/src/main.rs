//! CLI for the JIRA to GitHub migration tool.
//!
//! Reads issues from a JIRA project, creates or updates the matching
//! GitHub issues, places them on a project board and links children to
//! their parent epics. Safe to re-run: existing issues are updated, not
//! duplicated.

use clap::Parser;
use jira_migrator::{
    BrowserUploader, GithubClient, JiraClient, JiraConfig, MigrateError, MigrationOptions,
    MigrationReport, Migrator, RepoTarget, DEFAULT_ENV_FILE,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Migrate JIRA issues to GitHub issues and project boards.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Target GitHub repository, e.g. hmcts/cath-service.
    #[arg(long)]
    repo: String,

    /// GitHub token. Optional for --dry-run.
    #[arg(long, env = "GITHUB_TOKEN")]
    token: Option<String>,

    /// List issues without creating or updating anything.
    #[arg(long)]
    dry_run: bool,

    /// Migrate issues but skip attachment uploads.
    #[arg(long)]
    skip_attachments: bool,

    /// Migrate issues but skip comment migration.
    #[arg(long)]
    skip_comments: bool,

    /// Migrate only the first N issues (for testing).
    #[arg(long)]
    limit: Option<usize>,

    /// GitHub project board number to place issues on.
    #[arg(long, alias = "project")]
    board: Option<u64>,

    /// Env file holding JIRA_PERSONAL_TOKEN and JIRA_URL.
    #[arg(long, default_value = DEFAULT_ENV_FILE)]
    env_file: PathBuf,

    /// Override the JIRA project to migrate from.
    #[arg(long)]
    jira_project: Option<String>,

    /// Override the JIRA label filtering migrated issues.
    #[arg(long)]
    jira_label: Option<String>,

    /// Where to write the JSON migration report.
    #[arg(long, default_value = "migration-report.json")]
    report_path: PathBuf,

    /// WebDriver endpoint for browser-driven attachment uploads.
    #[arg(long, default_value = "http://localhost:4444")]
    webdriver_url: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    // Map a missing required flag to exit code 1 with the usage message;
    // --help and --version still exit 0.
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = u8::from(e.use_stderr());
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    match run(args).await {
        Ok(report) => {
            print_summary(&report);
            if report.has_failures() {
                ExitCode::from(1)
            } else {
                ExitCode::from(0)
            }
        }
        Err(e) => {
            error!(error = %e, "Migration aborted");
            ExitCode::from(1)
        }
    }
}

/// Initializes tracing with environment filter support.
///
/// Sets up the global tracing subscriber with:
/// - Compact log formatting (single-line output)
/// - Log level filtering via `RUST_LOG` env var (defaults to "info")
fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

/// Main execution logic.
async fn run(args: Args) -> Result<MigrationReport, MigrateError> {
    let repo = RepoTarget::parse(&args.repo)?;

    let mut jira = JiraConfig::from_env(&args.env_file)?;
    if let Some(project) = args.jira_project {
        jira.project = project;
    }
    if let Some(label) = args.jira_label {
        jira.label = label;
    }

    if args.token.is_none() && !args.dry_run {
        return Err(jira_migrator::ConfigError::MissingGithubToken.into());
    }
    let github = GithubClient::from_token(args.token, repo.clone(), jira.base_url.clone())
        .map_err(MigrateError::Auth)?;
    let source = JiraClient::new(jira.clone());

    let options = MigrationOptions {
        repo,
        dry_run: args.dry_run,
        skip_attachments: args.skip_attachments,
        skip_comments: args.skip_comments,
        limit: args.limit,
        board: args.board,
        report_path: args.report_path,
    };

    let mut migrator = Migrator::new(source, github, jira, options);

    // Browser uploads only matter on a live run that keeps attachments. A
    // missing WebDriver degrades to skipped uploads rather than aborting.
    if !args.dry_run && !args.skip_attachments {
        match BrowserUploader::connect(&args.webdriver_url).await {
            Ok(uploader) => migrator = migrator.with_uploader(Box::new(uploader)),
            Err(e) => {
                warn!(
                    url = %args.webdriver_url,
                    error = %e,
                    "WebDriver unavailable, attachments will not be uploaded"
                );
            }
        }
    }

    migrator.run().await
}

/// Prints the final run summary.
fn print_summary(report: &MigrationReport) {
    println!("\nMigration Summary:");
    println!("  Total Issues: {}", report.total_issues);
    println!("    Epics Created: {}", report.epics_created);
    println!("    Children Linked: {}", report.children_linked);
    println!("    Orphans (no Epic): {}", report.orphans_created);
    println!("  Created: {}", report.created_count);
    println!("  Updated: {}", report.updated_count);
    println!("  Failed: {}", report.failed_migrations);
    println!(
        "  Attachments Uploaded: {}",
        report.total_attachments_uploaded
    );
    println!("  Comments Added: {}", report.total_comments_added);
}
