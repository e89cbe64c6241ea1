//! Browser-driven attachment upload.
//!
//! GitHub's REST API has no endpoint for user-content attachments, so files
//! are uploaded by driving a real browser session against the issue page.
//! Login state is checked once per process; if the session is not
//! authenticated the process blocks for interactive operator login. That
//! suspension is acceptable only because this is an operator-run migration
//! utility, not a service.

use async_trait::async_trait;
use fantoccini::{Client, ClientBuilder, Locator};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncBufReadExt;
use tracing::{info, warn};

/// Errors from the browser-automation layer.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Could not start a WebDriver session.
    #[error("Failed to connect to WebDriver: {0}")]
    Session(#[from] fantoccini::error::NewSessionError),

    /// A browser command failed.
    #[error("Browser command failed: {0}")]
    Command(#[from] fantoccini::error::CmdError),

    /// Reading operator input failed.
    #[error("Failed to read operator input: {0}")]
    Io(#[from] std::io::Error),
}

/// Uploads local files to a destination issue as a single comment.
#[async_trait]
pub trait Uploader: Send {
    /// Checks login state, blocking for interactive operator login when the
    /// session is unauthenticated. Called once per process.
    async fn ensure_login(&mut self) -> Result<(), UploadError>;

    /// Uploads `files` to the issue at `issue_url` as one comment. A single
    /// file's failure is logged and skipped, not fatal.
    async fn upload(&mut self, issue_url: &str, files: &[PathBuf]) -> Result<(), UploadError>;
}

/// Primary trigger: the hidden file input wired to the new-comment box.
const FILE_INPUT_PRIMARY: &str = "input#fc-new_comment_field";

/// Fallback trigger when the page layout differs.
const FILE_INPUT_FALLBACK: &str = "input[type=file]";

/// Marker element present only for signed-in sessions.
const LOGGED_IN_MARKER: &str = "meta[name=user-login][content]";

const COMMENT_FIELD: &str = "textarea#new_comment_field";

/// How long to wait for an in-progress upload indicator to clear.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// WebDriver-backed [`Uploader`].
pub struct BrowserUploader {
    client: Client,
    login_checked: bool,
}

impl BrowserUploader {
    /// Connects to a running WebDriver at `webdriver_url`.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::Session`] when no session can be established.
    pub async fn connect(webdriver_url: &str) -> Result<Self, UploadError> {
        info!(url = webdriver_url, "Connecting to WebDriver");
        let client = ClientBuilder::native().connect(webdriver_url).await?;
        Ok(Self {
            client,
            login_checked: false,
        })
    }

    /// Closes the browser session.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::Command`] if the session refuses to close.
    pub async fn close(self) -> Result<(), UploadError> {
        self.client.close().await?;
        Ok(())
    }

    async fn is_logged_in(&self) -> bool {
        self.client
            .find(Locator::Css(LOGGED_IN_MARKER))
            .await
            .is_ok()
    }

    /// Sends one file to the upload input, trying the primary trigger and
    /// falling back to the generic one.
    async fn attach_file(&self, path: &Path) -> Result<(), UploadError> {
        let primary = self.client.find(Locator::Css(FILE_INPUT_PRIMARY)).await;
        let input = match primary {
            Ok(input) => input,
            Err(_) => self.client.find(Locator::Css(FILE_INPUT_FALLBACK)).await?,
        };

        input.send_keys(&path.display().to_string()).await?;
        Ok(())
    }

    /// Waits until the "Uploading" indicator clears, bounded by
    /// [`UPLOAD_TIMEOUT`]. If the indicator never appears the upload was
    /// fast enough to miss; a short grace period covers that.
    async fn wait_for_upload(&self) {
        let indicator = Locator::XPath("//*[contains(text(), 'Uploading')]");
        let deadline = tokio::time::Instant::now() + UPLOAD_TIMEOUT;

        if self.client.find(indicator).await.is_err() {
            tokio::time::sleep(Duration::from_secs(2)).await;
            return;
        }

        while tokio::time::Instant::now() < deadline {
            if self.client.find(indicator).await.is_err() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        warn!("Upload indicator did not clear before timeout");
    }
}

#[async_trait]
impl Uploader for BrowserUploader {
    async fn ensure_login(&mut self) -> Result<(), UploadError> {
        if self.login_checked {
            return Ok(());
        }

        info!("Checking GitHub browser session");
        self.client.goto("https://github.com").await?;

        if !self.is_logged_in().await {
            println!("\n====================================");
            println!("Please log in to GitHub in the browser window");
            println!("Press ENTER after you have logged in...");
            println!("====================================\n");

            let mut line = String::new();
            let mut stdin = tokio::io::BufReader::new(tokio::io::stdin());
            stdin.read_line(&mut line).await?;

            self.client.refresh().await?;
        }

        info!("GitHub browser session confirmed");
        self.login_checked = true;
        Ok(())
    }

    async fn upload(&mut self, issue_url: &str, files: &[PathBuf]) -> Result<(), UploadError> {
        if files.is_empty() {
            return Ok(());
        }

        info!(count = files.len(), issue = issue_url, "Uploading attachments");
        self.client.goto(issue_url).await?;

        let comment_field = self
            .client
            .wait()
            .for_element(Locator::Css(COMMENT_FIELD))
            .await?;
        comment_field.click().await?;
        comment_field.send_keys("Attachments from JIRA:").await?;

        for path in files {
            let filename = path
                .file_name()
                .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());

            match self.attach_file(path).await {
                Ok(()) => {
                    self.wait_for_upload().await;
                    info!(file = %filename, "Attachment uploaded");
                }
                Err(e) => {
                    warn!(file = %filename, error = %e, "Failed to attach file, skipping");
                }
            }
        }

        // Submit the comment carrying all uploaded files.
        let submit = self
            .client
            .find(Locator::XPath("//button[contains(., 'Comment')]"))
            .await?;
        submit.click().await?;
        tokio::time::sleep(Duration::from_secs(2)).await;

        Ok(())
    }
}
