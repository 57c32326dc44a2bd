//! Attachment download engine
//!
//! Downloads one announcement PDF to a deterministic path derived from its
//! date, security, and title. Idempotent against files already on disk: a
//! file whose size is within the configured tolerance of the expected size is
//! never re-fetched or overwritten. Undersized or missing files are fetched
//! with a bounded retry loop and re-verified after every attempt.

use futures::StreamExt;
use regex::Regex;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use crate::cache::sanitize_component;
use crate::config::DownloadConfig;
use crate::errors::CninfoError;
use crate::models::Announcement;

/// Cap on the sanitized title inside a generated filename. Titles are remote
/// text with no length guarantee.
const MAX_TITLE_CHARS: usize = 120;

static DATE_RE: OnceLock<Regex> = OnceLock::new();

fn date_re() -> &'static Regex {
    DATE_RE.get_or_init(|| Regex::new(r"\d{4}-\d{2}-\d{2}").unwrap())
}

/// Result of one download attempt chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Fetched and size-verified.
    Downloaded,
    /// A satisfying file was already on disk; no network call was made.
    SkippedExisting,
    /// No attachment URL, or every retry failed.
    Failed,
}

pub struct FileDownloader {
    client: Client,
    base_url: String,
    config: DownloadConfig,
}

impl FileDownloader {
    pub fn new(client: Client, base_url: impl Into<String>, config: DownloadConfig) -> Self {
        FileDownloader {
            client,
            base_url: base_url.into(),
            config,
        }
    }

    /// Download one announcement's PDF under `base_dir/category_name/`.
    ///
    /// Never returns an error: failures are logged and folded into the
    /// outcome so one bad record does not end its category.
    pub async fn download_announcement(
        &self,
        announcement: &Announcement,
        base_dir: &Path,
        category_name: &str,
    ) -> DownloadOutcome {
        if announcement.adjunct_url.is_empty() {
            error!(
                "Announcement '{}' has no attachment URL",
                announcement.announcement_title
            );
            return DownloadOutcome::Failed;
        }

        let url = join_url(&self.base_url, &announcement.adjunct_url);
        let file_path = destination_path(announcement, base_dir, category_name);
        let expected_kb = announcement.expected_size_kb();

        if file_path.exists() {
            let actual_kb = file_size_kb(&file_path);
            if self.within_tolerance(actual_kb, expected_kb) {
                info!(
                    "File exists and is complete, skipping: {} ({}KB)",
                    file_path.display(),
                    actual_kb
                );
                return DownloadOutcome::SkippedExisting;
            }
            info!(
                "File exists but is undersized ({}KB of {}KB), re-downloading: {}",
                actual_kb,
                expected_kb,
                file_path.display()
            );
        }

        debug!("Downloading {} -> {}", url, file_path.display());
        match self.fetch_with_retries(&url, &file_path, expected_kb).await {
            Ok(()) => {
                // Rate-limit the static host between downloads
                tokio::time::sleep(self.config.download_delay()).await;
                DownloadOutcome::Downloaded
            }
            Err(e) => {
                error!(
                    "Download failed after {} attempts: {} ({})",
                    self.config.max_retries,
                    file_path.display(),
                    e
                );
                DownloadOutcome::Failed
            }
        }
    }

    async fn fetch_with_retries(
        &self,
        url: &str,
        file_path: &Path,
        expected_kb: u64,
    ) -> Result<(), CninfoError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            if attempt > 1 {
                tokio::time::sleep(self.config.retry_delay()).await;
            }
            match self.fetch_once(url, file_path, expected_kb).await {
                Ok(actual_kb) => {
                    info!("Downloaded: {} ({}KB)", file_path.display(), actual_kb);
                    return Ok(());
                }
                Err(e) if attempt < self.config.max_retries => {
                    warn!(
                        "Attempt {}/{} failed for {}: {}",
                        attempt, self.config.max_retries, url, e
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One streaming transfer to disk, followed by the size check.
    async fn fetch_once(
        &self,
        url: &str,
        file_path: &Path,
        expected_kb: u64,
    ) -> Result<u64, CninfoError> {
        if let Some(parent) = file_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let response = self.client.get(url).send().await?.error_for_status()?;

        let mut file = tokio::fs::File::create(file_path).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        drop(file);

        let actual_kb = file_size_kb(file_path);
        if !self.within_tolerance(actual_kb, expected_kb) {
            return Err(CninfoError::SizeMismatch {
                expected: expected_kb,
                actual: actual_kb,
            });
        }
        Ok(actual_kb)
    }

    fn within_tolerance(&self, actual_kb: u64, expected_kb: u64) -> bool {
        actual_kb >= expected_kb.saturating_sub(self.config.size_tolerance_kb)
    }
}

/// Join the static host and a relative attachment path, tolerating a base
/// with or without a trailing slash (env overrides carry either).
fn join_url(base: &str, relative: &str) -> String {
    let relative = relative.trim_start_matches('/');
    if base.ends_with('/') {
        format!("{}{}", base, relative)
    } else {
        format!("{}/{}", base, relative)
    }
}

/// Extract the `YYYY-MM-DD` date token from an attachment path, if present.
pub fn extract_date(adjunct_url: &str) -> Option<&str> {
    date_re().find(adjunct_url).map(|m| m.as_str())
}

/// Build the destination filename for an announcement.
///
/// Joins date, security code, security name, and sanitized title with
/// underscores. Code and name are omitted when the title already contains
/// them, so regenerated filenames stay stable across portal title formats.
pub fn generate_filename(announcement: &Announcement) -> String {
    let title = &announcement.announcement_title;
    let mut parts: Vec<String> = Vec::new();

    if let Some(date) = extract_date(&announcement.adjunct_url) {
        parts.push(date.to_string());
    }
    if !announcement.sec_code.is_empty() && !title.contains(&announcement.sec_code) {
        parts.push(announcement.sec_code.clone());
    }
    if !announcement.sec_name.is_empty() && !title.contains(&announcement.sec_name) {
        parts.push(announcement.sec_name.clone());
    }

    let clean_title: String = title
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            _ => c,
        })
        .take(MAX_TITLE_CHARS)
        .collect();
    parts.push(clean_title);

    format!("{}.pdf", parts.join("_"))
}

fn destination_path(announcement: &Announcement, base_dir: &Path, category_name: &str) -> PathBuf {
    base_dir
        .join(sanitize_component(category_name))
        .join(generate_filename(announcement))
}

fn file_size_kb(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len() / 1024).unwrap_or(0)
}
