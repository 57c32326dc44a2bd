//! Centralized configuration management for cninfo-dl

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::errors::CninfoError;
use crate::models::CategoryEntry;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for cached responses
    pub cache_dir: PathBuf,
    /// Root directory for downloaded PDFs
    pub download_dir: PathBuf,
    /// Path to the category catalog file
    pub catalog_path: PathBuf,
    /// Listing page size
    pub page_size: u32,
    /// Disclosure portal base URL (search, plate page, listing endpoints)
    pub base_url: String,
    /// Static-asset host serving announcement attachments
    pub static_base_url: String,
    /// Download behavior configuration
    pub download: DownloadConfig,
    /// HTTP client configuration
    pub http: HttpConfig,
}

/// Retry and rate-limiting configuration for attachment downloads
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Maximum download attempts per attachment
    pub max_retries: u32,
    /// Delay before each retry after the first attempt (milliseconds)
    pub retry_delay_ms: u64,
    /// Delay after a successful download (milliseconds)
    pub download_delay_ms: u64,
    /// Accepted shortfall between actual and expected size (kilobytes)
    pub size_tolerance_kb: u64,
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent string
    pub user_agent: String,
}

impl DownloadConfig {
    /// Delay before each retry after the first attempt
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Delay after a successful download
    pub fn download_delay(&self) -> Duration {
        Duration::from_millis(self.download_delay_ms)
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1000,
            download_delay_ms: 1000,
            size_tolerance_kb: 10,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 60,
            user_agent: crate::models::CninfoApi::BROWSER_USER_AGENT.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables and defaults
    pub fn from_env() -> Result<Self> {
        let cache_dir = std::env::var("CNINFO_CACHE_DIR")
            .unwrap_or_else(|_| "./cache".to_string())
            .into();

        let download_dir = std::env::var("CNINFO_DOWNLOAD_DIR")
            .unwrap_or_else(|_| "./downloads".to_string())
            .into();

        let catalog_path = std::env::var("CNINFO_CATALOG_PATH")
            .unwrap_or_else(|_| "./list-search.json".to_string())
            .into();

        let page_size = parse_env_var("CNINFO_PAGE_SIZE")?.unwrap_or(30);

        let base_url = std::env::var("CNINFO_BASE_URL")
            .unwrap_or_else(|_| crate::models::CninfoApi::BASE_URL.to_string());
        let static_base_url = std::env::var("CNINFO_STATIC_BASE_URL")
            .unwrap_or_else(|_| crate::models::CninfoApi::STATIC_BASE_URL.to_string());

        let download = DownloadConfig {
            max_retries: parse_env_var("CNINFO_MAX_RETRIES")?.unwrap_or(3),
            retry_delay_ms: parse_env_var("CNINFO_RETRY_DELAY_MS")?.unwrap_or(1000),
            download_delay_ms: parse_env_var("CNINFO_DOWNLOAD_DELAY_MS")?.unwrap_or(1000),
            size_tolerance_kb: parse_env_var("CNINFO_SIZE_TOLERANCE_KB")?.unwrap_or(10),
        };

        let http = HttpConfig {
            timeout_seconds: parse_env_var("CNINFO_HTTP_TIMEOUT_SECONDS")?.unwrap_or(60),
            user_agent: std::env::var("CNINFO_USER_AGENT")
                .unwrap_or_else(|_| crate::models::CninfoApi::BROWSER_USER_AGENT.to_string()),
        };

        Ok(Config {
            cache_dir,
            download_dir,
            catalog_path,
            page_size,
            base_url,
            static_base_url,
            download,
            http,
        })
    }

    /// Get HTTP timeout as Duration
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_seconds)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        std::fs::create_dir_all(&self.download_dir).with_context(|| {
            format!(
                "Cannot create download directory: {}",
                self.download_dir.display()
            )
        })?;
        std::fs::create_dir_all(&self.cache_dir).with_context(|| {
            format!("Cannot create cache directory: {}", self.cache_dir.display())
        })?;
        Ok(())
    }
}

/// Helper function to parse environment variable as a specific type
fn parse_env_var<T>(var_name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display + Send + Sync + std::error::Error + 'static,
{
    match std::env::var(var_name) {
        Ok(val) => val.parse().map(Some).with_context(|| {
            format!("Failed to parse environment variable {} = '{}'", var_name, val)
        }),
        Err(_) => Ok(None),
    }
}

/// How a user-supplied category filter matches display names.
/// Filter keys always match exactly regardless of mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Display name must contain the filter as a substring
    Fuzzy,
    /// Display name must equal the filter
    Exact,
}

#[derive(Debug, Deserialize)]
struct PlateCategories {
    #[serde(default)]
    category: Vec<CategoryEntry>,
}

/// Static disclosure-category catalog, keyed by plate code.
#[derive(Debug)]
pub struct CategoryCatalog {
    plates: HashMap<String, PlateCategories>,
}

impl CategoryCatalog {
    /// Load the catalog from a JSON file (`list-search.json`).
    pub fn load(path: &Path) -> Result<Self, CninfoError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CninfoError::ConfigMissing(format!("cannot read catalog {}: {}", path.display(), e))
        })?;
        let plates: HashMap<String, PlateCategories> = serde_json::from_str(&raw)?;
        info!("Loaded category catalog from {}", path.display());
        Ok(CategoryCatalog { plates })
    }

    /// Categories for a plate, in catalog order.
    pub fn categories_for(&self, plate: &str) -> Result<&[CategoryEntry], CninfoError> {
        self.plates
            .get(plate)
            .map(|p| p.category.as_slice())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                CninfoError::ConfigMissing(format!("no categories configured for plate '{}'", plate))
            })
    }
}

/// Restrict a category list to entries matching a user-supplied filter.
///
/// The filter matches a category when it equals its key, or when it matches
/// the display name under the given mode.
pub fn filter_categories(
    entries: &[CategoryEntry],
    filter: &str,
    mode: MatchMode,
) -> Vec<CategoryEntry> {
    entries
        .iter()
        .filter(|e| {
            e.key == filter
                || match mode {
                    MatchMode::Fuzzy => !e.value.is_empty() && e.value.contains(filter),
                    MatchMode::Exact => e.value == filter,
                }
        })
        .cloned()
        .collect()
}
