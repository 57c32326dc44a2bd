//! Filesystem-backed response cache
//!
//! Every remote response (stock search, plate page, listing page) is persisted
//! under a path derived deterministically from the full set of request
//! parameters. Entries never expire; `clear` is the only invalidation. Cache
//! failures are never fatal: a failed save is logged and the fresh payload is
//! still used, a failed load behaves like a miss and forces a live fetch.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const SEARCH_DIR: &str = "topSearchquery";
const STOCK_DIR: &str = "stock";
const ANNOUNCEMENT_DIR: &str = "hisAnnouncementquery";

/// Cap on a single sanitized path component. Announcement titles and category
/// names come from remote text with no length guarantee; 120 chars keeps the
/// full path well under common filesystem limits.
const MAX_COMPONENT_CHARS: usize = 120;

/// Map untrusted text to a filesystem-safe path component.
///
/// Replaces the characters that carry structure in cache keys or paths
/// (comma, semicolon, space, slashes) with underscores and truncates to
/// [`MAX_COMPONENT_CHARS`]. Total over all inputs, so equal inputs always
/// produce equal components.
pub fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            ',' | ';' | ' ' | '/' | '\\' => '_',
            _ => c,
        })
        .take(MAX_COMPONENT_CHARS)
        .collect()
}

/// Composite key for one cached listing page. Every field that affects the
/// remote response is part of the filename.
#[derive(Debug, Clone)]
pub struct ListingKey {
    /// `"code,orgId"` as sent in the query
    pub stock: String,
    pub page_num: u32,
    /// Category query key
    pub category: String,
    /// Plate code (the query's `column` field)
    pub column: String,
    /// Derived plate parameter (the query's `plate` field)
    pub plate_param: String,
    pub search_key: String,
    pub se_date: String,
    /// Category display name; partitions the listing cache on disk
    pub category_value: Option<String>,
}

impl ListingKey {
    /// Subdirectory under the listing cache, one per category.
    pub fn dir_name(&self) -> String {
        sanitize_component(self.category_value.as_deref().unwrap_or("unknown"))
    }

    pub fn file_name(&self) -> String {
        let search_key = if self.search_key.is_empty() {
            "empty".to_string()
        } else {
            sanitize_component(&self.search_key)
        };
        let se_date = if self.se_date.is_empty() {
            "empty".to_string()
        } else {
            self.se_date.replace('-', "")
        };
        format!(
            "{}_{}_{}_{}_{}_{}_{}_hisAnnouncementquery.json",
            sanitize_component(&self.stock),
            self.page_num,
            sanitize_component(&self.category),
            sanitize_component(&self.column),
            sanitize_component(&self.plate_param),
            search_key,
            se_date,
        )
    }
}

/// Which part of the cache an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Search,
    StockPage,
    Announcement,
}

/// Entry counts per cache kind, for the `cache info` command.
#[derive(Debug, Default)]
pub struct CacheInfo {
    pub search_count: usize,
    pub stock_count: usize,
    pub announcement_count: usize,
}

/// One cache directory tree, optionally scoped to a resolved stock.
#[derive(Debug, Clone)]
pub struct CacheStore {
    base: PathBuf,
    root: PathBuf,
}

impl CacheStore {
    /// Unscoped store rooted directly at `base`. Used before the stock is
    /// resolved (the stock search itself caches here).
    pub fn new(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        let root = base.clone();
        CacheStore { base, root }
    }

    /// Store scoped to `<base>/<code>_<name>`, used once the stock identity
    /// is known so runs for different stocks never share listing entries.
    pub fn scoped_to_stock(&self, code: &str, name: &str) -> CacheStore {
        let dir = format!("{}_{}", sanitize_component(code), sanitize_component(name));
        CacheStore {
            base: self.base.clone(),
            root: self.base.join(dir),
        }
    }

    fn search_dir(&self) -> PathBuf {
        self.root.join(SEARCH_DIR)
    }

    fn stock_dir(&self) -> PathBuf {
        self.root.join(STOCK_DIR)
    }

    fn announcement_dir(&self) -> PathBuf {
        self.root.join(ANNOUNCEMENT_DIR)
    }

    fn search_path(&self, key_word: &str, max_num: u32) -> PathBuf {
        self.search_dir().join(format!(
            "{}_{}_topSearchquery.json",
            sanitize_component(key_word),
            max_num
        ))
    }

    fn stock_page_path(&self, stock_code: &str, org_id: &str, sjsts_bond: &str) -> PathBuf {
        self.stock_dir().join(format!(
            "{}_{}_{}_disclosurestock.html",
            sanitize_component(stock_code),
            sanitize_component(org_id),
            sanitize_component(sjsts_bond)
        ))
    }

    fn listing_path(&self, key: &ListingKey) -> PathBuf {
        self.announcement_dir()
            .join(key.dir_name())
            .join(key.file_name())
    }

    pub fn save_search(&self, key_word: &str, max_num: u32, payload: &str) {
        self.write(&self.search_path(key_word, max_num), payload);
    }

    pub fn load_search(&self, key_word: &str, max_num: u32) -> Option<String> {
        self.read(&self.search_path(key_word, max_num))
    }

    pub fn save_stock_page(&self, stock_code: &str, org_id: &str, sjsts_bond: &str, html: &str) {
        self.write(&self.stock_page_path(stock_code, org_id, sjsts_bond), html);
    }

    pub fn load_stock_page(&self, stock_code: &str, org_id: &str, sjsts_bond: &str) -> Option<String> {
        self.read(&self.stock_page_path(stock_code, org_id, sjsts_bond))
    }

    pub fn save_listing(&self, key: &ListingKey, payload: &str) {
        self.write(&self.listing_path(key), payload);
    }

    pub fn load_listing(&self, key: &ListingKey) -> Option<String> {
        self.read(&self.listing_path(key))
    }

    fn write(&self, path: &Path, payload: &str) {
        let result = path
            .parent()
            .map(fs::create_dir_all)
            .transpose()
            .and_then(|_| fs::write(path, payload));
        match result {
            Ok(_) => debug!("Cached {}", path.display()),
            Err(e) => warn!("Failed to cache {}: {}", path.display(), e),
        }
    }

    fn read(&self, path: &Path) -> Option<String> {
        if !path.exists() {
            return None;
        }
        match fs::read_to_string(path) {
            Ok(payload) => {
                debug!("Cache hit: {}", path.display());
                Some(payload)
            }
            Err(e) => {
                warn!("Failed to read cache {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Entry counts per kind (listing entries counted recursively across
    /// category subdirectories).
    pub fn info(&self) -> CacheInfo {
        CacheInfo {
            search_count: count_files(&self.search_dir()),
            stock_count: count_files(&self.stock_dir()),
            announcement_count: count_files(&self.announcement_dir()),
        }
    }

    /// Remove cached entries of one kind, or everything when `kind` is None.
    pub fn clear(&self, kind: Option<CacheKind>) -> std::io::Result<()> {
        if matches!(kind, None | Some(CacheKind::Search)) {
            clear_directory(&self.search_dir())?;
        }
        if matches!(kind, None | Some(CacheKind::StockPage)) {
            clear_directory(&self.stock_dir())?;
        }
        if matches!(kind, None | Some(CacheKind::Announcement)) {
            clear_directory(&self.announcement_dir())?;
        }
        Ok(())
    }
}

fn count_files(dir: &Path) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() {
                count_files(&path)
            } else {
                1
            }
        })
        .sum()
}

fn clear_directory(dir: &Path) -> std::io::Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}
