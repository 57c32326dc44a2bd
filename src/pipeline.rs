//! End-to-end orchestration
//!
//! One run: load catalog → resolve stock → resolve plate → enumerate (and
//! filter) categories → per category, drain the listing pager and hand each
//! record straight to the download engine. Resolution failures abort the run;
//! listing and download failures stay local to their category or record.

use anyhow::Result;
use reqwest::Client;
use tracing::{info, warn};

use crate::cache::{sanitize_component, CacheStore};
use crate::config::{filter_categories, CategoryCatalog, Config, MatchMode};
use crate::downloader::{DownloadOutcome, FileDownloader};
use crate::errors::CninfoError;
use crate::fetcher::{AnnouncementPager, PageOutcome};
use crate::models::CategoryEntry;
use crate::plate::PlateResolver;
use crate::search::StockSearcher;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub stock_code: String,
    /// Category key or display-name filter; `None` processes every category.
    pub category_filter: Option<String>,
    pub match_mode: MatchMode,
    /// Bypass the listing cache and stop each category at the first file
    /// that is already complete on disk.
    pub incremental: bool,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub downloaded: usize,
    pub attempted: usize,
}

pub async fn run(config: &Config, opts: &RunOptions) -> Result<RunSummary> {
    config.validate()?;

    let catalog = CategoryCatalog::load(&config.catalog_path)?;

    let client = Client::builder()
        .user_agent(&config.http.user_agent)
        .timeout(config.http_timeout())
        .build()?;

    info!("Processing stock: {}", opts.stock_code);

    let base_cache = CacheStore::new(&config.cache_dir);
    let searcher = StockSearcher::new(client.clone(), config.base_url.clone());
    let stock = searcher.search(&opts.stock_code, Some(&base_cache)).await?;

    // From here on, everything caches under the resolved stock's directory
    let cache = base_cache.scoped_to_stock(&stock.code, &stock.zwjc);

    let resolver = PlateResolver::new(client.clone(), config.base_url.clone());
    let plate = resolver.resolve(&stock, Some(&cache)).await?;

    let categories = catalog.categories_for(plate.as_str())?;
    let categories: Vec<CategoryEntry> = match &opts.category_filter {
        Some(filter) => {
            let filtered = filter_categories(categories, filter, opts.match_mode);
            if filtered.is_empty() {
                return Err(
                    CninfoError::ConfigMissing(format!("no category matches '{}'", filter)).into(),
                );
            }
            info!("Restricting to categories matching '{}'", filter);
            filtered
        }
        None => categories.to_vec(),
    };
    info!("Found {} categories for plate {}", categories.len(), plate.as_str());

    let download_dir = config.download_dir.join(sanitize_component(&stock.zwjc));
    let downloader = FileDownloader::new(
        client.clone(),
        config.static_base_url.clone(),
        config.download.clone(),
    );

    let mut summary = RunSummary::default();

    for category in &categories {
        if category.key.is_empty() || category.value.is_empty() {
            continue;
        }
        info!("Processing category: {} ({})", category.value, category.key);

        let mut pager = AnnouncementPager::new(
            &client,
            &cache,
            config.base_url.clone(),
            &stock,
            plate.clone(),
            category.clone(),
            config.page_size,
            opts.incremental,
        );

        let mut attempted = 0;
        let mut downloaded = 0;
        let mut stop_category = false;

        while let Some(outcome) = pager.next_page().await {
            match outcome {
                PageOutcome::Page { records, .. } => {
                    for record in records {
                        attempted += 1;
                        match downloader
                            .download_announcement(&record, &download_dir, &category.value)
                            .await
                        {
                            DownloadOutcome::Downloaded => downloaded += 1,
                            DownloadOutcome::SkippedExisting => {
                                downloaded += 1;
                                if opts.incremental {
                                    info!(
                                        "Reached an already-downloaded file in {}; the rest of the category is assumed present",
                                        category.value
                                    );
                                    stop_category = true;
                                    break;
                                }
                            }
                            DownloadOutcome::Failed => {}
                        }
                        if attempted % 10 == 0 {
                            info!(
                                "Category {} progress: {} announcements, {} downloaded",
                                category.value, attempted, downloaded
                            );
                        }
                    }
                }
                PageOutcome::Anomaly(reason) => {
                    warn!("Listing anomaly for {}: {}", category.value, reason)
                }
                PageOutcome::TransportFailure(e) => {
                    warn!("Listing fetch failed for {}: {}", category.value, e)
                }
            }
            if stop_category {
                break;
            }
        }

        info!(
            "Category {} complete: {}/{} downloaded",
            category.value, downloaded, attempted
        );
        summary.downloaded += downloaded;
        summary.attempted += attempted;
    }

    let cache_info = cache.info();
    info!(
        "Run complete: {}/{} announcements downloaded to {}",
        summary.downloaded,
        summary.attempted,
        download_dir.display()
    );
    info!(
        "Cache entries: {} search, {} stock page, {} listing",
        cache_info.search_count, cache_info.stock_count, cache_info.announcement_count
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DownloadConfig, HttpConfig};
    use crate::downloader::generate_filename;
    use crate::models::{Announcement, CninfoApi};
    use std::io::Write;
    use std::path::Path;
    use tempfile::TempDir;
    use wiremock::matchers::{body_string_contains, method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SEARCH_BODY: &str =
        r#"[{"code": "601225", "orgId": "9900023717", "sjstsBond": "false", "zwjc": "陕西煤业"}]"#;
    const STOCK_PAGE: &str = r#"<html><script>var plate = "sse";</script></html>"#;

    fn test_config(server_uri: &str, root: &Path) -> Config {
        let catalog_path = root.join("list-search.json");
        let mut file = std::fs::File::create(&catalog_path).unwrap();
        write!(
            file,
            r#"{{"sse": {{"category": [{{"key": "category_ndbg_szsh", "value": "年度报告"}}]}}}}"#
        )
        .unwrap();

        Config {
            cache_dir: root.join("cache"),
            download_dir: root.join("downloads"),
            catalog_path,
            page_size: 30,
            base_url: server_uri.to_string(),
            static_base_url: format!("{}/static/", server_uri),
            download: DownloadConfig {
                max_retries: 3,
                retry_delay_ms: 0,
                download_delay_ms: 0,
                size_tolerance_kb: 10,
            },
            http: HttpConfig::default(),
        }
    }

    fn record(n: u32) -> Announcement {
        Announcement {
            sec_code: "601225".to_string(),
            sec_name: "陕西煤业".to_string(),
            announcement_title: format!("202{}年年度报告", n),
            adjunct_url: format!("finalpage/2024-04-2{}/{}.PDF", n, n),
            adjunct_size: Some(20),
        }
    }

    fn listing_body(records: &[Announcement], has_more: bool) -> String {
        serde_json::json!({
            "announcements": records,
            "hasMore": has_more,
        })
        .to_string()
    }

    async fn mount_resolution(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path(CninfoApi::SEARCH_ENDPOINT))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(SEARCH_BODY, "application/json"),
            )
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(CninfoApi::STOCK_PAGE_ENDPOINT))
            .respond_with(ResponseTemplate::new(200).set_body_raw(STOCK_PAGE, "text/html"))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_full_run_downloads_all_records() {
        let server = MockServer::start().await;
        mount_resolution(&server).await;

        let records: Vec<Announcement> = (1..=3).map(record).collect();
        Mock::given(method("POST"))
            .and(path(CninfoApi::QUERY_ENDPOINT))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(listing_body(&records, false), "application/json"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/static/finalpage/.*\.PDF$"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 20 * 1024]))
            .expect(3)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let config = test_config(&server.uri(), dir.path());
        let opts = RunOptions {
            stock_code: "601225".to_string(),
            category_filter: None,
            match_mode: MatchMode::Fuzzy,
            incremental: false,
        };

        let summary = run(&config, &opts).await.unwrap();
        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.downloaded, 3);

        let category_dir = dir.path().join("downloads").join("陕西煤业").join("年度报告");
        assert_eq!(std::fs::read_dir(&category_dir).unwrap().count(), 3);
    }

    #[tokio::test]
    async fn test_incremental_stops_at_first_existing_file() {
        let server = MockServer::start().await;
        mount_resolution(&server).await;

        // Newest first: records 1 and 2 are new, record 3 already on disk,
        // records 4 and 5 live on page 2 and must never be requested.
        let page1: Vec<Announcement> = (1..=3).map(record).collect();
        Mock::given(method("POST"))
            .and(path(CninfoApi::QUERY_ENDPOINT))
            .and(body_string_contains("pageNum=1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(listing_body(&page1, true), "application/json"),
            )
            .expect(1)
            .mount(&server)
            .await;
        let page2: Vec<Announcement> = (4..=5).map(record).collect();
        Mock::given(method("POST"))
            .and(path(CninfoApi::QUERY_ENDPOINT))
            .and(body_string_contains("pageNum=2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(listing_body(&page2, false), "application/json"),
            )
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/static/finalpage/.*\.PDF$"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 20 * 1024]))
            .expect(2)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let config = test_config(&server.uri(), dir.path());
        let existing = dir
            .path()
            .join("downloads")
            .join("陕西煤业")
            .join("年度报告")
            .join(generate_filename(&record(3)));
        std::fs::create_dir_all(existing.parent().unwrap()).unwrap();
        std::fs::write(&existing, vec![0u8; 20 * 1024]).unwrap();

        let opts = RunOptions {
            stock_code: "601225".to_string(),
            category_filter: None,
            match_mode: MatchMode::Fuzzy,
            incremental: true,
        };

        let summary = run(&config, &opts).await.unwrap();
        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.downloaded, 3);
    }

    #[tokio::test]
    async fn test_unmatched_category_filter_is_fatal() {
        let server = MockServer::start().await;
        mount_resolution(&server).await;

        let dir = TempDir::new().unwrap();
        let config = test_config(&server.uri(), dir.path());
        let opts = RunOptions {
            stock_code: "601225".to_string(),
            category_filter: Some("不存在的分类".to_string()),
            match_mode: MatchMode::Fuzzy,
            incremental: false,
        };

        assert!(run(&config, &opts).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_stock_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CninfoApi::SEARCH_ENDPOINT))
            .respond_with(ResponseTemplate::new(200).set_body_raw("[]", "application/json"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let config = test_config(&server.uri(), dir.path());
        let opts = RunOptions {
            stock_code: "999999".to_string(),
            category_filter: None,
            match_mode: MatchMode::Fuzzy,
            incremental: false,
        };

        assert!(run(&config, &opts).await.is_err());
    }

    #[tokio::test]
    async fn test_listing_transport_failure_is_not_fatal() {
        let server = MockServer::start().await;
        mount_resolution(&server).await;
        Mock::given(method("POST"))
            .and(path(CninfoApi::QUERY_ENDPOINT))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let config = test_config(&server.uri(), dir.path());
        let opts = RunOptions {
            stock_code: "601225".to_string(),
            category_filter: None,
            match_mode: MatchMode::Fuzzy,
            incremental: false,
        };

        let summary = run(&config, &opts).await.unwrap();
        assert_eq!(summary.attempted, 0);
    }
}
