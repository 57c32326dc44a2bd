//! Stock keyword search against the top-search endpoint

use reqwest::Client;
use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::errors::CninfoError;
use crate::models::{CninfoApi, StockInfo};

/// Maximum candidates requested per search; only the first is used.
pub const DEFAULT_MAX_RESULTS: u32 = 10;

pub struct StockSearcher {
    client: Client,
    base_url: String,
}

impl StockSearcher {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        StockSearcher {
            client,
            base_url: base_url.into(),
        }
    }

    /// Resolve a stock code to its full identity via keyword search.
    ///
    /// The first candidate in the result set wins. An empty result set is
    /// `NotFound` — the code is wrong, not the network.
    pub async fn search(
        &self,
        keyword: &str,
        cache: Option<&CacheStore>,
    ) -> Result<StockInfo, CninfoError> {
        if let Some(cache) = cache {
            if let Some(raw) = cache.load_search(keyword, DEFAULT_MAX_RESULTS) {
                match serde_json::from_str::<Vec<StockInfo>>(&raw) {
                    Ok(results) => {
                        if let Some(stock) = results.into_iter().next() {
                            info!("Using cached stock info: {} ({})", stock.zwjc, stock.code);
                            return Ok(stock);
                        }
                    }
                    Err(e) => warn!("Ignoring unreadable search cache for '{}': {}", keyword, e),
                }
            }
        }

        let url = format!("{}{}", self.base_url, CninfoApi::SEARCH_ENDPOINT);
        debug!("Searching stock '{}' via {}", keyword, url);
        let max_num = DEFAULT_MAX_RESULTS.to_string();
        let response = self
            .client
            .post(&url)
            .form(&[("keyWord", keyword), ("maxNum", max_num.as_str())])
            .send()
            .await?
            .error_for_status()?;

        let raw = response.text().await?;
        let results: Vec<StockInfo> = serde_json::from_str(&raw)?;

        if let Some(cache) = cache {
            if !results.is_empty() {
                cache.save_search(keyword, DEFAULT_MAX_RESULTS, &raw);
            }
        }

        results
            .into_iter()
            .next()
            .map(|stock| {
                info!("Resolved stock info: {} ({})", stock.zwjc, stock.code);
                stock
            })
            .ok_or_else(|| CninfoError::NotFound(format!("stock '{}'", keyword)))
    }
}
