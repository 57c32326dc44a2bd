//! Exchange plate resolution
//!
//! The portal does not expose the plate through an API; it is assigned to a
//! javascript variable inside the per-stock disclosure page. The page HTML is
//! cached verbatim so re-runs re-extract without refetching.

use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use std::sync::OnceLock;
use tracing::{debug, info};

use crate::cache::CacheStore;
use crate::errors::CninfoError;
use crate::models::{CninfoApi, Plate, StockInfo};

static PLATE_RE: OnceLock<Regex> = OnceLock::new();

fn plate_re() -> &'static Regex {
    PLATE_RE.get_or_init(|| Regex::new(r#"var\s+plate\s*=\s*["']([^"']+)["']"#).unwrap())
}

pub struct PlateResolver {
    client: Client,
    base_url: String,
}

impl PlateResolver {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        PlateResolver {
            client,
            base_url: base_url.into(),
        }
    }

    /// Determine the exchange plate for a resolved stock.
    pub async fn resolve(
        &self,
        stock: &StockInfo,
        cache: Option<&CacheStore>,
    ) -> Result<Plate, CninfoError> {
        if let Some(cache) = cache {
            if let Some(html) = cache.load_stock_page(&stock.code, &stock.org_id, &stock.sjsts_bond)
            {
                if let Some(code) = extract_plate(&html) {
                    info!("Using cached plate: {}", code);
                    return Ok(Plate::from_code(&code));
                }
            }
        }

        let url = format!("{}{}", self.base_url, CninfoApi::STOCK_PAGE_ENDPOINT);
        debug!("Fetching stock page for {} via {}", stock.code, url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("stockCode", stock.code.as_str()),
                ("orgId", stock.org_id.as_str()),
                ("sjstsBond", stock.sjsts_bond.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let html = response.text().await?;

        if let Some(cache) = cache {
            cache.save_stock_page(&stock.code, &stock.org_id, &stock.sjsts_bond, &html);
        }

        extract_plate(&html)
            .map(|code| {
                info!("Resolved plate: {}", code);
                Plate::from_code(&code)
            })
            .ok_or_else(|| CninfoError::NotFound(format!("plate for stock {}", stock.code)))
    }
}

/// Scan embedded script blocks for the plate assignment.
fn extract_plate(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("script").ok()?;
    for script in document.select(&selector) {
        let text: String = script.text().collect();
        if let Some(caps) = plate_re().captures(&text) {
            return Some(caps[1].to_string());
        }
    }
    None
}
