//! Announcement listing pagination
//!
//! [`AnnouncementPager`] walks the listing endpoint one page at a time for a
//! (stock, category) pair, consulting and populating the response cache per
//! page. Each page yields a tagged [`PageOutcome`] so the three ways a
//! sequence can end (no more pages, malformed payload, transport failure)
//! stay distinguishable to the caller.

use reqwest::Client;
use tracing::{debug, info, warn};

use crate::cache::{CacheStore, ListingKey};
use crate::errors::CninfoError;
use crate::models::{Announcement, CategoryEntry, CninfoApi, Plate, QueryResponse, StockInfo};

/// Result of fetching one listing page.
#[derive(Debug)]
pub enum PageOutcome {
    /// A well-formed page, possibly with zero records.
    Page {
        records: Vec<Announcement>,
        has_more: bool,
    },
    /// Payload parsed but lacks the `announcements` field. Terminal.
    Anomaly(String),
    /// Network or decode failure. Terminal; records already yielded from
    /// earlier pages remain valid.
    TransportFailure(CninfoError),
}

/// One-shot pager over a (stock, category) listing. Not restartable: a new
/// traversal needs a new pager.
pub struct AnnouncementPager<'a> {
    client: &'a Client,
    cache: &'a CacheStore,
    base_url: String,
    stock: String,
    plate: Plate,
    category: CategoryEntry,
    page_size: u32,
    /// Skip both cache reads and writes, forcing live fetches. Used by
    /// incremental runs so freshly published announcements are visible.
    bypass_cache: bool,
    page_num: u32,
    exhausted: bool,
}

impl<'a> AnnouncementPager<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: &'a Client,
        cache: &'a CacheStore,
        base_url: impl Into<String>,
        stock: &StockInfo,
        plate: Plate,
        category: CategoryEntry,
        page_size: u32,
        bypass_cache: bool,
    ) -> Self {
        AnnouncementPager {
            client,
            cache,
            base_url: base_url.into(),
            stock: format!("{},{}", stock.code, stock.org_id),
            plate,
            category,
            page_size,
            bypass_cache,
            page_num: 1,
            exhausted: false,
        }
    }

    fn listing_key(&self) -> ListingKey {
        ListingKey {
            stock: self.stock.clone(),
            page_num: self.page_num,
            category: self.category.key.clone(),
            column: self.plate.as_str().to_string(),
            plate_param: self.plate.query_param().to_string(),
            search_key: String::new(),
            se_date: String::new(),
            category_value: Some(self.category.value.clone()),
        }
    }

    /// Fetch the next page. Returns `None` once the sequence has terminated;
    /// `Anomaly` and `TransportFailure` outcomes are themselves terminal.
    pub async fn next_page(&mut self) -> Option<PageOutcome> {
        if self.exhausted {
            return None;
        }

        let key = self.listing_key();

        let raw = match self.load_page(&key).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    "Listing request failed for {} page {}: {}",
                    self.category.value, self.page_num, e
                );
                self.exhausted = true;
                return Some(PageOutcome::TransportFailure(e));
            }
        };

        let response: QueryResponse = match serde_json::from_str(&raw) {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    "Failed to decode listing page {} for {}: {}",
                    self.page_num, self.category.value, e
                );
                self.exhausted = true;
                return Some(PageOutcome::TransportFailure(CninfoError::Decode(e)));
            }
        };

        let Some(records) = response.announcements else {
            self.exhausted = true;
            return Some(PageOutcome::Anomaly(format!(
                "page {} payload missing 'announcements' field",
                self.page_num
            )));
        };
        // A null field is a present-but-empty page, not an anomaly
        let records = records.unwrap_or_default();

        info!(
            "Page {} of {}: {} announcements",
            self.page_num,
            self.category.value,
            records.len()
        );

        let has_more = response.has_more;
        if has_more {
            self.page_num += 1;
        } else {
            self.exhausted = true;
        }

        Some(PageOutcome::Page { records, has_more })
    }

    /// Raw page payload, from cache when allowed, live otherwise. Live
    /// responses are persisted under the same key they would be loaded from.
    async fn load_page(&self, key: &ListingKey) -> Result<String, CninfoError> {
        if !self.bypass_cache {
            if let Some(raw) = self.cache.load_listing(key) {
                // A corrupt cached entry counts as a miss, not a failure
                if serde_json::from_str::<QueryResponse>(&raw).is_ok() {
                    return Ok(raw);
                }
                warn!("Ignoring unreadable listing cache entry {}", key.file_name());
            }
        }

        let url = format!("{}{}", self.base_url, CninfoApi::QUERY_ENDPOINT);
        debug!("Querying {} page {} via {}", self.category.key, self.page_num, url);
        let page_size = self.page_size.to_string();
        let page_num = self.page_num.to_string();
        let response = self
            .client
            .post(&url)
            .form(&[
                ("stock", self.stock.as_str()),
                ("tabName", "fulltext"),
                ("pageSize", page_size.as_str()),
                ("pageNum", page_num.as_str()),
                ("column", self.plate.as_str()),
                ("category", self.category.key.as_str()),
                ("plate", self.plate.query_param()),
                ("seDate", ""),
                ("searchkey", ""),
                ("secid", ""),
                ("sortName", ""),
                ("sortType", ""),
                ("isHLtitle", "true"),
            ])
            .send()
            .await?
            .error_for_status()?;

        let raw = response.text().await?;
        if !self.bypass_cache {
            self.cache.save_listing(key, &raw);
        }
        Ok(raw)
    }
}
