use serde::{Deserialize, Deserializer, Serialize};

/// Resolved identity of a security, as returned by the top-search endpoint.
///
/// `org_id` is the portal's internal organization identifier and is required
/// by every subsequent listing query; `zwjc` is the display name used for
/// cache and download directory names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockInfo {
    #[serde(default)]
    pub code: String,
    #[serde(rename = "orgId", default)]
    pub org_id: String,
    #[serde(rename = "sjstsBond", default)]
    pub sjsts_bond: String,
    #[serde(default)]
    pub zwjc: String,
}

/// Exchange segment a security is listed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plate {
    /// Shanghai Stock Exchange
    Sse,
    /// Shenzhen Stock Exchange
    Szse,
    /// Beijing Stock Exchange
    Bj,
    /// Unrecognized plate code, passed through verbatim
    Other(String),
}

impl Plate {
    pub fn from_code(code: &str) -> Self {
        match code {
            "sse" => Plate::Sse,
            "szse" => Plate::Szse,
            "bj" => Plate::Bj,
            other => Plate::Other(other.to_string()),
        }
    }

    /// The `column` field of the listing query.
    pub fn as_str(&self) -> &str {
        match self {
            Plate::Sse => "sse",
            Plate::Szse => "szse",
            Plate::Bj => "bj",
            Plate::Other(s) => s,
        }
    }

    /// The `plate` field of the listing query, which uses a different
    /// vocabulary than the plate code itself.
    pub fn query_param(&self) -> &str {
        match self {
            Plate::Sse => "sh",
            Plate::Szse => "sz",
            Plate::Bj => "bj;third",
            Plate::Other(s) => s,
        }
    }
}

/// One disclosure category from the catalog, e.g. annual reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryEntry {
    /// Query key, e.g. `category_ndbg_szsh`
    #[serde(default)]
    pub key: String,
    /// Display name, e.g. `年度报告`
    #[serde(default)]
    pub value: String,
}

/// One disclosure item from the listing endpoint.
///
/// Only the fields the pipeline consumes are mapped; the raw page payload is
/// what gets cached, so nothing is lost by ignoring the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    #[serde(rename = "secCode", default)]
    pub sec_code: String,
    #[serde(rename = "secName", default)]
    pub sec_name: String,
    #[serde(rename = "announcementTitle", default)]
    pub announcement_title: String,
    /// Relative path of the attached PDF under the static-asset host.
    #[serde(rename = "adjunctUrl", default)]
    pub adjunct_url: String,
    /// Expected attachment size in kilobytes.
    #[serde(rename = "adjunctSize", default)]
    pub adjunct_size: Option<u64>,
}

impl Announcement {
    pub fn expected_size_kb(&self) -> u64 {
        self.adjunct_size.unwrap_or(0)
    }
}

/// Response shape of the listing endpoint.
///
/// `announcements` is a double `Option` so the pager can tell the field's
/// three states apart: absent entirely (outer `None`, an anomaly), present
/// but null (`Some(None)`, an empty page), or a list.
#[derive(Debug, Deserialize)]
pub struct QueryResponse {
    #[serde(default, deserialize_with = "double_option")]
    pub announcements: Option<Option<Vec<Announcement>>>,
    #[serde(rename = "hasMore", default)]
    pub has_more: bool,
}

/// Keeps a present-but-null field (`Some(None)`) distinct from an absent one
/// (`None`), which plain `#[serde(default)]` would collapse together.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// cninfo endpoints and constants.
pub struct CninfoApi;

impl CninfoApi {
    /// Base URL for the disclosure portal
    pub const BASE_URL: &'static str = "https://www.cninfo.com.cn";
    /// Announcement listing endpoint (form-encoded POST)
    pub const QUERY_ENDPOINT: &'static str = "/new/hisAnnouncement/query";
    /// Stock keyword search endpoint (form-encoded POST)
    pub const SEARCH_ENDPOINT: &'static str = "/new/information/topSearch/query";
    /// Per-stock disclosure page, scraped for the plate code
    pub const STOCK_PAGE_ENDPOINT: &'static str = "/new/disclosure/stock";
    /// Static-asset host serving announcement attachments
    pub const STATIC_BASE_URL: &'static str = "https://static.cninfo.com.cn/";
    /// Browser-identifying user agent expected by the portal
    pub const BROWSER_USER_AGENT: &'static str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plate_query_param_mapping() {
        assert_eq!(Plate::from_code("szse").query_param(), "sz");
        assert_eq!(Plate::from_code("sse").query_param(), "sh");
        assert_eq!(Plate::from_code("bj").query_param(), "bj;third");
        assert_eq!(Plate::from_code("hk").query_param(), "hk");
    }

    #[test]
    fn test_query_response_missing_announcements() {
        let resp: QueryResponse = serde_json::from_str(r#"{"hasMore": true}"#).unwrap();
        assert!(resp.announcements.is_none());
        assert!(resp.has_more);

        let resp: QueryResponse =
            serde_json::from_str(r#"{"announcements": [], "hasMore": false}"#).unwrap();
        assert_eq!(resp.announcements.unwrap().unwrap().len(), 0);
        assert!(!resp.has_more);
    }

    #[test]
    fn test_query_response_null_announcements_is_present() {
        let resp: QueryResponse =
            serde_json::from_str(r#"{"announcements": null, "hasMore": false}"#).unwrap();
        assert_eq!(resp.announcements, Some(None));
    }

    #[test]
    fn test_announcement_deserializes_null_size() {
        let ann: Announcement = serde_json::from_str(
            r#"{"secCode": "601225", "secName": "陕西煤业", "announcementTitle": "t", "adjunctUrl": "u", "adjunctSize": null}"#,
        )
        .unwrap();
        assert_eq!(ann.expected_size_kb(), 0);
    }
}
