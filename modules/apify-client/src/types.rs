use chrono::{NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Proxy settings forwarded to the actor.
#[derive(Debug, Clone, Serialize)]
pub struct ProxyConfig {
    #[serde(rename = "useApifyProxy")]
    pub use_apify_proxy: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            use_apify_proxy: true,
        }
    }
}

/// Input for the apify/instagram-scraper actor.
///
/// Either `direct_urls` or `search` selects the accounts; both may be absent
/// only if the caller wants the actor's own defaults.
#[derive(Debug, Clone, Serialize)]
pub struct InstagramScraperInput {
    #[serde(rename = "resultsLimit")]
    pub results_limit: u32,
    #[serde(rename = "addOwnerInfo")]
    pub add_owner_info: bool,
    #[serde(rename = "includeComments")]
    pub include_comments: bool,
    #[serde(rename = "proxyConfig")]
    pub proxy_config: ProxyConfig,
    #[serde(rename = "directUrls", skip_serializing_if = "Option::is_none")]
    pub direct_urls: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(rename = "searchType", skip_serializing_if = "Option::is_none")]
    pub search_type: Option<String>,
    #[serde(rename = "searchLimit", skip_serializing_if = "Option::is_none")]
    pub search_limit: Option<u32>,
    #[serde(rename = "scrapePostsUntilDate", skip_serializing_if = "Option::is_none")]
    pub scrape_posts_until_date: Option<String>,
}

impl InstagramScraperInput {
    /// Scrape the given profile URLs, at most `limit` posts each.
    pub fn profiles(direct_urls: Vec<String>, limit: u32) -> Self {
        Self {
            results_limit: limit,
            add_owner_info: true,
            include_comments: false,
            proxy_config: ProxyConfig::default(),
            direct_urls: Some(direct_urls),
            search: None,
            search_type: None,
            search_limit: None,
            scrape_posts_until_date: None,
        }
    }

    /// Search accounts by keyword instead of addressing them directly.
    pub fn search(query: impl Into<String>, search_type: impl Into<String>, limit: u32) -> Self {
        Self {
            results_limit: limit,
            add_owner_info: true,
            include_comments: false,
            proxy_config: ProxyConfig::default(),
            direct_urls: None,
            search: Some(query.into()),
            search_type: Some(search_type.into()),
            search_limit: Some(10),
            scrape_posts_until_date: None,
        }
    }

    pub fn include_comments(mut self, include: bool) -> Self {
        self.include_comments = include;
        self
    }

    /// Stop at posts older than midnight UTC of `since`.
    pub fn since(mut self, since: NaiveDate) -> Self {
        if let Some(midnight) = since.and_hms_opt(0, 0, 0) {
            self.scrape_posts_until_date = Some(Utc.from_utc_datetime(&midnight).to_rfc3339());
        }
        self
    }
}

/// Build the canonical profile URL for a handle.
pub fn profile_url(handle: &str) -> String {
    format!("https://www.instagram.com/{}/", handle.trim_matches('/'))
}

/// A single Instagram post from the dataset, typed view over the raw item.
///
/// Only the fields the event pipeline reads are modeled; everything else in
/// the raw item is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct InstagramPost {
    pub id: Option<String>,
    #[serde(rename = "shortCode")]
    pub short_code: Option<String>,
    pub url: Option<String>,
    #[serde(rename = "ownerUsername")]
    pub owner_username: Option<String>,
    pub caption: Option<String>,
    /// ISO-8601, usually with a trailing `Z`.
    pub timestamp: Option<String>,
    #[serde(rename = "type")]
    pub post_type: Option<String>,
    #[serde(rename = "displayUrl")]
    pub display_url: Option<String>,
    #[serde(rename = "imageUrl")]
    pub image_url: Option<String>,
    #[serde(rename = "videoUrl")]
    pub video_url: Option<String>,
}

impl InstagramPost {
    /// True when the post is a video with a downloadable stream.
    pub fn is_video(&self) -> bool {
        self.post_type.as_deref() == Some("Video") && self.video_url.is_some()
    }

    /// Still image URL, if the actor returned one.
    pub fn image(&self) -> Option<&str> {
        self.display_url
            .as_deref()
            .or(self.image_url.as_deref())
    }
}
