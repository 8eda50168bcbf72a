// Source Fetcher: bounded list of recent posts for a set of accounts.
//
// `SourceFetcher` is the seam the pipeline depends on; `ApifyFetcher` is the
// production implementation, `testing::MockFetcher` the in-memory one.

use apify_client::{profile_url, ApifyClient, InstagramScraperInput};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::types::Post;

/// How the accounts to scrape are addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accounts {
    /// Bare handles, turned into profile URLs.
    Handles(Vec<String>),
    /// Profile URLs used as given.
    Urls(Vec<String>),
    /// Accounts found by the scraper's own search instead of addressed
    /// directly.
    Search { query: String, search_type: String },
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub accounts: Accounts,
    /// Most-recent posts per account; truncated server-side.
    pub limit: u32,
    pub since: Option<NaiveDate>,
    pub include_comments: bool,
}

impl FetchRequest {
    pub fn handles(handles: Vec<String>, limit: u32) -> Self {
        Self {
            accounts: Accounts::Handles(handles),
            limit,
            since: None,
            include_comments: false,
        }
    }

    pub fn urls(urls: Vec<String>, limit: u32) -> Self {
        Self {
            accounts: Accounts::Urls(urls),
            limit,
            since: None,
            include_comments: false,
        }
    }

    /// Look accounts up by keyword; the first few matching users are
    /// scraped.
    pub fn search(query: impl Into<String>, limit: u32) -> Self {
        Self {
            accounts: Accounts::Search {
                query: query.into(),
                search_type: "user".to_string(),
            },
            limit,
            since: None,
            include_comments: false,
        }
    }

    pub fn since(mut self, since: NaiveDate) -> Self {
        self.since = Some(since);
        self
    }

    pub fn include_comments(mut self, include: bool) -> Self {
        self.include_comments = include;
        self
    }

    /// Profile URLs addressed by the request; empty for a search.
    pub fn direct_urls(&self) -> Vec<String> {
        match &self.accounts {
            Accounts::Handles(handles) => handles.iter().map(|h| profile_url(h)).collect(),
            Accounts::Urls(urls) => urls.clone(),
            Accounts::Search { .. } => Vec::new(),
        }
    }

    pub fn to_scraper_input(&self) -> InstagramScraperInput {
        let input = match &self.accounts {
            Accounts::Search { query, search_type } => {
                InstagramScraperInput::search(query, search_type, self.limit)
            }
            _ => InstagramScraperInput::profiles(self.direct_urls(), self.limit),
        };
        let input = input.include_comments(self.include_comments);
        match self.since {
            Some(since) => input.since(since),
            None => input,
        }
    }
}

#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Raw dataset items, exactly as the content API returned them.
    async fn fetch_raw(&self, request: &FetchRequest) -> Result<Vec<Value>>;

    /// Items normalized into posts; items without an id are dropped.
    async fn fetch_posts(&self, request: &FetchRequest) -> Result<Vec<Post>> {
        let items = self.fetch_raw(request).await?;
        let total = items.len();
        let posts: Vec<Post> = items.into_iter().filter_map(Post::from_raw).collect();
        if posts.len() < total {
            warn!(dropped = total - posts.len(), "Dropped dataset items without a post id");
        }
        info!(count = posts.len(), "Fetched posts");
        Ok(posts)
    }
}

pub struct ApifyFetcher {
    client: ApifyClient,
}

impl ApifyFetcher {
    pub fn new(client: ApifyClient) -> Self {
        Self { client }
    }

    /// Fails with `MissingCredential` when no token is configured.
    pub fn from_config(config: &Config) -> Result<Self> {
        let token = config.require_apify_token()?;
        Ok(Self::new(ApifyClient::new(token.to_string())?))
    }
}

#[async_trait]
impl SourceFetcher for ApifyFetcher {
    async fn fetch_raw(&self, request: &FetchRequest) -> Result<Vec<Value>> {
        let input = request.to_scraper_input();
        Ok(self.client.run_instagram_scraper(&input).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    #[test]
    fn handles_become_profile_urls() {
        let request = FetchRequest::handles(vec!["vinodiscobar".into(), "assa.club/".into()], 5);
        assert_eq!(
            request.direct_urls(),
            vec![
                "https://www.instagram.com/vinodiscobar/".to_string(),
                "https://www.instagram.com/assa.club/".to_string(),
            ]
        );
    }

    #[test]
    fn urls_pass_through_untouched() {
        let request = FetchRequest::urls(vec!["https://www.instagram.com/assa.club/".into()], 10);
        assert_eq!(request.direct_urls(), vec!["https://www.instagram.com/assa.club/".to_string()]);
    }

    #[test]
    fn scraper_input_carries_limit_since_and_comments() {
        let request = FetchRequest::handles(vec!["bar".into()], 7)
            .since(NaiveDate::from_ymd_opt(2025, 8, 12).unwrap())
            .include_comments(true);
        let input = request.to_scraper_input();
        assert_eq!(input.results_limit, 7);
        assert!(input.include_comments);
        assert_eq!(input.scrape_posts_until_date.as_deref(), Some("2025-08-12T00:00:00+00:00"));
    }

    #[test]
    fn search_request_has_no_direct_urls() {
        let request = FetchRequest::search("paris jazz bar", 3);
        assert!(request.direct_urls().is_empty());

        let input = serde_json::to_value(request.to_scraper_input()).unwrap();
        assert_eq!(input["search"], "paris jazz bar");
        assert_eq!(input["searchType"], "user");
        assert_eq!(input["resultsLimit"], 3);
        assert!(input.get("directUrls").is_none());
    }

    #[test]
    fn missing_token_fails_before_any_call() {
        let err = ApifyFetcher::from_config(&Config::default()).err().unwrap();
        assert!(matches!(err, PipelineError::MissingCredential("APIFY_TOKEN")));
    }
}
