pub mod error;
pub mod types;

pub use error::{ApifyError, Result};
pub use types::{profile_url, InstagramPost, InstagramScraperInput, ProxyConfig};

use std::time::Duration;

use serde_json::Value;

const BASE_URL: &str = "https://api.apify.com/v2";

/// Actor path for apify/instagram-scraper.
const INSTAGRAM_SCRAPER: &str = "apify~instagram-scraper";

/// Synchronous actor runs can take a while; the run and the dataset read
/// happen in a single request.
const RUN_SYNC_TIMEOUT: Duration = Duration::from_secs(120);

pub struct ApifyClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl ApifyClient {
    pub fn new(token: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(RUN_SYNC_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            token,
            base_url: BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Run the Instagram scraper and return the dataset items untouched.
    ///
    /// Fails with `UnexpectedShape` (carrying the head of the body) when the
    /// response is not a JSON array.
    pub async fn run_instagram_scraper(&self, input: &InstagramScraperInput) -> Result<Vec<Value>> {
        tracing::info!(
            limit = input.results_limit,
            urls = ?input.direct_urls,
            search = ?input.search,
            "Starting Instagram scrape"
        );

        let url = format!(
            "{}/acts/{}/run-sync-get-dataset-items",
            self.base_url, INSTAGRAM_SCRAPER
        );
        let resp = self
            .client
            .post(&url)
            .query(&[("token", self.token.as_str()), ("format", "json")])
            .json(input)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(ApifyError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let items = parse_dataset_items(&body)?;
        tracing::info!(count = items.len(), "Fetched Instagram posts");
        Ok(items)
    }
}

/// Parse a dataset response body, insisting on a top-level array.
pub fn parse_dataset_items(body: &str) -> Result<Vec<Value>> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ApifyError::unexpected_shape(format!("invalid JSON: {e}"), body))?;
    match value {
        Value::Array(items) => Ok(items),
        _ => Err(ApifyError::unexpected_shape(
            "unexpected response format (not a list)",
            body,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_array_body() {
        let items = parse_dataset_items(r#"[{"id":"a"},{"id":"b"}]"#).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn object_body_is_unexpected_shape_with_raw() {
        let err = parse_dataset_items(r#"{"error":{"type":"actor-is-not-rented"}}"#).unwrap_err();
        match err {
            ApifyError::UnexpectedShape { raw, .. } => assert!(raw.contains("actor-is-not-rented")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn garbage_body_is_unexpected_shape() {
        let err = parse_dataset_items("<html>502 Bad Gateway</html>").unwrap_err();
        assert!(err.to_string().contains("502 Bad Gateway"));
    }

    /// Read headers and a `content-length` body so the reply is not cut off
    /// by unread input.
    async fn read_request(socket: &mut tokio::net::TcpStream) {
        use tokio::io::AsyncReadExt;

        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap_or(0);
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&request);
            if let Some(head_end) = text.find("\r\n\r\n") {
                let length = text[..head_end]
                    .lines()
                    .find_map(|l| {
                        l.to_ascii_lowercase()
                            .strip_prefix("content-length:")
                            .and_then(|v| v.trim().parse::<usize>().ok())
                    })
                    .unwrap_or(0);
                if request.len() >= head_end + 4 + length {
                    return;
                }
            }
        }
    }

    /// Local HTTP endpoint answering every request with `status` and `body`.
    async fn serve(status: &'static str, body: &'static str) -> String {
        use tokio::io::AsyncWriteExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                read_request(&mut socket).await;
                let response = format!(
                    "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{addr}")
    }

    fn client_for(url: String) -> ApifyClient {
        ApifyClient::new("apify_api_test".to_string())
            .unwrap()
            .with_base_url(url)
    }

    #[tokio::test]
    async fn scraper_run_returns_dataset_items() {
        let url = serve("201 Created", r#"[{"id":"1","ownerUsername":"vinodiscobar"}]"#).await;
        let input = InstagramScraperInput::profiles(vec![profile_url("vinodiscobar")], 5);

        let items = client_for(url).run_instagram_scraper(&input).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["ownerUsername"], "vinodiscobar");
    }

    #[tokio::test]
    async fn rejected_token_is_an_api_error() {
        let url = serve("401 Unauthorized", r#"{"error":{"type":"token-not-valid"}}"#).await;
        let input = InstagramScraperInput::profiles(vec![profile_url("bar")], 5);

        match client_for(url).run_instagram_scraper(&input).await {
            Err(ApifyError::Api { status, message }) => {
                assert_eq!(status, 401);
                assert!(message.contains("token-not-valid"));
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn object_response_is_unexpected_shape() {
        let url = serve("200 OK", r#"{"data":{"items":[]}}"#).await;
        let input = InstagramScraperInput::profiles(vec![profile_url("bar")], 5);

        let err = client_for(url).run_instagram_scraper(&input).await.unwrap_err();
        assert!(matches!(err, ApifyError::UnexpectedShape { .. }));
    }
}
