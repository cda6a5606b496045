/// API Client Module
///
/// This module handles all interactions with the RAWG REST API.
/// It wraps a reqwest client and provides methods for fetching one page of
/// the bulk games listing and one per-game detail document. Pagination and
/// pacing live in the extract stage; this layer is one request = one call.
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use thiserror::Error;

use crate::models::{ApiInfo, PageResponse};

/// Default public RAWG endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.rawg.io/api";

const HTTP_TIMEOUT: Duration = Duration::from_secs(20);

/// Errors surfaced by a single API request.
///
/// `Transport` and `Status` are retry candidates; `MalformedBody` is not,
/// the page degrades to an empty result instead (see extract stage).
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(StatusCode),

    #[error("response was not valid JSON: {0}")]
    MalformedBody(#[from] serde_json::Error),
}

impl FetchError {
    /// Whether retrying the same request can plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::MalformedBody(_))
    }
}

/// Static query parameters for the bulk listing endpoint.
#[derive(Debug, Clone)]
pub struct GamesQuery {
    /// Records per page; the API caps this at 40.
    pub page_size: u32,
    /// Optional release-date window, `YYYY-MM-DD,YYYY-MM-DD`.
    pub dates: Option<String>,
}

impl Default for GamesQuery {
    fn default() -> Self {
        Self { page_size: 40, dates: None }
    }
}

/// Bounded retry policy shared by the per-page and per-key fetch paths.
///
/// Backoff is linear: attempt n sleeps `base_delay * n`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_secs(2) }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration) -> Self {
        Self { max_attempts, base_delay }
    }

    /// Delay to sleep after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: usize) -> Duration {
        self.base_delay * attempt as u32
    }
}

pub struct RawgClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RawgClient {
    /// Create a new client for the given endpoint and API key
    pub fn new(base_url: String, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, base_url, api_key })
    }

    /// Get the endpoint URL this client is connected to
    pub fn endpoint(&self) -> &str {
        &self.base_url
    }

    /// Test the API connection and report the total record count
    pub async fn test_connection(&self) -> Result<ApiInfo> {
        let query = GamesQuery { page_size: 1, dates: None };
        let page = self
            .fetch_games_page(&query, 1)
            .await
            .context("Failed to connect to the RAWG API")?;

        Ok(ApiInfo { endpoint: self.base_url.clone(), total_count: page.count })
    }

    /// Fetch a single page of the bulk games listing
    pub async fn fetch_games_page(&self, query: &GamesQuery, page: u32) -> Result<PageResponse, FetchError> {
        tracing::debug!("Fetching games page {}", page);

        let mut params = vec![
            ("key", self.api_key.clone()),
            ("page_size", query.page_size.to_string()),
            ("page", page.to_string()),
        ];
        if let Some(dates) = &query.dates {
            params.push(("dates", dates.clone()));
        }

        let response = self
            .client
            .get(format!("{}/games", self.base_url))
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = response.text().await?;
        let parsed = serde_json::from_str::<PageResponse>(&body)?;

        tracing::debug!("Fetched page {} with {} records", page, parsed.results.len());
        Ok(parsed)
    }

    /// Fetch the detail document for a single game id
    pub async fn fetch_game_detail(&self, game_id: i64) -> Result<serde_json::Value, FetchError> {
        tracing::debug!("Fetching detail for game {}", game_id);

        let response = self
            .client
            .get(format!("{}/games/{}", self.base_url, game_id))
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[("key", self.api_key.clone())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_linear_backoff() {
        let policy = RetryPolicy::new(3, Duration::from_secs(2));

        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(6));
    }

    #[test]
    fn test_malformed_body_is_not_retryable() {
        let err = serde_json::from_str::<PageResponse>("<html>rate limited</html>")
            .map_err(FetchError::from)
            .unwrap_err();

        assert!(!err.is_retryable());
        assert!(FetchError::Status(StatusCode::TOO_MANY_REQUESTS).is_retryable());
    }

    #[tokio::test]
    async fn test_fetch_games_page_sends_key_and_page() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/games")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("key".into(), "secret".into()),
                mockito::Matcher::UrlEncoded("page".into(), "2".into()),
                mockito::Matcher::UrlEncoded("page_size".into(), "40".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"count": 1, "next": null, "results": [{"id": 7}]}"#)
            .create_async()
            .await;

        let client = RawgClient::new(server.url(), "secret".to_string()).unwrap();
        let page = client.fetch_games_page(&GamesQuery::default(), 2).await.unwrap();

        mock.assert_async().await;
        assert_eq!(page.count, Some(1));
        assert!(page.next.is_none());
        assert_eq!(page.results.len(), 1);
    }

    #[tokio::test]
    async fn test_non_2xx_status_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/games/42")
            .match_query(mockito::Matcher::Any)
            .with_status(502)
            .create_async()
            .await;

        let client = RawgClient::new(server.url(), "secret".to_string()).unwrap();
        let err = client.fetch_game_detail(42).await.unwrap_err();

        assert!(matches!(err, FetchError::Status(StatusCode::BAD_GATEWAY)));
    }
}
