//! WorldCat Metadata API client

use super::RecordFetcher;
use crate::config::{RetryConfig, WorldCatConfig};
use crate::error::{Error, FetchError, Result};
use crate::rate_limiter::RequestRateLimiter;
use crate::retry::with_retry_when;
use crate::types::{HoldingsData, Identifier, InstitutionHoldings};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const MARCXML: &str = "application/marcxml+xml";

/// Tokens are refreshed this long before the server-side expiry
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

/// Longest response body excerpt kept in an error message
const BODY_EXCERPT_LEN: usize = 200;

#[derive(Debug, Clone)]
struct AccessToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at - Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    1200
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryHoldingsResponse {
    #[serde(default)]
    total_holding_count: u64,
    #[serde(default)]
    total_shared_print_count: u64,
    #[serde(default)]
    total_editions: u64,
}

/// [`RecordFetcher`] backed by the WorldCat Metadata API
///
/// Authenticates with the OAuth client-credentials grant and caches the access token
/// until shortly before it expires. Every request passes through the request-rate
/// limiter, and transient failures are retried with exponential backoff.
pub struct WorldCatFetcher {
    http_client: reqwest::Client,
    config: WorldCatConfig,
    client_id: String,
    client_secret: String,
    retry: RetryConfig,
    limiter: RequestRateLimiter,
    token_cache: Arc<Mutex<Option<AccessToken>>>,
}

impl WorldCatFetcher {
    /// Create a fetcher from configuration
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the client credentials are missing, or
    /// [`Error::Other`] if the HTTP client cannot be created.
    pub fn new(config: &WorldCatConfig, retry: &RetryConfig) -> Result<Self> {
        let client_id = non_blank(config.client_id.as_deref()).ok_or_else(|| Error::Config {
            message: "WorldCat client id is required".to_string(),
            key: Some("worldcat.client_id".to_string()),
        })?;
        let client_secret =
            non_blank(config.client_secret.as_deref()).ok_or_else(|| Error::Config {
                message: "WorldCat client secret is required".to_string(),
                key: Some("worldcat.client_secret".to_string()),
            })?;

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("bibrecord-dl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            config: config.clone(),
            client_id,
            client_secret,
            retry: retry.clone(),
            limiter: RequestRateLimiter::new(config.requests_per_second),
            token_cache: Arc::new(Mutex::new(None)),
        })
    }

    /// The shared request limiter, e.g. to adjust the rate at runtime
    pub fn rate_limiter(&self) -> &RequestRateLimiter {
        &self.limiter
    }

    async fn access_token(&self) -> std::result::Result<String, FetchError> {
        let mut cache = self.token_cache.lock().await;
        if let Some(token) = cache.as_ref().filter(|t| !t.is_expired()) {
            return Ok(token.token.clone());
        }

        debug!(token_url = %self.config.token_url, "requesting WorldCat access token");
        let response = self
            .http_client
            .post(&self.config.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "client_credentials"),
                ("scope", self.config.scope.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Auth(format!(
                "token endpoint returned HTTP {}: {}",
                status.as_u16(),
                excerpt(&body)
            )));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Auth(format!("unreadable token response: {}", e)))?;

        info!(expires_in = parsed.expires_in, "obtained WorldCat access token");
        let token = AccessToken {
            token: parsed.access_token,
            expires_at: Utc::now() + Duration::seconds(parsed.expires_in),
        };
        let value = token.token.clone();
        *cache = Some(token);
        Ok(value)
    }

    async fn invalidate_token(&self) {
        *self.token_cache.lock().await = None;
    }

    /// One authenticated GET, without retry
    async fn get_once(
        &self,
        url: &str,
        query: &[(&str, &str)],
        accept: &str,
    ) -> std::result::Result<reqwest::Response, FetchError> {
        let token = self.access_token().await?;
        self.limiter.acquire().await;

        let response = self
            .http_client
            .get(url)
            .query(query)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, accept)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            self.invalidate_token().await;
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body))
    }

    async fn get_with_retry(
        &self,
        url: &str,
        query: &[(&str, &str)],
        accept: &str,
    ) -> std::result::Result<reqwest::Response, FetchError> {
        with_retry_when(
            &self.retry,
            |e: &FetchError| e.is_retryable_with(&self.retry),
            || self.get_once(url, query, accept),
        )
        .await
    }
}

#[async_trait]
impl RecordFetcher for WorldCatFetcher {
    async fn fetch_record(&self, id: &Identifier) -> std::result::Result<String, FetchError> {
        let url = format!(
            "{}/manage/bibs/{}",
            self.config.metadata_url.trim_end_matches('/'),
            id
        );

        let url = url.as_str();
        let body = with_retry_when(
            &self.retry,
            |e: &FetchError| e.is_retryable_with(&self.retry),
            move || async move {
                let response = self.get_once(url, &[], MARCXML).await?;
                response.text().await.map_err(FetchError::from)
            },
        )
        .await?;

        if body.trim().is_empty() {
            return Err(FetchError::Malformed("empty record body".to_string()));
        }
        debug!(ocn = %id, bytes = body.len(), "fetched record");
        Ok(body)
    }

    async fn fetch_holdings(
        &self,
        id: &Identifier,
        symbols: &[String],
    ) -> std::result::Result<HoldingsData, FetchError> {
        let url = format!(
            "{}/search/bibs-summary-holdings",
            self.config.metadata_url.trim_end_matches('/')
        );

        let mut holdings = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let query = [("oclcNumber", id.as_str()), ("heldBySymbol", symbol.as_str())];
            let response = self
                .get_with_retry(&url, &query, "application/json")
                .await
                .inspect_err(|e| warn!(ocn = %id, symbol = %symbol, error = %e, "holdings request failed"))?;

            let summary: SummaryHoldingsResponse = response
                .json()
                .await
                .map_err(|e| FetchError::Malformed(e.to_string()))?;

            holdings.push(InstitutionHoldings {
                institution_symbol: symbol.clone(),
                total_holding_count: summary.total_holding_count,
                total_shared_print_count: summary.total_shared_print_count,
                total_editions: summary.total_editions,
            });
        }

        debug!(ocn = %id, symbols = symbols.len(), "fetched holdings");
        Ok(HoldingsData {
            ocn: id.to_string(),
            holdings,
        })
    }
}

impl std::fmt::Debug for WorldCatFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldCatFetcher")
            .field("metadata_url", &self.config.metadata_url)
            .field("client_id", &self.client_id)
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn status_error(status: StatusCode, body: &str) -> FetchError {
    match status {
        StatusCode::NOT_FOUND => FetchError::NotFound,
        StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchError::Auth(format!(
            "HTTP {}: {}",
            status.as_u16(),
            excerpt(body)
        )),
        _ => FetchError::Http {
            status: status.as_u16(),
            message: if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("unexpected status").to_string()
            } else {
                excerpt(body)
            },
        },
    }
}

fn excerpt(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(BODY_EXCERPT_LEN) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{basic_auth, body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RECORD: &str = r#"<record xmlns="http://www.loc.gov/MARC21/slim"><controlfield tag="001">123</controlfield></record>"#;

    fn fetcher_for(server: &MockServer) -> WorldCatFetcher {
        let config = WorldCatConfig {
            client_id: Some("key".into()),
            client_secret: Some("secret".into()),
            token_url: format!("{}/token", server.uri()),
            metadata_url: format!("{}/worldcat", server.uri()),
            ..WorldCatConfig::default()
        };
        let retry = RetryConfig {
            max_attempts: 2,
            initial_delay: std::time::Duration::from_millis(1),
            max_delay: std::time::Duration::from_millis(5),
            jitter: false,
            ..RetryConfig::default()
        };
        WorldCatFetcher::new(&config, &retry).unwrap()
    }

    async fn mount_token(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(basic_auth("key", "secret"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tk_abc",
                "token_type": "bearer",
                "expires_in": 1199
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    fn ocn(raw: &str) -> Identifier {
        Identifier::parse(raw).unwrap()
    }

    #[test]
    fn missing_credentials_are_a_config_error() {
        let err = WorldCatFetcher::new(&WorldCatConfig::default(), &RetryConfig::default())
            .unwrap_err();
        match err {
            Error::Config { key, .. } => assert_eq!(key.as_deref(), Some("worldcat.client_id")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetches_marcxml_with_bearer_token() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/worldcat/manage/bibs/123"))
            .and(header("authorization", "Bearer tk_abc"))
            .and(header("accept", MARCXML))
            .respond_with(ResponseTemplate::new(200).set_body_string(RECORD))
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server);
        let body = fetcher.fetch_record(&ocn("123")).await.unwrap();
        assert_eq!(body, RECORD);
    }

    #[tokio::test]
    async fn token_is_cached_across_requests() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/worldcat/manage/bibs/123"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RECORD))
            .expect(3)
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server);
        for _ in 0..3 {
            fetcher.fetch_record(&ocn("123")).await.unwrap();
        }
    }

    #[tokio::test]
    async fn missing_record_maps_to_not_found_without_retry() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/worldcat/manage/bibs/999"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err = fetcher_for(&server)
            .fetch_record(&ocn("999"))
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::NotFound);
    }

    #[tokio::test]
    async fn gateway_errors_are_retried_then_reported() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/worldcat/manage/bibs/5"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let err = fetcher_for(&server).fetch_record(&ocn("5")).await.unwrap_err();
        assert!(matches!(err, FetchError::Http { status: 503, .. }));
    }

    #[tokio::test]
    async fn rejected_credentials_are_an_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
            .mount(&server)
            .await;

        let err = fetcher_for(&server).fetch_record(&ocn("1")).await.unwrap_err();
        match err {
            FetchError::Auth(message) => assert!(message.contains("invalid_client")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn holdings_are_collected_per_symbol_in_order() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        for (symbol, count) in [("QGE", 4), ("VU@", 0)] {
            Mock::given(method("GET"))
                .and(path("/worldcat/search/bibs-summary-holdings"))
                .and(query_param("oclcNumber", "77"))
                .and(query_param("heldBySymbol", symbol))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "totalHoldingCount": count,
                    "totalEditions": 2
                })))
                .mount(&server)
                .await;
        }

        let symbols = vec!["QGE".to_string(), "VU@".to_string()];
        let data = fetcher_for(&server)
            .fetch_holdings(&ocn("77"), &symbols)
            .await
            .unwrap();

        assert_eq!(data.ocn, "77");
        assert_eq!(data.holdings.len(), 2);
        assert_eq!(data.holdings[0].institution_symbol, "QGE");
        assert_eq!(data.holdings[0].total_holding_count, 4);
        assert_eq!(data.holdings[0].total_shared_print_count, 0);
        assert_eq!(data.holdings[1].institution_symbol, "VU@");
        assert_eq!(data.holdings[1].total_editions, 2);
    }

    #[tokio::test]
    async fn holdings_fail_when_any_symbol_fails() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/worldcat/search/bibs-summary-holdings"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = fetcher_for(&server)
            .fetch_holdings(&ocn("77"), &["QGE".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::RateLimited);
    }

    #[test]
    fn long_bodies_are_truncated_in_errors() {
        let body = "x".repeat(1000);
        let err = status_error(StatusCode::BAD_REQUEST, &body);
        match err {
            FetchError::Http { status, message } => {
                assert_eq!(status, 400);
                assert!(message.chars().count() <= BODY_EXCERPT_LEN + 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
