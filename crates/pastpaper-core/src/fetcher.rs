//! Outbound page fetching
//!
//! Issues plain GET requests with a fixed browser-like header set and
//! returns the raw HTML body. No retries: a failure is final for that call.

use crate::config::{ScraperSettings, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE as ACCEPT_LANGUAGE_HEADER};
use reqwest::header::{REFERER as REFERER_HEADER, USER_AGENT as USER_AGENT_HEADER};
use reqwest::Client as HttpClient;
use thiserror::Error;
use tracing::debug;

/// Errors produced while fetching a page
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection-level failure (DNS, TLS, refused, reset)
    #[error("Network error: {0}")]
    Network(String),
    /// The request did not complete within the configured timeout
    #[error("Request timed out: {0}")]
    Timeout(String),
    /// The server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status {
        /// Response status code
        status: u16,
        /// Requested URL
        url: String,
    },
    /// The response body could not be read as text
    #[error("Body error: {0}")]
    Body(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Source of raw HTML documents.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch `url` and return the response body.
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// `reqwest`-backed fetcher sending the fixed header set.
#[derive(Clone)]
pub struct HttpFetcher {
    client: HttpClient,
}

impl HttpFetcher {
    /// Creates a fetcher with the configured timeout and default headers.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Network` if the HTTP client cannot be built.
    pub fn new(settings: &ScraperSettings) -> Result<Self, FetchError> {
        let client = HttpClient::builder()
            .timeout(settings.http_timeout())
            .default_headers(default_headers())
            .cookie_store(true)
            .build()?;
        Ok(Self { client })
    }
}

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT_HEADER, HeaderValue::from_static(USER_AGENT));
    headers.insert(
        ACCEPT_LANGUAGE_HEADER,
        HeaderValue::from_static(ACCEPT_LANGUAGE),
    );
    headers.insert(REFERER_HEADER, HeaderValue::from_static(REFERER));
    headers
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        debug!(url = %url, "Fetching page");
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::Body(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn has_header(req: &Request, name: &str, expected: &str) -> bool {
        req.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == expected)
    }

    fn fetcher(timeout_secs: u64) -> HttpFetcher {
        let settings = ScraperSettings {
            http_timeout_secs: timeout_secs,
            ..ScraperSettings::default()
        };
        match HttpFetcher::new(&settings) {
            Ok(f) => f,
            Err(e) => panic!("client should build: {e}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_sends_fixed_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(query_param("s", "A/L ICT"))
            .and(|req: &Request| {
                has_header(req, "user-agent", USER_AGENT)
                    && has_header(req, "accept-language", ACCEPT_LANGUAGE)
                    && has_header(req, "referer", REFERER)
            })
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/?s=A%2FL%20ICT", server.uri());
        let body = fetcher(5).fetch(&url).await.expect("fetch should succeed");
        assert_eq!(body, "<html>ok</html>");
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = fetcher(5)
            .fetch(&format!("{}/page", server.uri()))
            .await
            .expect_err("503 must fail");
        assert!(matches!(err, FetchError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let err = fetcher(1)
            .fetch(&server.uri())
            .await
            .expect_err("delayed response must time out");
        assert!(matches!(err, FetchError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        // Port 9 (discard) is not served on loopback in test environments
        let err = fetcher(2)
            .fetch("http://127.0.0.1:9/")
            .await
            .expect_err("nothing listens there");
        assert!(matches!(err, FetchError::Network(_) | FetchError::Timeout(_)));
    }
}
