//! HTTP fetching for listing pages, article pages and images.
//!
//! One [`Fetcher`] is built per run from the scraper's [`HttpConfig`]. It
//! carries the browser-like headers the portals expect and a hard timeout.
//! A non-success status is reported as [`ScrapeError::Fetch`]; nothing is
//! retried here.

use crate::config::HttpConfig;
use crate::error::ScrapeError;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, REFERER, USER_AGENT};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument};

const IMAGE_ACCEPT: &str = "image/webp,image/apng,image/*,*/*;q=0.8";

fn header_value(name: &str, value: &str) -> Result<HeaderValue, ScrapeError> {
    HeaderValue::from_str(value)
        .map_err(|e| ScrapeError::Config(format!("invalid {name} header {value:?}: {e}")))
}

#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(config: &HttpConfig) -> Result<Self, ScrapeError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, header_value("User-Agent", &config.user_agent)?);
        headers.insert(ACCEPT, header_value("Accept", &config.accept)?);
        if let Some(lang) = &config.accept_language {
            headers.insert(ACCEPT_LANGUAGE, header_value("Accept-Language", lang)?);
        }
        if let Some(referer) = &config.referer {
            headers.insert(REFERER, header_value("Referer", referer)?);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.insecure)
            .build()
            .map_err(|e| ScrapeError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    async fn get(&self, url: &str, headers: HeaderMap) -> Result<Vec<u8>, ScrapeError> {
        let resp = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| ScrapeError::fetch(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ScrapeError::fetch(url, format!("status {status}")));
        }

        let body = resp.bytes().await.map_err(|e| ScrapeError::fetch(url, e))?;
        debug!(bytes = body.len(), %status, "Fetched");
        Ok(body.to_vec())
    }

    /// Fetch a page and decode it as UTF-8, replacing invalid sequences.
    #[instrument(level = "debug", skip(self))]
    pub async fn html(&self, url: &str) -> Result<String, ScrapeError> {
        let body = self.get(url, HeaderMap::new()).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Fetch raw image bytes, optionally overriding the Referer.
    #[instrument(level = "debug", skip(self))]
    pub async fn image(&self, url: &str, referer: Option<&str>) -> Result<Vec<u8>, ScrapeError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(IMAGE_ACCEPT));
        if let Some(referer) = referer {
            headers.insert(REFERER, header_value("Referer", referer)?);
        }
        self.get(url, headers).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> HttpConfig {
        HttpConfig {
            timeout_secs: 5,
            ..HttpConfig::default()
        }
    }

    #[tokio::test]
    async fn test_html_decodes_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/list"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<h1>军事</h1>"))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(&config()).unwrap();
        let html = fetcher.html(&format!("{}/list", server.uri())).await.unwrap();
        assert_eq!(html, "<h1>军事</h1>");
    }

    #[tokio::test]
    async fn test_non_success_status_is_fetch_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(&config()).unwrap();
        let err = fetcher
            .html(&format!("{}/gone", server.uri()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "fetch");
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn test_image_sends_referer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.jpg"))
            .and(header("referer", "https://mil.ifeng.com/c/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(&config()).unwrap();
        let bytes = fetcher
            .image(
                &format!("{}/a.jpg", server.uri()),
                Some("https://mil.ifeng.com/c/abc"),
            )
            .await
            .unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[test]
    fn test_invalid_header_is_config_error() {
        let cfg = HttpConfig {
            user_agent: "bad\nagent".to_string(),
            ..HttpConfig::default()
        };
        let err = Fetcher::new(&cfg).unwrap_err();
        assert_eq!(err.kind(), "config");
    }
}
