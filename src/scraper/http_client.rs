use crate::config::ScraperConfig;
use crate::scraper::error::{FetchError, FetchResult};
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, CONTENT_TYPE};
use std::time::Duration;
use tokio::time::sleep;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, warn};

/// Response body plus the bits needed to decide how to parse it.
#[derive(Debug, Clone)]
pub struct Payload {
    pub url: String,
    pub content_type: String,
    pub body: String,
}

impl Payload {
    pub fn is_json(&self) -> bool {
        self.content_type.contains("json")
            || self.url.to_lowercase().ends_with(".json")
            || self.body.trim_start().starts_with(['[', '{'])
    }

    pub fn is_csv(&self) -> bool {
        self.content_type.contains("csv")
            || self.content_type.contains("text/plain")
            || self.url.to_lowercase().ends_with(".csv")
    }
}

pub struct HttpClient {
    inner: reqwest::Client,
    config: ScraperConfig,
}

fn default_headers() -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/json;q=0.9,*/*;q=0.8"),
    );
    h.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
    h.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
    h
}

impl HttpClient {
    pub fn new(config: &ScraperConfig) -> FetchResult<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(default_headers())
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            // Accept cookies so session-based pages work
            .cookie_store(true)
            .build()?;

        Ok(Self {
            inner,
            config: config.clone(),
        })
    }

    /// Fetch a URL with a polite delay and retry on transient failures.
    pub async fn get(&self, url: &str) -> FetchResult<Payload> {
        self.polite_delay().await;

        let strategy = ExponentialBackoff::from_millis(2)
            .factor(self.config.request_delay_ms.max(1))
            .max_delay(Duration::from_secs(4))
            .map(jitter)
            .take(self.config.max_retries as usize);

        RetryIf::start(strategy, || self.get_once(url), |e: &FetchError| {
            let retry = e.is_retryable();
            if retry {
                warn!("GET {} failed ({}), retrying", url, e);
            }
            retry
        })
        .await
    }

    pub async fn get_text(&self, url: &str) -> FetchResult<String> {
        Ok(self.get(url).await?.body)
    }

    async fn get_once(&self, url: &str) -> FetchResult<Payload> {
        debug!("GET {}", url);
        let resp = self.inner.get(url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_lowercase();
        let final_url = resp.url().to_string();
        let body = resp.text().await?;

        Ok(Payload {
            url: final_url,
            content_type,
            body,
        })
    }

    /// Sleep for the configured delay + random jitter.
    async fn polite_delay(&self) {
        let jitter_ms = if self.config.jitter_ms > 0 {
            rand::rng().random_range(0..=self.config.jitter_ms)
        } else {
            0
        };
        let total = Duration::from_millis(self.config.request_delay_ms + jitter_ms);
        if !total.is_zero() {
            sleep(total).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(url: &str, content_type: &str, body: &str) -> Payload {
        Payload {
            url: url.into(),
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    #[test]
    fn test_payload_kind_detection() {
        assert!(payload("https://x/api/trades", "application/json; charset=utf-8", "[]").is_json());
        assert!(payload("https://x/data.json", "application/octet-stream", "").is_json());
        assert!(payload("https://x/export", "text/csv", "a,b").is_csv());
        assert!(payload("https://x/all.csv", "", "a,b").is_csv());
        assert!(!payload("https://x/trades", "text/html", "<html></html>").is_json());
    }

    #[test]
    fn test_client_builds_from_default_config() {
        let cfg = crate::config::AppConfig::default();
        assert!(HttpClient::new(&cfg.scraper).is_ok());
    }

    #[tokio::test]
    async fn test_refused_connection_is_retried_then_reported() {
        let mut cfg = crate::config::AppConfig::default().scraper;
        cfg.request_delay_ms = 0;
        cfg.jitter_ms = 0;
        cfg.max_retries = 2;
        cfg.timeout_secs = 2;
        let client = HttpClient::new(&cfg).unwrap();

        let err = client.get("http://127.0.0.1:1/api/trades").await.unwrap_err();
        assert!(matches!(err, FetchError::Request(_)));
        assert!(err.is_retryable());
    }
}
