use crate::config::QuotesConfig;
use crate::models::Quote;
use crate::scraper::error::{FetchError, FetchResult};
use crate::scraper::http_client::HttpClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

const ALPHA_VANTAGE_URL: &str = "https://www.alphavantage.co/query";
const FMP_QUOTE_URL: &str = "https://financialmodelingprep.com/api/v3/quote";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum QuoteError {
    #[error("No ticker provided")]
    NoTicker,

    #[error("Limited data available")]
    Unavailable { ticker: String },
}

/// What `enrich_ticker` hands back: a quote, or an error body.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum QuoteResponse {
    Quote(Arc<Quote>),
    Error(QuoteFailure),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuoteFailure {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ticker: String,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl QuoteResponse {
    pub fn failure(err: &QuoteError, now: DateTime<Utc>) -> Self {
        let failure = match err {
            QuoteError::NoTicker => QuoteFailure {
                ticker: String::new(),
                error: err.to_string(),
                data_source: None,
                last_updated: None,
            },
            QuoteError::Unavailable { ticker } => QuoteFailure {
                ticker: ticker.clone(),
                error: err.to_string(),
                data_source: Some("limited".to_string()),
                last_updated: Some(now),
            },
        };
        QuoteResponse::Error(failure)
    }
}

// ── Provider trait ────────────────────────────────────────────────────────────

#[async_trait]
pub trait QuoteProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn quote(&self, ticker: &str, now: DateTime<Utc>) -> FetchResult<Quote>;
}

/// Providers tried in order; the first one with a price wins.
pub struct QuoteChain {
    providers: Vec<Box<dyn QuoteProvider>>,
    timeout: Duration,
}

impl QuoteChain {
    pub fn new(providers: Vec<Box<dyn QuoteProvider>>, timeout: Duration) -> Self {
        Self { providers, timeout }
    }

    /// Yahoo Finance, then Alpha Vantage, then Financial Modeling Prep.
    pub fn from_config(client: Arc<HttpClient>, config: &QuotesConfig, timeout: Duration) -> Self {
        Self::new(
            vec![
                Box::new(YahooProvider {
                    client: Arc::clone(&client),
                    url: config.yahoo_quote_url.clone(),
                }),
                Box::new(AlphaVantageProvider {
                    client: Arc::clone(&client),
                    api_key: config.alpha_vantage_key.clone(),
                }),
                Box::new(FmpProvider {
                    client,
                    api_key: config.fmp_key.clone(),
                }),
            ],
            timeout,
        )
    }

    pub async fn fetch(&self, ticker: &str, now: DateTime<Utc>) -> Result<Quote, QuoteError> {
        if ticker.is_empty() {
            return Err(QuoteError::NoTicker);
        }

        for provider in &self.providers {
            let result = match tokio::time::timeout(self.timeout, provider.quote(ticker, now)).await {
                Ok(r) => r,
                Err(_) => Err(FetchError::Timeout {
                    source_name: provider.name().to_string(),
                    secs: self.timeout.as_secs(),
                }),
            };

            match result {
                Ok(quote) if quote.current_price.is_some() => {
                    info!("{} quote from {}", ticker, provider.name());
                    return Ok(quote);
                }
                Ok(_) => warn!("{} returned no price for {}", provider.name(), ticker),
                Err(e) => warn!("{} error for {}: {}", provider.name(), ticker, e),
            }
        }

        Err(QuoteError::Unavailable {
            ticker: ticker.to_string(),
        })
    }
}

// ── Yahoo Finance ─────────────────────────────────────────────────────────────

pub struct YahooProvider {
    client: Arc<HttpClient>,
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YahooEnvelope {
    quote_response: YahooResults,
}

#[derive(Debug, Deserialize)]
struct YahooResults {
    #[serde(default)]
    result: Vec<YahooQuote>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YahooQuote {
    long_name: Option<String>,
    short_name: Option<String>,
    regular_market_price: Option<f64>,
    regular_market_previous_close: Option<f64>,
    regular_market_open: Option<f64>,
    regular_market_day_high: Option<f64>,
    regular_market_day_low: Option<f64>,
    regular_market_volume: Option<i64>,
    market_cap: Option<f64>,
    regular_market_change: Option<f64>,
    regular_market_change_percent: Option<f64>,
    exchange: Option<String>,
}

pub fn parse_yahoo(body: &str, ticker: &str, now: DateTime<Utc>) -> FetchResult<Quote> {
    let envelope: YahooEnvelope = serde_json::from_str(body)?;
    let q = envelope
        .quote_response
        .result
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::no_data(format!("yahoo has no result for {}", ticker)))?;

    Ok(Quote {
        ticker: ticker.to_string(),
        company_name: q.long_name.or(q.short_name).or_else(|| Some(ticker.to_string())),
        current_price: q.regular_market_price,
        previous_close: q.regular_market_previous_close,
        open: q.regular_market_open,
        day_high: q.regular_market_day_high,
        day_low: q.regular_market_day_low,
        volume: q.regular_market_volume,
        market_cap: q.market_cap,
        change: q.regular_market_change,
        change_percent: q.regular_market_change_percent,
        exchange: q.exchange,
        data_source: "yahoo-finance".to_string(),
        last_updated: now,
    })
}

#[async_trait]
impl QuoteProvider for YahooProvider {
    fn name(&self) -> &'static str {
        "yahoo-finance"
    }

    async fn quote(&self, ticker: &str, now: DateTime<Utc>) -> FetchResult<Quote> {
        let url = Url::parse_with_params(&self.url, &[("symbols", ticker)])?;
        let body = self.client.get_text(url.as_str()).await?;
        parse_yahoo(&body, ticker, now)
    }
}

// ── Alpha Vantage ─────────────────────────────────────────────────────────────

pub struct AlphaVantageProvider {
    client: Arc<HttpClient>,
    api_key: String,
}

/// "123.45" → 123.45 | "$1,234.50" → 1234.5 | "N/A" → None
fn parse_price(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() || s == "N/A" || s == "-" {
        return None;
    }
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    cleaned.parse().ok()
}

fn parse_pct(s: &str) -> Option<f64> {
    let s = s.trim().replace(['%', ','], "");
    if s.is_empty() || s == "N/A" || s == "-" {
        return None;
    }
    s.parse().ok()
}

fn parse_volume(s: &str) -> Option<i64> {
    let cleaned: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
    cleaned.parse().ok()
}

pub fn parse_alpha_vantage(body: &str, ticker: &str, now: DateTime<Utc>) -> FetchResult<Quote> {
    let value: serde_json::Value = serde_json::from_str(body)?;
    let quote = value
        .get("Global Quote")
        .and_then(|q| q.as_object())
        .ok_or_else(|| FetchError::no_data(format!("alpha vantage has no quote for {}", ticker)))?;

    let field = |key: &str| quote.get(key).and_then(|v| v.as_str()).unwrap_or_default();

    Ok(Quote {
        ticker: ticker.to_string(),
        current_price: parse_price(field("05. price")),
        previous_close: parse_price(field("08. previous close")),
        open: parse_price(field("02. open")),
        day_high: parse_price(field("03. high")),
        day_low: parse_price(field("04. low")),
        volume: parse_volume(field("06. volume")),
        change: parse_price(field("09. change")),
        change_percent: parse_pct(field("10. change percent")),
        data_source: "alpha-vantage".to_string(),
        last_updated: now,
        ..Default::default()
    })
}

#[async_trait]
impl QuoteProvider for AlphaVantageProvider {
    fn name(&self) -> &'static str {
        "alpha-vantage"
    }

    async fn quote(&self, ticker: &str, now: DateTime<Utc>) -> FetchResult<Quote> {
        let url = Url::parse_with_params(
            ALPHA_VANTAGE_URL,
            &[
                ("function", "GLOBAL_QUOTE"),
                ("symbol", ticker),
                ("apikey", self.api_key.as_str()),
            ],
        )?;
        let body = self.client.get_text(url.as_str()).await?;
        parse_alpha_vantage(&body, ticker, now)
    }
}

// ── Financial Modeling Prep ───────────────────────────────────────────────────

pub struct FmpProvider {
    client: Arc<HttpClient>,
    api_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FmpQuote {
    name: Option<String>,
    price: Option<f64>,
    previous_close: Option<f64>,
    open: Option<f64>,
    day_high: Option<f64>,
    day_low: Option<f64>,
    volume: Option<f64>,
    market_cap: Option<f64>,
    change: Option<f64>,
    changes_percentage: Option<f64>,
    exchange: Option<String>,
}

pub fn parse_fmp(body: &str, ticker: &str, now: DateTime<Utc>) -> FetchResult<Quote> {
    let rows: Vec<FmpQuote> = serde_json::from_str(body)?;
    let q = rows
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::no_data(format!("fmp has no quote for {}", ticker)))?;

    Ok(Quote {
        ticker: ticker.to_string(),
        company_name: q.name,
        current_price: q.price,
        previous_close: q.previous_close,
        open: q.open,
        day_high: q.day_high,
        day_low: q.day_low,
        volume: q.volume.map(|v| v as i64),
        market_cap: q.market_cap,
        change: q.change,
        change_percent: q.changes_percentage,
        exchange: q.exchange,
        data_source: "fmp-api".to_string(),
        last_updated: now,
    })
}

#[async_trait]
impl QuoteProvider for FmpProvider {
    fn name(&self) -> &'static str {
        "fmp-api"
    }

    async fn quote(&self, ticker: &str, now: DateTime<Utc>) -> FetchResult<Quote> {
        let base = format!("{}/{}", FMP_QUOTE_URL, ticker);
        let url = Url::parse_with_params(&base, &[("apikey", self.api_key.as_str())])?;
        let body = self.client.get_text(url.as_str()).await?;
        parse_fmp(&body, ticker, now)
    }
}
