//! Source fallback and the dataset facade.
//!
//! Each dataset is backed by a [`FallbackChain`]: an ordered list of sources
//! tried one after another until one yields at least one valid record.
//! `Pipeline` puts the chains behind per-chamber caches and answers
//! `houseTrades | senateTrades | congressionalTrades | politicians`.

use crate::cache::{Clock, SystemClock, TimedCache};
use crate::config::{AppConfig, CacheConfig, SourcesConfig};
use crate::models::{Chamber, Dataset, Politician, Quote, Trade};
use crate::quotes::{QuoteChain, QuoteError, QuoteResponse};
use crate::scraper::cleaner::{dedupe, normalize_all, Record};
use crate::scraper::error::FetchError;
use crate::scraper::http_client::HttpClient;
use crate::scraper::parsers::{extract, extract_politicians};
use crate::scraper::{DownloadLinkSource, HtmlPageSource, JsonApiSource, RecordSource};
use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

// ── Fallback chain ────────────────────────────────────────────────────────────

pub struct SourceAttempt {
    pub name: String,
    pub timeout: Duration,
    pub source: Arc<dyn RecordSource>,
}

pub struct FallbackChain {
    label: String,
    attempts: Vec<SourceAttempt>,
}

impl FallbackChain {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            attempts: Vec::new(),
        }
    }

    pub fn attempt(
        mut self,
        name: impl Into<String>,
        timeout: Duration,
        source: impl RecordSource + 'static,
    ) -> Self {
        self.attempts.push(SourceAttempt {
            name: name.into(),
            timeout,
            source: Arc::new(source),
        });
        self
    }

    /// Try sources in order. Never fails: when every source is exhausted the
    /// result is an empty dataset with `source_used = "none"`.
    pub async fn run<T: Record>(&self, now: DateTime<Utc>) -> Dataset<T> {
        for attempt in &self.attempts {
            let fetched = match tokio::time::timeout(attempt.timeout, attempt.source.fetch_raw()).await {
                Ok(r) => r,
                Err(_) => Err(FetchError::Timeout {
                    source_name: attempt.name.clone(),
                    secs: attempt.timeout.as_secs(),
                }),
            };

            let raws = match fetched {
                Ok(raws) => raws,
                Err(e) => {
                    warn!("{}: source '{}' failed: {}", self.label, attempt.name, e);
                    continue;
                }
            };

            let total = raws.len();
            let raws: Vec<_> = raws.into_iter().map(|r| r.with_source(&attempt.name)).collect();
            let records: Vec<T> = normalize_all(&raws, now);

            if records.is_empty() {
                warn!(
                    "{}: source '{}' gave {} rows, none valid",
                    self.label, attempt.name, total
                );
                continue;
            }

            info!(
                "{}: {} records from '{}' ({} raw)",
                self.label,
                records.len(),
                attempt.name,
                total
            );
            return Dataset {
                records,
                fetched_at: now,
                source_used: attempt.name.clone(),
            };
        }

        warn!("{}: all {} sources exhausted", self.label, self.attempts.len());
        Dataset::empty(now)
    }
}

/// The four chains behind the datasets.
pub struct Chains {
    pub house_trades: FallbackChain,
    pub senate_trades: FallbackChain,
    pub house_politicians: FallbackChain,
    pub senate_politicians: FallbackChain,
}

impl Chains {
    pub fn from_config(client: Arc<HttpClient>, sources: &SourcesConfig) -> Self {
        let timeout = Duration::from_secs(sources.source_timeout_secs);
        let house = sources.house_base_url.trim_end_matches('/');
        let senate = sources.senate_base_url.trim_end_matches('/');

        let trades = |label: &str, base: &str, chamber: Chamber| {
            FallbackChain::new(label)
                .attempt(
                    format!("{}-api", chamber),
                    timeout,
                    JsonApiSource::new(Arc::clone(&client), format!("{}/api/trades", base), chamber),
                )
                .attempt(
                    format!("{}-download", chamber),
                    timeout,
                    DownloadLinkSource::new(Arc::clone(&client), base, chamber),
                )
                .attempt(
                    format!("{}-html", chamber),
                    timeout,
                    HtmlPageSource::new(
                        Arc::clone(&client),
                        format!("{}/trades", base),
                        chamber,
                        extract,
                    ),
                )
                .attempt(
                    "capitol-trades",
                    timeout,
                    HtmlPageSource::new(
                        Arc::clone(&client),
                        sources.capitol_trades_url.as_str(),
                        chamber,
                        extract,
                    )
                    .mixed_chambers(),
                )
        };

        let members = |label: &str, base: &str, path: &str, chamber: Chamber| {
            FallbackChain::new(label)
                .attempt(
                    format!("{}-api", chamber),
                    timeout,
                    JsonApiSource::new(Arc::clone(&client), format!("{}/api/{}", base, path), chamber),
                )
                .attempt(
                    format!("{}-html", chamber),
                    timeout,
                    HtmlPageSource::new(
                        Arc::clone(&client),
                        format!("{}/{}", base, path),
                        chamber,
                        extract_politicians,
                    ),
                )
        };

        Self {
            house_trades: trades("houseTrades", house, Chamber::House),
            senate_trades: trades("senateTrades", senate, Chamber::Senate),
            house_politicians: members("housePoliticians", house, "representatives", Chamber::House),
            senate_politicians: members("senatePoliticians", senate, "senators", Chamber::Senate),
        }
    }
}

// ── Dataset names ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetName {
    HouseTrades,
    SenateTrades,
    CongressionalTrades,
    Politicians,
}

impl DatasetName {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetName::HouseTrades => "houseTrades",
            DatasetName::SenateTrades => "senateTrades",
            DatasetName::CongressionalTrades => "congressionalTrades",
            DatasetName::Politicians => "politicians",
        }
    }
}

impl fmt::Display for DatasetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', '_'], "").as_str() {
            "housetrades" => Ok(DatasetName::HouseTrades),
            "senatetrades" => Ok(DatasetName::SenateTrades),
            "congressionaltrades" | "trades" => Ok(DatasetName::CongressionalTrades),
            "politicians" => Ok(DatasetName::Politicians),
            other => Err(format!("unknown dataset '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum DatasetView {
    Trades(Arc<Dataset<Trade>>),
    Politicians(Arc<Dataset<Politician>>),
}

impl DatasetView {
    pub fn len(&self) -> usize {
        match self {
            DatasetView::Trades(d) => d.len(),
            DatasetView::Politicians(d) => d.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            DatasetView::Trades(d) => d.is_empty(),
            DatasetView::Politicians(d) => d.is_empty(),
        }
    }

    pub fn source_used(&self) -> &str {
        match self {
            DatasetView::Trades(d) => &d.source_used,
            DatasetView::Politicians(d) => &d.source_used,
        }
    }
}

/// Merge the two chambers' datasets into one.
fn combine<T: Record>(house: &Dataset<T>, senate: &Dataset<T>) -> Dataset<T> {
    let records = house.records.iter().chain(&senate.records).cloned().collect();
    Dataset {
        records: dedupe(records),
        fetched_at: house.fetched_at.min(senate.fetched_at),
        source_used: format!("house={}; senate={}", house.source_used, senate.source_used),
    }
}

/// Keep only records of `filter`'s chamber; untouched when nothing is dropped.
fn narrow<T: Record>(dataset: Arc<Dataset<T>>, filter: Option<Chamber>) -> Arc<Dataset<T>> {
    let Some(chamber) = filter else {
        return dataset;
    };
    if dataset.records.iter().all(|r| r.chamber() == chamber) {
        return dataset;
    }
    Arc::new(Dataset {
        records: dataset
            .records
            .iter()
            .filter(|r| r.chamber() == chamber)
            .cloned()
            .collect(),
        fetched_at: dataset.fetched_at,
        source_used: dataset.source_used.clone(),
    })
}

// ── Facade ────────────────────────────────────────────────────────────────────

pub struct Pipeline {
    chains: Chains,
    quote_chain: QuoteChain,
    trades: TimedCache<Chamber, Dataset<Trade>>,
    politicians: TimedCache<Chamber, Dataset<Politician>>,
    quotes: TimedCache<String, Quote>,
}

impl Pipeline {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = Arc::new(
            HttpClient::new(&config.scraper).context("Failed to build HTTP client")?,
        );
        let timeout = Duration::from_secs(config.sources.source_timeout_secs);

        Ok(Self::with_parts(
            Chains::from_config(Arc::clone(&client), &config.sources),
            QuoteChain::from_config(client, &config.quotes, timeout),
            Arc::new(SystemClock),
            &config.cache,
        ))
    }

    pub fn with_parts(
        chains: Chains,
        quote_chain: QuoteChain,
        clock: Arc<dyn Clock>,
        cache: &CacheConfig,
    ) -> Self {
        Self {
            chains,
            quote_chain,
            trades: TimedCache::new(Arc::clone(&clock), TimeDelta::minutes(cache.trades_window_mins)),
            politicians: TimedCache::new(
                Arc::clone(&clock),
                TimeDelta::minutes(cache.politicians_window_mins),
            ),
            quotes: TimedCache::new(clock, TimeDelta::hours(cache.quotes_window_hours)),
        }
    }

    pub async fn trades(&self, chamber: Chamber) -> Arc<Dataset<Trade>> {
        let chain = match chamber {
            Chamber::House => &self.chains.house_trades,
            Chamber::Senate => &self.chains.senate_trades,
        };
        self.trades.get_or_fetch(chamber, |now| chain.run(now)).await
    }

    pub async fn politicians(&self, chamber: Chamber) -> Arc<Dataset<Politician>> {
        let chain = match chamber {
            Chamber::House => &self.chains.house_politicians,
            Chamber::Senate => &self.chains.senate_politicians,
        };
        self.politicians.get_or_fetch(chamber, |now| chain.run(now)).await
    }

    pub async fn fetch_dataset(&self, name: DatasetName, filter: Option<Chamber>) -> DatasetView {
        debug!("fetch_dataset {} filter={:?}", name, filter);
        match name {
            DatasetName::HouseTrades => {
                DatasetView::Trades(narrow(self.trades(Chamber::House).await, filter))
            }
            DatasetName::SenateTrades => {
                DatasetView::Trades(narrow(self.trades(Chamber::Senate).await, filter))
            }
            DatasetName::CongressionalTrades => match filter {
                Some(chamber) => DatasetView::Trades(narrow(self.trades(chamber).await, filter)),
                None => {
                    let (house, senate) =
                        tokio::join!(self.trades(Chamber::House), self.trades(Chamber::Senate));
                    DatasetView::Trades(Arc::new(combine(&house, &senate)))
                }
            },
            DatasetName::Politicians => match filter {
                Some(chamber) => {
                    DatasetView::Politicians(narrow(self.politicians(chamber).await, filter))
                }
                None => {
                    let (house, senate) = tokio::join!(
                        self.politicians(Chamber::House),
                        self.politicians(Chamber::Senate)
                    );
                    DatasetView::Politicians(Arc::new(combine(&house, &senate)))
                }
            },
        }
    }

    /// Market quote for `ticker`, cached per upper-cased symbol. Failures are
    /// returned as an error body and never cached.
    pub async fn enrich_ticker(&self, ticker: &str) -> QuoteResponse {
        let symbol = ticker.trim().to_uppercase();
        if symbol.is_empty() {
            return QuoteResponse::failure(&QuoteError::NoTicker, self.quotes.now());
        }

        let chain = &self.quote_chain;
        let lookup = symbol.clone();
        match self
            .quotes
            .get_or_try_fetch(symbol, |now| async move { chain.fetch(&lookup, now).await })
            .await
        {
            Ok(quote) => QuoteResponse::Quote(quote),
            Err(e) => {
                warn!("Quote for {}: {}", ticker.trim(), e);
                QuoteResponse::failure(&e, self.quotes.now())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::FakeClock;
    use crate::models::RawRecord;
    use crate::quotes::QuoteProvider;
    use crate::scraper::error::FetchResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn start() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn trade_row(chamber: Chamber, name: &str, date: &str, ticker: &str) -> RawRecord {
        let mut raw = RawRecord::new(chamber, "json");
        raw.insert("politician", name);
        raw.insert("transaction_date", date);
        raw.insert("ticker", ticker);
        raw.insert("transaction_type", "Purchase");
        raw
    }

    enum Behaviour {
        Fail,
        Hang,
        Rows(Vec<RawRecord>),
    }

    struct FakeSource {
        behaviour: Behaviour,
        calls: Arc<AtomicUsize>,
    }

    impl FakeSource {
        fn new(behaviour: Behaviour) -> Self {
            Self {
                behaviour,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn counted(behaviour: Behaviour, calls: &Arc<AtomicUsize>) -> Self {
            Self {
                behaviour,
                calls: Arc::clone(calls),
            }
        }
    }

    #[async_trait]
    impl RecordSource for FakeSource {
        async fn fetch_raw(&self) -> FetchResult<Vec<RawRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behaviour {
                Behaviour::Fail => Err(FetchError::Status {
                    url: "https://example.test".into(),
                    status: 503,
                }),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(Vec::new())
                }
                Behaviour::Rows(rows) => Ok(rows.clone()),
            }
        }
    }

    fn three_house_trades() -> Vec<RawRecord> {
        vec![
            trade_row(Chamber::House, "Jane Doe", "2024-01-15", "AAPL"),
            trade_row(Chamber::House, "Dan Crenshaw", "01/20/2024", "MSFT"),
            trade_row(Chamber::House, "Nancy Pelosi", "Feb 3, 2024", "NVDA"),
        ]
    }

    const SHORT: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn test_first_source_fails_second_wins() {
        let chain = FallbackChain::new("houseTrades")
            .attempt("house-api", SHORT, FakeSource::new(Behaviour::Fail))
            .attempt("house-html", SHORT, FakeSource::new(Behaviour::Rows(three_house_trades())));

        let ds: Dataset<Trade> = chain.run(start()).await;
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.source_used, "house-html");
        assert_eq!(ds.fetched_at, start());
        assert!(ds.records.iter().all(|t| t.data_source.starts_with("house-html/")));
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let chain = FallbackChain::new("senateTrades")
            .attempt("slow", Duration::from_millis(20), FakeSource::new(Behaviour::Hang))
            .attempt(
                "fast",
                SHORT,
                FakeSource::new(Behaviour::Rows(vec![trade_row(
                    Chamber::Senate,
                    "John Roe",
                    "2024-02-01",
                    "XOM",
                )])),
            );

        let ds: Dataset<Trade> = chain.run(start()).await;
        assert_eq!(ds.source_used, "fast");
        assert_eq!(ds.records[0].ticker, "XOM");
    }

    #[tokio::test]
    async fn test_zero_valid_rows_moves_on() {
        let mut nameless = RawRecord::new(Chamber::House, "table");
        nameless.insert("transaction_date", "2024-01-15");
        let calls = Arc::new(AtomicUsize::new(0));

        let chain = FallbackChain::new("houseTrades")
            .attempt("junk", SHORT, FakeSource::new(Behaviour::Rows(vec![nameless])))
            .attempt("good", SHORT, FakeSource::new(Behaviour::Rows(three_house_trades())))
            .attempt("never", SHORT, FakeSource::counted(Behaviour::Fail, &calls));

        let ds: Dataset<Trade> = chain.run(start()).await;
        assert_eq!(ds.source_used, "good");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_sources_exhausted_is_empty_not_error() {
        let chain = FallbackChain::new("houseTrades")
            .attempt("a", SHORT, FakeSource::new(Behaviour::Fail))
            .attempt("b", SHORT, FakeSource::new(Behaviour::Rows(Vec::new())));

        let ds: Dataset<Trade> = chain.run(start()).await;
        assert!(ds.is_empty());
        assert_eq!(ds.source_used, "none");
    }

    struct NoQuotes;

    #[async_trait]
    impl QuoteProvider for NoQuotes {
        fn name(&self) -> &'static str {
            "none"
        }

        async fn quote(&self, _ticker: &str, _now: DateTime<Utc>) -> FetchResult<Quote> {
            Err(FetchError::no_data("offline"))
        }
    }

    struct CountingQuotes(Arc<AtomicUsize>);

    #[async_trait]
    impl QuoteProvider for CountingQuotes {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn quote(&self, ticker: &str, now: DateTime<Utc>) -> FetchResult<Quote> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Quote {
                ticker: ticker.to_string(),
                current_price: Some(100.0),
                data_source: "counting".into(),
                last_updated: now,
                ..Default::default()
            })
        }
    }

    fn pipeline(
        house_calls: &Arc<AtomicUsize>,
        quotes: Vec<Box<dyn QuoteProvider>>,
        clock: Arc<FakeClock>,
    ) -> Pipeline {
        let senate_rows = vec![
            trade_row(Chamber::Senate, "John Roe", "2024-02-01", "XOM"),
            trade_row(Chamber::Senate, "Mary Major", "2024-02-02", "TSLA"),
        ];
        let mut rep = RawRecord::new(Chamber::House, "json");
        rep.insert("name", "Jane Doe");
        rep.insert("state", "CA");
        rep.insert("party", "Democratic");
        let mut sen = RawRecord::new(Chamber::Senate, "json");
        sen.insert("name", "John Roe");
        sen.insert("state", "TX");

        let chains = Chains {
            house_trades: FallbackChain::new("houseTrades").attempt(
                "house-api",
                SHORT,
                FakeSource::counted(Behaviour::Rows(three_house_trades()), house_calls),
            ),
            senate_trades: FallbackChain::new("senateTrades")
                .attempt("senate-api", SHORT, FakeSource::new(Behaviour::Fail))
                .attempt("senate-html", SHORT, FakeSource::new(Behaviour::Rows(senate_rows))),
            house_politicians: FallbackChain::new("housePoliticians")
                .attempt("house-api", SHORT, FakeSource::new(Behaviour::Rows(vec![rep]))),
            senate_politicians: FallbackChain::new("senatePoliticians")
                .attempt("senate-api", SHORT, FakeSource::new(Behaviour::Rows(vec![sen]))),
        };

        Pipeline::with_parts(
            chains,
            QuoteChain::new(quotes, SHORT),
            clock,
            &CacheConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_congressional_trades_merge_both_chambers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let p = pipeline(&calls, vec![Box::new(NoQuotes)], FakeClock::at(start()));

        let view = p.fetch_dataset(DatasetName::CongressionalTrades, None).await;
        let DatasetView::Trades(ds) = view else {
            panic!("expected trades");
        };
        assert_eq!(ds.len(), 5);
        assert_eq!(ds.source_used, "house=house-api; senate=senate-html");
        assert_eq!(ds.fetched_at, start());

        let senate_only = p
            .fetch_dataset(DatasetName::CongressionalTrades, Some(Chamber::Senate))
            .await;
        assert_eq!(senate_only.len(), 2);
        assert_eq!(senate_only.source_used(), "senate-html");
    }

    #[tokio::test]
    async fn test_dataset_is_cached_within_window() {
        let calls = Arc::new(AtomicUsize::new(0));
        let clock = FakeClock::at(start());
        let p = pipeline(&calls, vec![Box::new(NoQuotes)], clock.clone());

        let first = p.fetch_dataset(DatasetName::HouseTrades, None).await;
        clock.advance(TimeDelta::minutes(30));
        let second = p.fetch_dataset(DatasetName::HouseTrades, None).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let (DatasetView::Trades(a), DatasetView::Trades(b)) = (first, second) else {
            panic!("expected trades");
        };
        assert_eq!(a.fetched_at, b.fetched_at);

        clock.advance(TimeDelta::minutes(31));
        p.fetch_dataset(DatasetName::HouseTrades, None).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_chamber_filter_on_single_chamber_dataset() {
        let calls = Arc::new(AtomicUsize::new(0));
        let p = pipeline(&calls, vec![Box::new(NoQuotes)], FakeClock::at(start()));

        let view = p.fetch_dataset(DatasetName::HouseTrades, Some(Chamber::Senate)).await;
        assert_eq!(view.len(), 0);
        assert!(view.is_empty());

        let politicians = p.fetch_dataset(DatasetName::Politicians, None).await;
        assert_eq!(politicians.len(), 2);
        assert!(!politicians.is_empty());
        assert_eq!(politicians.source_used(), "house=house-api; senate=senate-api");
    }

    #[tokio::test]
    async fn test_enrich_ticker_caches_by_upper_case_symbol() {
        let calls = Arc::new(AtomicUsize::new(0));
        let quote_calls = Arc::new(AtomicUsize::new(0));
        let p = pipeline(
            &calls,
            vec![Box::new(CountingQuotes(Arc::clone(&quote_calls)))],
            FakeClock::at(start()),
        );

        let QuoteResponse::Quote(q) = p.enrich_ticker(" aapl ").await else {
            panic!("expected a quote");
        };
        assert_eq!(q.ticker, "AAPL");
        p.enrich_ticker("AAPL").await;
        assert_eq!(quote_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_enrich_ticker_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let p = pipeline(&calls, vec![Box::new(NoQuotes)], FakeClock::at(start()));

        let QuoteResponse::Error(empty) = p.enrich_ticker("   ").await else {
            panic!("expected an error body");
        };
        assert_eq!(empty.error, "No ticker provided");

        let QuoteResponse::Error(limited) = p.enrich_ticker("zzzz").await else {
            panic!("expected an error body");
        };
        assert_eq!(limited.ticker, "ZZZZ");
        assert_eq!(limited.data_source.as_deref(), Some("limited"));
    }

    #[test]
    fn test_dataset_name_parsing() {
        assert_eq!("houseTrades".parse(), Ok(DatasetName::HouseTrades));
        assert_eq!("senate-trades".parse(), Ok(DatasetName::SenateTrades));
        assert_eq!("congressionalTrades".parse(), Ok(DatasetName::CongressionalTrades));
        assert!("stocks".parse::<DatasetName>().is_err());
    }
}
