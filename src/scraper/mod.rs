pub mod cleaner;
pub mod error;
pub mod http_client;
pub mod parsers;
pub mod tickers;

use crate::models::{Chamber, RawRecord};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use self::error::{FetchError, FetchResult};
use self::http_client::{HttpClient, Payload};
use self::parsers::{
    extract_html, find_download_links, parse_csv_records, parse_json_records, Extractor,
};

// ── Source trait ──────────────────────────────────────────────────────────────

/// One upstream origin for a dataset. Returns raw rows; normalization is
/// done by the caller so every source is treated the same way.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch_raw(&self) -> FetchResult<Vec<RawRecord>>;
}

/// Decode a fetched payload by its type: JSON, CSV, or HTML via `extractor`.
pub fn records_from_payload(
    payload: &Payload,
    chamber: Chamber,
    extractor: Extractor,
) -> FetchResult<Vec<RawRecord>> {
    if payload.is_json() {
        parse_json_records(&payload.body, chamber)
    } else if payload.is_csv() {
        parse_csv_records(&payload.body, chamber)
    } else {
        Ok(extract_html(&payload.body, chamber, extractor))
    }
}

fn named_chamber(value: &str) -> Option<Chamber> {
    let value = value.to_lowercase();
    if value.contains("senat") {
        Some(Chamber::Senate)
    } else if value.contains("house") || value.contains("representative") {
        Some(Chamber::House)
    } else {
        None
    }
}

/// Drop rows whose own `chamber` field names the other chamber. Rows without
/// a recognisable one are kept.
pub fn retain_chamber(rows: Vec<RawRecord>, chamber: Chamber) -> Vec<RawRecord> {
    let before = rows.len();
    let kept: Vec<RawRecord> = rows
        .into_iter()
        .filter(|raw| {
            raw.get("chamber")
                .and_then(named_chamber)
                .is_none_or(|c| c == chamber)
        })
        .collect();
    if kept.len() < before {
        debug!("{}: dropped {} rows from the other chamber", chamber, before - kept.len());
    }
    kept
}

// ── Structured API ────────────────────────────────────────────────────────────

/// JSON endpoint such as `/api/trades` or `/api/senators`.
pub struct JsonApiSource {
    client: Arc<HttpClient>,
    url: String,
    chamber: Chamber,
}

impl JsonApiSource {
    pub fn new(client: Arc<HttpClient>, url: impl Into<String>, chamber: Chamber) -> Self {
        Self {
            client,
            url: url.into(),
            chamber,
        }
    }
}

#[async_trait]
impl RecordSource for JsonApiSource {
    async fn fetch_raw(&self) -> FetchResult<Vec<RawRecord>> {
        info!("Fetching {} API {}", self.chamber, self.url);
        let body = self.client.get_text(&self.url).await?;
        parse_json_records(&body, self.chamber)
    }
}

// ── Bulk download discovered on a landing page ────────────────────────────────

/// Finds CSV/JSON export links on a landing page and reads the first one
/// that decodes to at least one row.
pub struct DownloadLinkSource {
    client: Arc<HttpClient>,
    page_url: String,
    chamber: Chamber,
}

impl DownloadLinkSource {
    pub fn new(client: Arc<HttpClient>, page_url: impl Into<String>, chamber: Chamber) -> Self {
        Self {
            client,
            page_url: page_url.into(),
            chamber,
        }
    }
}

#[async_trait]
impl RecordSource for DownloadLinkSource {
    async fn fetch_raw(&self) -> FetchResult<Vec<RawRecord>> {
        let page = self.client.get(&self.page_url).await?;
        let base = Url::parse(&page.url)?;
        let links = find_download_links(&page.body, &base);

        if links.is_empty() {
            return Err(FetchError::no_data(format!("no download links on {}", self.page_url)));
        }
        debug!("{} download link(s) on {}", links.len(), self.page_url);

        for link in links {
            let payload = match self.client.get(link.as_str()).await {
                Ok(p) => p,
                Err(e) => {
                    warn!("Download {} failed: {}", link, e);
                    continue;
                }
            };

            let rows = if payload.is_json() {
                parse_json_records(&payload.body, self.chamber)
            } else if payload.is_csv() {
                parse_csv_records(&payload.body, self.chamber)
            } else {
                Err(FetchError::Payload(format!(
                    "{} served '{}'",
                    link, payload.content_type
                )))
            };

            match rows {
                Ok(rows) if !rows.is_empty() => {
                    info!("{}: {} rows from {}", self.chamber, rows.len(), link);
                    return Ok(rows);
                }
                Ok(_) => debug!("{} decoded to zero rows", link),
                Err(e) => warn!("{}: {}", link, e),
            }
        }

        Err(FetchError::no_data(format!("no usable download on {}", self.page_url)))
    }
}

// ── HTML scrape ───────────────────────────────────────────────────────────────

/// Rendered listing page run through the document extractor.
pub struct HtmlPageSource {
    client: Arc<HttpClient>,
    url: String,
    chamber: Chamber,
    extractor: Extractor,
    mixed_chambers: bool,
}

impl HtmlPageSource {
    pub fn new(
        client: Arc<HttpClient>,
        url: impl Into<String>,
        chamber: Chamber,
        extractor: Extractor,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            chamber,
            extractor,
            mixed_chambers: false,
        }
    }

    /// The page lists both chambers; keep only rows for ours.
    pub fn mixed_chambers(mut self) -> Self {
        self.mixed_chambers = true;
        self
    }
}

#[async_trait]
impl RecordSource for HtmlPageSource {
    async fn fetch_raw(&self) -> FetchResult<Vec<RawRecord>> {
        info!("Scraping {} page {}", self.chamber, self.url);
        let payload = self.client.get(&self.url).await?;
        let mut rows = records_from_payload(&payload, self.chamber, self.extractor)?;
        if self.mixed_chambers {
            rows = retain_chamber(rows, self.chamber);
        }

        if rows.is_empty() {
            return Err(FetchError::no_data(format!("nothing extracted from {}", self.url)));
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::parsers::{extract, extract_politicians};

    fn payload(url: &str, content_type: &str, body: &str) -> Payload {
        Payload {
            url: url.into(),
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    #[test]
    fn test_records_from_json_payload() {
        let p = payload(
            "https://senatestockwatcher.com/api/senators",
            "application/json",
            r#"[{"first_name": "John", "last_name": "Roe", "party": "Republican", "state": "TX"}]"#,
        );
        let rows = records_from_payload(&p, Chamber::Senate, extract_politicians).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("first_name"), Some("John"));
        assert_eq!(rows[0].provenance, "json");
    }

    #[test]
    fn test_records_from_csv_payload() {
        let p = payload("https://x/all.csv", "text/csv", "senator,date,ticker\nJohn Roe,2024-01-02,XOM\n");
        let rows = records_from_payload(&p, Chamber::Senate, extract).unwrap();
        assert_eq!(rows[0].get("senator"), Some("John Roe"));
        assert_eq!(rows[0].provenance, "csv");
    }

    #[test]
    fn test_records_from_html_payload() {
        let p = payload(
            "https://x/trades",
            "text/html; charset=utf-8",
            "<table><tr><th>Name</th><th>Date</th><th>Ticker</th></tr>\
             <tr><td>Jane Doe</td><td>2024-01-02</td><td>AAPL</td></tr></table>",
        );
        let rows = records_from_payload(&p, Chamber::House, extract).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].provenance, "table");
    }

    #[test]
    fn test_mixed_chamber_page_keeps_own_rows() {
        let p = payload(
            "https://www.capitoltrades.com/trades",
            "text/html",
            "<table><tr><th>Politician</th><th>Chamber</th><th>Traded</th><th>Ticker</th></tr>\
             <tr><td>Jane Doe</td><td>House</td><td>2024-01-10</td><td>AAPL</td></tr>\
             <tr><td>John Roe</td><td>Senate</td><td>2024-01-11</td><td>XOM</td></tr>\
             <tr><td>Ann Poe</td><td></td><td>2024-01-12</td><td>MSFT</td></tr></table>",
        );
        let rows = records_from_payload(&p, Chamber::House, extract).unwrap();
        assert_eq!(rows.len(), 3);

        let house = retain_chamber(rows.clone(), Chamber::House);
        let names: Vec<_> = house.iter().filter_map(|r| r.get("politician")).collect();
        assert_eq!(names, ["Jane Doe", "Ann Poe"]);

        let senate = retain_chamber(rows, Chamber::Senate);
        assert_eq!(senate.len(), 2);
        assert_eq!(senate[0].get("politician"), Some("John Roe"));
    }
}
