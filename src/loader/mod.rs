//! Offline extraction of a saved disclosure page or export.
//!
//! Accepts the same payload kinds the live sources see (HTML, CSV, JSON) and
//! runs them through extraction and normalization without touching the network.

use crate::models::{Chamber, Dataset, Politician, RawRecord, Trade};
use crate::scraper::cleaner::normalize_all;
use crate::scraper::http_client::Payload;
use crate::scraper::parsers::{extract, extract_politicians, Extractor};
use crate::scraper::records_from_payload;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::{debug, info};

fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("json") => "application/json",
        Some("csv") => "text/csv",
        _ => "text/html",
    }
}

/// Source tag used for records read from `path`, e.g. `file:house_ptr.html`.
pub fn source_name(path: &Path) -> String {
    let file = path
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("unknown");
    format!("file:{}", file)
}

pub fn load_raw(path: &Path, chamber: Chamber, extractor: Extractor) -> Result<Vec<RawRecord>> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {:?}", path))?;

    let payload = Payload {
        url: path.display().to_string(),
        content_type: content_type_for(path).to_string(),
        body,
    };
    debug!("Loading {:?} as {}", path, payload.content_type);

    let source = source_name(path);
    let rows = records_from_payload(&payload, chamber, extractor)
        .with_context(|| format!("Failed to decode {:?}", path))?;

    Ok(rows.into_iter().map(|r| r.with_source(&source)).collect())
}

fn into_dataset<T>(records: Vec<T>, path: &Path, now: DateTime<Utc>) -> Dataset<T> {
    if records.is_empty() {
        return Dataset::empty(now);
    }
    Dataset {
        records,
        fetched_at: now,
        source_used: source_name(path),
    }
}

pub fn load_trades(path: &Path, chamber: Chamber, now: DateTime<Utc>) -> Result<Dataset<Trade>> {
    let raws = load_raw(path, chamber, extract)?;
    let trades: Vec<Trade> = normalize_all(&raws, now);
    info!("{:?}: {} trades from {} rows", path, trades.len(), raws.len());
    Ok(into_dataset(trades, path, now))
}

pub fn load_politicians(
    path: &Path,
    chamber: Chamber,
    now: DateTime<Utc>,
) -> Result<Dataset<Politician>> {
    let raws = load_raw(path, chamber, extract_politicians)?;
    let members: Vec<Politician> = normalize_all(&raws, now);
    info!("{:?}: {} politicians from {} rows", path, members.len(), raws.len());
    Ok(into_dataset(members, path, now))
}
