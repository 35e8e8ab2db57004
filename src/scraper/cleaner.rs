use crate::models::{us_date, Chamber, Politician, RawRecord, Trade};
use crate::scraper::tickers;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

// ── Alias chains ──────────────────────────────────────────────────────────────

const POLITICIAN_KEYS: &[&str] = &["politician", "representative", "senator", "name", "member"];
const DATE_KEYS: &[&str] = &["transaction_date", "trade_date", "date", "traded"];
const TICKER_KEYS: &[&str] = &["ticker", "symbol"];
const ASSET_KEYS: &[&str] = &["asset_description", "asset", "description", "company"];
const TYPE_KEYS: &[&str] = &["transaction_type", "type", "transaction"];
const AMOUNT_KEYS: &[&str] = &["amount", "value", "range"];
const COMMENT_KEYS: &[&str] = &["comment", "notes", "note"];

const NAME_KEYS: &[&str] = &["name", "full_name", "politician", "representative", "senator", "member"];
const STATE_KEYS: &[&str] = &["state", "state_code"];
const PARTY_KEYS: &[&str] = &["party", "party_affiliation"];
const DISTRICT_KEYS: &[&str] = &["district", "state_district"];
const ID_KEYS: &[&str] = &["id", "bioguide_id"];

// ── Dates ─────────────────────────────────────────────────────────────────────

const NATIVE_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%B %d, %Y",
    "%b %d, %Y",
    "%b %d %Y",
    "%d %b %Y",
    "%d %B %Y",
];

const NATIVE_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

static US_SLASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").expect("slash date regex"));
static US_DASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})-(\d{1,2})-(\d{4})\b").expect("dash date regex"));
static ISO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").expect("iso date regex"));
static HOUSE_DISTRICT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z]{2})[- ]?(\d{1,2}|AL)$").expect("district regex"));

fn parse_native(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for fmt in NATIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    NATIVE_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

fn ymd(y: &str, m: &str, d: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?)
}

/// Whole-string formats first, then a date embedded anywhere in the text
/// (MM/DD/YYYY, MM-DD-YYYY, YYYY-MM-DD in that order).
pub fn parse_disclosure_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(d) = parse_native(s) {
        return Some(d);
    }
    if let Some(c) = US_SLASH_RE.captures(s) {
        if let Some(d) = ymd(&c[3], &c[1], &c[2]) {
            return Some(d);
        }
    }
    if let Some(c) = US_DASH_RE.captures(s) {
        if let Some(d) = ymd(&c[3], &c[1], &c[2]) {
            return Some(d);
        }
    }
    ISO_RE.captures(s).and_then(|c| ymd(&c[1], &c[2], &c[3]))
}

/// Canonical `MM/DD/YYYY`, or the input unchanged when it cannot be parsed.
pub fn normalize_date(s: &str) -> String {
    match parse_disclosure_date(s) {
        Some(d) => d.format(us_date::FORMAT).to_string(),
        None => s.to_string(),
    }
}

// ── Record normalization ──────────────────────────────────────────────────────

/// Canonical records built from raw dictionaries, with duplicate merging.
pub trait Record: Sized + Clone + Send + Sync + 'static {
    fn from_raw(raw: &RawRecord, seq: usize, scraped_at: DateTime<Utc>) -> Option<Self>;

    /// Records with equal keys describe the same real-world entry.
    fn merge_key(&self) -> String;

    /// Fill this record's empty fields from a duplicate.
    fn absorb(&mut self, other: &Self);

    fn chamber(&self) -> Chamber;
}

fn chamber_of(raw: &RawRecord) -> Option<Chamber> {
    raw.chamber
        .or_else(|| raw.get("chamber").and_then(|c| c.parse().ok()))
}

fn source_slug(raw: &RawRecord) -> &str {
    raw.provenance.split('/').next().filter(|s| !s.is_empty()).unwrap_or("raw")
}

fn text(raw: &RawRecord, aliases: &[&str]) -> String {
    raw.first_of(aliases).map(str::trim).unwrap_or_default().to_string()
}

const SYNTHETIC_ID_PREFIX: &str = "scraped-";

fn synthesized_id(raw: &RawRecord, chamber: Chamber, seq: usize) -> String {
    raw.first_of(ID_KEYS).map(str::to_string).unwrap_or_else(|| {
        format!("{}{}-{}-{}", SYNTHETIC_ID_PREFIX, chamber, source_slug(raw), seq)
    })
}

/// Raw dictionary → `Trade`, or `None` when politician or date is missing.
pub fn normalize_trade(raw: &RawRecord, seq: usize, scraped_at: DateTime<Utc>) -> Option<Trade> {
    let chamber = chamber_of(raw)?;

    let politician = text(raw, POLITICIAN_KEYS);
    if politician.is_empty() {
        debug!("Dropping {} row {}: no politician", raw.provenance, seq);
        return None;
    }

    let Some(transaction_date) = raw.first_of(DATE_KEYS).and_then(parse_disclosure_date) else {
        debug!("Dropping {} row {}: missing or unparseable date", raw.provenance, seq);
        return None;
    };

    let raw_ticker_text = text(raw, TICKER_KEYS);
    let asset_description = text(raw, ASSET_KEYS);
    let asset = (!asset_description.is_empty()).then_some(asset_description.as_str());
    let ticker = tickers::resolve(&raw_ticker_text, asset);

    let comment = raw.first_of(COMMENT_KEYS).map(|c| c.trim().to_string());

    Some(Trade {
        id: synthesized_id(raw, chamber, seq),
        chamber,
        politician,
        transaction_date,
        ticker,
        raw_ticker_text,
        asset_description,
        transaction_type: text(raw, TYPE_KEYS),
        amount: text(raw, AMOUNT_KEYS),
        comment,
        data_source: raw.provenance.clone(),
        scraped_at,
    })
}

/// Raw dictionary → `Politician`, or `None` when no name can be formed.
pub fn normalize_politician(raw: &RawRecord, seq: usize) -> Option<Politician> {
    let chamber = chamber_of(raw)?;

    let mut name = text(raw, NAME_KEYS);
    if name.is_empty() {
        name = [text(raw, &["first_name"]), text(raw, &["last_name"])]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
    }
    if name.is_empty() {
        debug!("Dropping {} politician row {}: no name", raw.provenance, seq);
        return None;
    }

    let mut state = text(raw, STATE_KEYS);
    let mut district = raw.first_of(DISTRICT_KEYS).map(|d| d.trim().to_string());

    // House feeds often pack both into one code, e.g. "CA12".
    if let Some(code) = district.clone() {
        if let Some(c) = HOUSE_DISTRICT_RE.captures(&code.to_uppercase()) {
            if state.is_empty() {
                state = c[1].to_string();
            }
            district = Some(c[2].to_string());
        }
    }

    Some(Politician {
        id: synthesized_id(raw, chamber, seq),
        name,
        state,
        party: text(raw, PARTY_KEYS),
        chamber,
        district: match chamber {
            Chamber::House => district,
            Chamber::Senate => None,
        },
        data_source: raw.provenance.clone(),
    })
}

impl Record for Trade {
    fn from_raw(raw: &RawRecord, seq: usize, scraped_at: DateTime<Utc>) -> Option<Self> {
        normalize_trade(raw, seq, scraped_at)
    }

    fn merge_key(&self) -> String {
        let instrument = if self.ticker.is_empty() {
            self.asset_description.to_lowercase()
        } else {
            self.ticker.clone()
        };
        // Distinct upstream ids are distinct line items, even with equal fields.
        let upstream = if self.id.starts_with(SYNTHETIC_ID_PREFIX) {
            ""
        } else {
            self.id.as_str()
        };
        format!(
            "{}|{}|{}|{}|{}|{}|{}",
            self.chamber,
            self.politician.to_lowercase(),
            self.transaction_date,
            instrument,
            self.transaction_type.to_lowercase(),
            self.amount,
            upstream
        )
    }

    fn absorb(&mut self, other: &Self) {
        fill(&mut self.ticker, &other.ticker);
        fill(&mut self.raw_ticker_text, &other.raw_ticker_text);
        fill(&mut self.asset_description, &other.asset_description);
        fill(&mut self.transaction_type, &other.transaction_type);
        fill(&mut self.amount, &other.amount);
        if self.comment.is_none() {
            self.comment = other.comment.clone();
        }
    }

    fn chamber(&self) -> Chamber {
        self.chamber
    }
}

impl Record for Politician {
    fn from_raw(raw: &RawRecord, seq: usize, _scraped_at: DateTime<Utc>) -> Option<Self> {
        normalize_politician(raw, seq)
    }

    fn merge_key(&self) -> String {
        format!("{}|{}", self.chamber, self.name.to_lowercase())
    }

    fn absorb(&mut self, other: &Self) {
        fill(&mut self.state, &other.state);
        fill(&mut self.party, &other.party);
        if self.district.is_none() {
            self.district = other.district.clone();
        }
    }

    fn chamber(&self) -> Chamber {
        self.chamber
    }
}

fn fill(slot: &mut String, other: &str) {
    if slot.is_empty() && !other.is_empty() {
        *slot = other.to_string();
    }
}

/// Collapse duplicates across sources, keeping the first occurrence's position.
pub fn dedupe<T: Record>(records: Vec<T>) -> Vec<T> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<T> = Vec::with_capacity(records.len());

    for record in records {
        let key = record.merge_key();
        match index.get(&key) {
            Some(&i) => out[i].absorb(&record),
            None => {
                index.insert(key, out.len());
                out.push(record);
            }
        }
    }
    out
}

/// Normalize every raw row of one source and drop invalid ones. Rows of a
/// single source are never merged with each other.
pub fn normalize_all<T: Record>(raws: &[RawRecord], scraped_at: DateTime<Utc>) -> Vec<T> {
    raws.iter()
        .enumerate()
        .filter_map(|(i, raw)| T::from_raw(raw, i, scraped_at))
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::parsers;

    fn raw(pairs: &[(&str, &str)]) -> RawRecord {
        let mut r = RawRecord::new(Chamber::House, "test-source/table");
        for (k, v) in pairs {
            r.insert(*k, *v);
        }
        r
    }

    #[test]
    fn test_normalize_date_formats() {
        assert_eq!(normalize_date("2024-01-15"), "01/15/2024");
        assert_eq!(normalize_date("1/5/2024"), "01/05/2024");
        assert_eq!(normalize_date("02-03-2024"), "02/03/2024");
        assert_eq!(normalize_date("March 4, 2024"), "03/04/2024");
        assert_eq!(normalize_date("2024-01-15T13:45:00Z"), "01/15/2024");
        assert_eq!(normalize_date("Filed on 12/31/2023 (late)"), "12/31/2023");
        assert_eq!(normalize_date("not a date"), "not a date");
        assert_eq!(normalize_date("13/45/2024"), "13/45/2024");
    }

    #[test]
    fn test_normalize_date_idempotent() {
        for s in ["01/15/2024", "12/31/1999", "02/29/2024"] {
            assert_eq!(normalize_date(s), s);
            assert_eq!(normalize_date(&normalize_date(s)), s);
        }
    }

    #[test]
    fn test_missing_politician_is_discarded() {
        let now = Utc::now();
        assert!(normalize_trade(&raw(&[("transaction_date", "2024-01-15")]), 0, now).is_none());
        assert!(normalize_trade(&raw(&[("politician", "  "), ("date", "2024-01-15")]), 0, now).is_none());
    }

    #[test]
    fn test_bad_date_is_discarded() {
        let now = Utc::now();
        assert!(normalize_trade(&raw(&[("politician", "Jane Doe")]), 0, now).is_none());
        assert!(normalize_trade(&raw(&[("politician", "Jane Doe"), ("date", "soon")]), 0, now).is_none());
        assert!(normalize_trade(&raw(&[("politician", "Jane Doe"), ("date", "02/30/2024")]), 0, now).is_none());
    }

    #[test]
    fn test_alias_chains_and_ticker_resolution() {
        let now = Utc::now();
        let r = raw(&[
            ("representative", "Hon. Jane Doe"),
            ("transaction_date", "2024-01-15"),
            ("ticker", "--"),
            ("asset", "Apple Inc"),
            ("type", "purchase"),
            ("value", "$1,001 - $15,000"),
            ("notes", "Subholding of: Brokerage"),
        ]);
        let t = normalize_trade(&r, 7, now).unwrap();
        assert_eq!(t.politician, "Hon. Jane Doe");
        assert_eq!(t.transaction_date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(t.ticker, "AAPL");
        assert_eq!(t.raw_ticker_text, "--");
        assert_eq!(t.asset_description, "Apple Inc");
        assert_eq!(t.transaction_type, "purchase");
        assert_eq!(t.amount, "$1,001 - $15,000");
        assert_eq!(t.comment.as_deref(), Some("Subholding of: Brokerage"));
        assert_eq!(t.id, "scraped-house-test-source-7");
        assert_eq!(t.data_source, "test-source/table");
    }

    #[test]
    fn test_upstream_id_is_kept() {
        let r = raw(&[("id", "abc-1"), ("senator", "John Roe"), ("date", "01/02/2024")]);
        let t = normalize_trade(&r, 0, Utc::now()).unwrap();
        assert_eq!(t.id, "abc-1");
    }

    #[test]
    fn test_table_to_trades_pipeline() {
        let html = r#"<table>
            <tr><th>Name</th><th>Transaction Date</th><th>Ticker</th><th>Asset</th><th>Type</th></tr>
            <tr><td>Nancy Pelosi</td><td>2024-01-15</td><td>NVDA</td><td>NVIDIA Corporation</td><td>Purchase</td></tr>
            <tr><td>Dan Crenshaw</td><td>01/20/2024</td><td>--</td><td>Apple Inc</td><td>Sale</td></tr>
            <tr><td>Ro Khanna</td><td>02-03-2024</td><td>(MSFT)</td><td>Microsoft Corp</td><td>Sale (Partial)</td></tr>
            <tr><td>Josh Gottheimer</td><td>March 4, 2024</td><td></td><td>Tesla Inc</td><td>Exchange</td></tr>
        </table>"#;
        let raws = parsers::extract_html(html, Chamber::House, parsers::extract);
        let trades: Vec<Trade> = normalize_all(&raws, Utc::now());

        assert_eq!(trades.len(), 4);
        let tickers: Vec<&str> = trades.iter().map(|t| t.ticker.as_str()).collect();
        assert_eq!(tickers, ["NVDA", "AAPL", "MSFT", "TSLA"]);
        assert_eq!(trades[2].transaction_type, "Sale (Partial)");
        assert_eq!(trades[3].transaction_date, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        assert!(trades.iter().all(|t| t.chamber == Chamber::House && !t.politician.is_empty()));
    }

    #[test]
    fn test_dedupe_merges_missing_fields() {
        let now = Utc::now();
        let a = normalize_trade(
            &raw(&[("politician", "Jane Doe"), ("date", "2024-01-15"), ("ticker", "AAPL"), ("type", "purchase")]),
            0,
            now,
        )
        .unwrap();
        let b = normalize_trade(
            &raw(&[
                ("politician", "JANE DOE"),
                ("date", "01/15/2024"),
                ("ticker", "AAPL"),
                ("type", "Purchase"),
                ("comment", "spouse"),
            ]),
            1,
            now,
        )
        .unwrap();
        let c = normalize_trade(&raw(&[("politician", "John Roe"), ("date", "2024-01-15")]), 2, now).unwrap();

        let merged = dedupe(vec![a, b, c]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].politician, "Jane Doe");
        assert_eq!(merged[0].comment.as_deref(), Some("spouse"));
        assert_eq!(merged[1].politician, "John Roe");
    }

    #[test]
    fn test_distinct_upstream_ids_survive() {
        let now = Utc::now();
        let line = |id: &str| {
            raw(&[
                ("id", id),
                ("politician", "Jane Doe"),
                ("date", "2024-01-15"),
                ("ticker", "AAPL"),
                ("type", "purchase"),
                ("amount", "$1,001 - $15,000"),
            ])
        };
        let trades: Vec<Trade> = normalize_all(&[line("tx-1"), line("tx-2")], now);
        assert_eq!(trades.len(), 2);

        let ids: Vec<String> = dedupe(trades).into_iter().map(|t| t.id).collect();
        assert_eq!(ids, ["tx-1", "tx-2"]);
    }

    #[test]
    fn test_identical_rows_of_one_source_are_kept() {
        let row = raw(&[("politician", "Jane Doe"), ("date", "2024-01-15"), ("ticker", "MSFT")]);
        let trades: Vec<Trade> = normalize_all(&[row.clone(), row], Utc::now());
        assert_eq!(trades.len(), 2);
        assert_ne!(trades[0].id, trades[1].id);
    }

    #[test]
    fn test_normalize_politician() {
        let mut r = RawRecord::new(Chamber::House, "house-api/json");
        r.insert("first_name", "Jane");
        r.insert("last_name", "Doe");
        r.insert("district", "CA12");
        r.insert("party", "Democrat");
        let p = normalize_politician(&r, 3).unwrap();
        assert_eq!(p.name, "Jane Doe");
        assert_eq!(p.state, "CA");
        assert_eq!(p.district.as_deref(), Some("12"));
        assert_eq!(p.id, "scraped-house-house-api-3");

        let mut s = RawRecord::new(Chamber::Senate, "senate-api/json");
        s.insert("senator", "John Roe");
        s.insert("state", "TX");
        s.insert("district", "AL");
        let p = normalize_politician(&s, 0).unwrap();
        assert_eq!(p.name, "John Roe");
        assert_eq!(p.district, None);

        assert!(normalize_politician(&RawRecord::new(Chamber::House, "x"), 0).is_none());
    }
}
