//! Ticker resolution: free text → exchange symbol.
//!
//! Pattern heuristics run first on the raw ticker text, then on the asset
//! description; the company-name table is only consulted when both miss.

use regex::Regex;
use std::sync::LazyLock;

/// Short capitalised words that look like symbols but almost never are.
pub const STOP_WORDS: &[&str] = &[
    "A", "I", "AM", "PM", "AN", "AS", "AT", "BE", "BY", "GO", "IF", "IN", "IS", "IT", "NO",
    "OF", "ON", "OR", "TO", "UP", "US", "WE",
];

/// Inputs shorter than this never take part in substring matching.
const MIN_SUBSTRING_LEN: usize = 4;

/// Ordered company-name → symbol table. Earlier entries win substring ties.
pub const COMPANY_TICKERS: &[(&str, &str)] = &[
    // Tech
    ("Apple", "AAPL"),
    ("Apple Inc", "AAPL"),
    ("Microsoft", "MSFT"),
    ("Microsoft Corporation", "MSFT"),
    ("Amazon", "AMZN"),
    ("Amazon.com", "AMZN"),
    ("Amazon.com Inc", "AMZN"),
    ("Alphabet", "GOOGL"),
    ("Alphabet Inc", "GOOGL"),
    ("Google", "GOOGL"),
    ("Meta", "META"),
    ("Meta Platforms", "META"),
    ("Facebook", "META"),
    ("Tesla", "TSLA"),
    ("Tesla Inc", "TSLA"),
    // Financials
    ("JPMorgan", "JPM"),
    ("JPMorgan Chase", "JPM"),
    ("JPMorgan Chase & Co", "JPM"),
    ("Bank of America", "BAC"),
    ("Bank of America Corporation", "BAC"),
    ("Goldman Sachs", "GS"),
    ("Goldman Sachs Group", "GS"),
    ("Visa", "V"),
    ("Visa Inc", "V"),
    ("Mastercard", "MA"),
    ("Mastercard Inc", "MA"),
    // Healthcare
    ("Johnson & Johnson", "JNJ"),
    ("Pfizer", "PFE"),
    ("Pfizer Inc", "PFE"),
    ("UnitedHealth", "UNH"),
    ("UnitedHealth Group", "UNH"),
    ("Merck", "MRK"),
    ("Merck & Co", "MRK"),
    ("Abbott Laboratories", "ABT"),
    ("Moderna", "MRNA"),
    ("GlaxoSmithKline", "GSK"),
    ("GlaxoSmithKline PLC", "GSK"),
    // Consumer
    ("Coca-Cola", "KO"),
    ("Coca-Cola Company", "KO"),
    ("PepsiCo", "PEP"),
    ("PepsiCo Inc", "PEP"),
    ("Walmart", "WMT"),
    ("Walmart Inc", "WMT"),
    ("Procter & Gamble", "PG"),
    ("Nike", "NKE"),
    ("Nike Inc", "NKE"),
    ("McDonald's", "MCD"),
    ("McDonald's Corporation", "MCD"),
    ("Altria Group", "MO"),
    ("Altria Group Inc", "MO"),
    ("Walt Disney", "DIS"),
    ("Walt Disney Company", "DIS"),
    ("Disney", "DIS"),
    ("Netflix", "NFLX"),
    ("Netflix Inc", "NFLX"),
    ("Alibaba", "BABA"),
    ("Alibaba Group", "BABA"),
    // Energy
    ("Exxon Mobil", "XOM"),
    ("Exxon Mobil Corporation", "XOM"),
    ("Chevron", "CVX"),
    ("Chevron Corporation", "CVX"),
    ("ConocoPhillips", "COP"),
    ("Duke Energy", "DUK"),
    ("Duke Energy Corporation", "DUK"),
    // Telecom
    ("AT&T", "T"),
    ("AT&T Inc", "T"),
    ("Verizon", "VZ"),
    ("Verizon Communications", "VZ"),
    ("T-Mobile", "TMUS"),
    ("T-Mobile US", "TMUS"),
    // REITs
    ("American Tower", "AMT"),
    ("American Tower Corporation", "AMT"),
    ("Crown Castle", "CCI"),
    ("Crown Castle Inc", "CCI"),
    ("Prologis", "PLD"),
    ("Prologis Inc", "PLD"),
    // Semiconductors
    ("NVIDIA", "NVDA"),
    ("NVIDIA Corporation", "NVDA"),
    ("Intel", "INTC"),
    ("Intel Corporation", "INTC"),
    ("Advanced Micro Devices", "AMD"),
    // Aerospace & defence
    ("Boeing", "BA"),
    ("Boeing Company", "BA"),
    ("Lockheed Martin", "LMT"),
    ("Lockheed Martin Corporation", "LMT"),
    ("Raytheon", "RTX"),
    ("Raytheon Technologies", "RTX"),
    ("Palantir", "PLTR"),
    ("Palantir Technologies", "PLTR"),
];

static PAREN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([A-Z]{1,5})\)").expect("paren ticker regex"));
static STANDALONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z]{1,5}\b").expect("standalone ticker regex"));
static LABELED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)ticker:\s*([A-Z]{1,5})\b").expect("labeled ticker regex"));
static WHOLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{1,5}$").expect("whole ticker regex"));

pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

/// Resolve a ticker from raw ticker text and an optional asset description.
/// Returns an empty string when nothing matches.
pub fn resolve(candidate: &str, asset_description: Option<&str>) -> String {
    if let Some(t) = extract_symbol(candidate) {
        return t;
    }
    if let Some(t) = asset_description.and_then(extract_symbol) {
        return t;
    }
    if let Some(t) = lookup_company(candidate) {
        return t.to_string();
    }
    asset_description
        .and_then(lookup_company)
        .map(str::to_string)
        .unwrap_or_default()
}

/// Pattern-based extraction only (no company table).
pub fn extract_symbol(text: &str) -> Option<String> {
    if text.trim().is_empty() {
        return None;
    }

    if let Some(sym) = PAREN_RE
        .captures_iter(text)
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str())
        .find(|tok| !is_stop_word(tok))
    {
        return Some(sym.to_string());
    }

    if let Some(m) = STANDALONE_RE
        .find_iter(text)
        .map(|m| m.as_str())
        .find(|tok| !is_stop_word(tok))
    {
        return Some(m.to_string());
    }

    if let Some(cap) = LABELED_RE.captures(text) {
        return Some(cap[1].to_uppercase());
    }

    let trimmed = text.trim();
    if WHOLE_RE.is_match(trimmed) && !is_stop_word(trimmed) {
        return Some(trimmed.to_string());
    }

    None
}

/// Company table lookup: exact trimmed match, then substring either way.
pub fn lookup_company(name: &str) -> Option<&'static str> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    if let Some((_, t)) = COMPANY_TICKERS.iter().find(|(n, _)| *n == name) {
        return Some(t);
    }

    if name.chars().count() < MIN_SUBSTRING_LEN {
        return None;
    }

    let lower = name.to_lowercase();
    COMPANY_TICKERS
        .iter()
        .find(|(n, _)| {
            let n = n.to_lowercase();
            lower.contains(&n) || n.contains(&lower)
        })
        .map(|(_, t)| *t)
}

/// Any uppercase 1–5-letter token that is not a stop word.
pub fn first_symbol_like_token(text: &str) -> Option<String> {
    STANDALONE_RE
        .find_iter(text)
        .map(|m| m.as_str())
        .find(|tok| !is_stop_word(tok))
        .map(str::to_string)
}
