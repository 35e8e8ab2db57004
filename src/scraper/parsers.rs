//! Document extraction: HTML/CSV/JSON payloads → raw field dictionaries.
//!
//! HTML goes through three strategies in order (table, card, generic text)
//! and stops at the first one that yields a usable row. Everything that is
//! tied to a particular site's markup lives in the `Layout` tables below.

use crate::models::{Chamber, RawRecord};
use crate::scraper::error::FetchResult;
use crate::scraper::tickers::first_symbol_like_token;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{LazyLock, OnceLock};
use tracing::{debug, warn};
use url::Url;

// ── Fields & layouts ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Politician,
    Chamber,
    Date,
    Ticker,
    Asset,
    Type,
    Amount,
    Comment,
    State,
    Party,
    District,
}

impl Field {
    /// Canonical raw key written into `RawRecord::fields`.
    pub fn key(&self) -> &'static str {
        match self {
            Field::Politician => "politician",
            Field::Chamber => "chamber",
            Field::Date => "transaction_date",
            Field::Ticker => "ticker",
            Field::Asset => "asset_description",
            Field::Type => "transaction_type",
            Field::Amount => "amount",
            Field::Comment => "comment",
            Field::State => "state",
            Field::Party => "party",
            Field::District => "district",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Table,
    Card,
    Generic,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Table => "table",
            Strategy::Card => "card",
            Strategy::Generic => "generic",
        }
    }
}

/// Site-specific keyword tables for one kind of record.
pub struct Layout {
    pub name: &'static str,
    /// Header keywords, checked in order. `None` marks headers to ignore.
    pub headers: &'static [(Option<Field>, &'static [&'static str])],
    /// Card containers carry a class whose last `-`/`_` segment is one of these.
    pub card_hints: &'static [&'static str],
    /// Class-attribute keywords for fields inside a card.
    pub classes: &'static [(Field, &'static [&'static str])],
    /// `Label: value` labels for free text.
    pub labels: &'static [(Field, &'static [&'static str])],
    /// A row is usable when any of these is non-empty.
    pub key_fields: &'static [Field],
    /// A strategy whose rows all lack this field gives way to the next one.
    pub primary: Field,
    /// Scan free text for a symbol-like token when no ticker was labelled.
    pub symbol_fallback: bool,
    label_res: OnceLock<Vec<(Field, Regex)>>,
}

impl Layout {
    fn label_patterns(&self) -> &[(Field, Regex)] {
        self.label_res.get_or_init(|| {
            self.labels
                .iter()
                .filter_map(|(field, labels)| {
                    let alts = labels.iter().map(|l| regex::escape(l)).collect::<Vec<_>>().join("|");
                    // Value may sit on the same line or on the line right after the label.
                    let pattern = format!(
                        r"(?im)^[ \t]*(?:{})[ \t]*:[ \t]*(?:\r?\n[ \t]*)?([^\r\n]+?)[ \t]*$",
                        alts
                    );
                    Regex::new(&pattern).ok().map(|re| (*field, re))
                })
                .collect()
        })
    }

    fn header_field(&self, header: &str) -> Option<Field> {
        let header = header.to_lowercase();
        self.headers
            .iter()
            .find(|(_, kws)| kws.iter().any(|k| header.contains(k)))
            .and_then(|(field, _)| *field)
    }

    fn is_usable(&self, raw: &RawRecord) -> bool {
        self.key_fields.iter().any(|f| raw.get(f.key()).is_some())
    }

    fn has_primary(&self, rows: &[RawRecord]) -> bool {
        rows.iter().any(|raw| raw.get(self.primary.key()).is_some())
    }
}

pub static TRADE_LAYOUT: Layout = Layout {
    name: "trades",
    headers: &[
        (None, &["disclosure", "filed", "filing", "published", "reported", "notification"]),
        (Some(Field::Chamber), &["chamber"]),
        (Some(Field::Asset), &["asset", "description", "company", "issuer", "security"]),
        (Some(Field::Date), &["date", "traded"]),
        (Some(Field::Ticker), &["ticker", "symbol"]),
        (Some(Field::Politician), &["politician", "representative", "senator", "member", "name"]),
        (Some(Field::Type), &["type", "transaction"]),
        (Some(Field::Amount), &["amount", "value", "range", "size"]),
        (Some(Field::Comment), &["comment", "note"]),
    ],
    card_hints: &["trade", "card"],
    classes: &[
        (Field::Politician, &["politician", "representative", "senator", "member", "name"]),
        (Field::Chamber, &["chamber"]),
        (Field::Date, &["date"]),
        (Field::Ticker, &["ticker", "symbol"]),
        (Field::Asset, &["asset", "company", "issuer", "description"]),
        (Field::Type, &["type", "transaction"]),
        (Field::Amount, &["amount", "value", "range"]),
        (Field::Comment, &["comment", "note"]),
    ],
    labels: &[
        (Field::Politician, &["politician", "representative", "senator", "member", "name"]),
        (Field::Chamber, &["chamber"]),
        (Field::Date, &["transaction date", "trade date", "traded", "date"]),
        (Field::Ticker, &["ticker", "symbol"]),
        (Field::Asset, &["asset description", "asset", "company", "description"]),
        (Field::Type, &["transaction type", "type", "transaction"]),
        (Field::Amount, &["amount", "value", "range"]),
        (Field::Comment, &["comment", "notes", "note"]),
    ],
    key_fields: &[Field::Politician, Field::Date],
    primary: Field::Politician,
    symbol_fallback: true,
    label_res: OnceLock::new(),
};

pub static POLITICIAN_LAYOUT: Layout = Layout {
    name: "politicians",
    headers: &[
        (Some(Field::Party), &["party", "affiliation"]),
        (Some(Field::District), &["district"]),
        (Some(Field::State), &["state"]),
        (Some(Field::Politician), &["name", "politician", "representative", "senator", "member"]),
    ],
    card_hints: &["politician", "member", "card"],
    classes: &[
        (Field::Politician, &["name"]),
        (Field::Party, &["party"]),
        (Field::District, &["district"]),
        (Field::State, &["state"]),
    ],
    labels: &[
        (Field::Politician, &["name", "politician", "representative", "senator"]),
        (Field::Party, &["party"]),
        (Field::District, &["district"]),
        (Field::State, &["state"]),
    ],
    key_fields: &[Field::Politician],
    primary: Field::Politician,
    symbol_fallback: false,
    label_res: OnceLock::new(),
};

// ── Selectors & patterns ──────────────────────────────────────────────────────

fn selector(s: &str) -> Selector {
    Selector::parse(s).unwrap_or_else(|e| panic!("invalid built-in selector {:?}: {:?}", s, e))
}

static TABLE_SEL: LazyLock<Selector> = LazyLock::new(|| selector("table"));
static TR_SEL: LazyLock<Selector> = LazyLock::new(|| selector("tr"));
static CELL_SEL: LazyLock<Selector> = LazyLock::new(|| selector("th, td"));
static TH_SEL: LazyLock<Selector> = LazyLock::new(|| selector("th"));
static CLASSED_SEL: LazyLock<Selector> = LazyLock::new(|| selector("[class]"));
static ANCHOR_SEL: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"h1, h2, h3, h4, h5, h6, [class*="title"]"#));

static SECTION_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)\n[ \t]*\n|^[ \t]*(?:-{3,}|\*{3,}|={3,}|_{3,})[ \t]*$")
        .expect("section split regex")
});
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex"));
static LABEL_LIKE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z ]{0,30}:").expect("label regex"));

/// Sections shorter than this are navigation chrome, not records.
const MIN_SECTION_LEN: usize = 30;

/// Table rows with fewer cells are spacers or sub-headers.
const MIN_ROW_CELLS: usize = 3;

/// Elements that start a new text section in the generic strategy.
const SECTION_TAGS: &[&str] = &[
    "div", "section", "article", "li", "tr", "hr", "table", "header", "footer", "h1", "h2", "h3",
    "h4",
];

fn collapse_ws(s: &str) -> String {
    WS_RE.replace_all(s.trim(), " ").into_owned()
}

fn element_text(el: &ElementRef) -> String {
    collapse_ws(&el.text().collect::<Vec<_>>().join(" "))
}

// ── HTML entry points ─────────────────────────────────────────────────────────

/// A document extractor for one kind of record.
pub type Extractor = fn(&Html, Chamber) -> Vec<RawRecord>;

/// Extract trade rows from a parsed document.
pub fn extract(doc: &Html, chamber: Chamber) -> Vec<RawRecord> {
    extract_with(doc, chamber, &TRADE_LAYOUT)
}

/// Extract member roster rows from a parsed document.
pub fn extract_politicians(doc: &Html, chamber: Chamber) -> Vec<RawRecord> {
    extract_with(doc, chamber, &POLITICIAN_LAYOUT)
}

/// Run table → card → generic and return the first result that names its
/// primary field. Failing that, the first non-empty result.
pub fn extract_with(doc: &Html, chamber: Chamber, layout: &Layout) -> Vec<RawRecord> {
    let mut fallback: Option<(Strategy, Vec<RawRecord>)> = None;

    for strategy in [Strategy::Table, Strategy::Card, Strategy::Generic] {
        let rows = match strategy {
            Strategy::Table => extract_table(doc, chamber, layout),
            Strategy::Card => extract_cards(doc, chamber, layout),
            Strategy::Generic => extract_generic(doc, chamber, layout),
        };
        if rows.is_empty() {
            continue;
        }
        if layout.has_primary(&rows) {
            debug!("{} {}: {} rows via {} strategy", chamber, layout.name, rows.len(), strategy.as_str());
            return rows;
        }
        debug!(
            "{} {}: {} strategy rows lack a {}, trying the next",
            chamber,
            layout.name,
            strategy.as_str(),
            layout.primary.key()
        );
        fallback.get_or_insert((strategy, rows));
    }

    match fallback {
        Some((strategy, rows)) => {
            debug!("{} {}: {} partial rows via {} strategy", chamber, layout.name, rows.len(), strategy.as_str());
            rows
        }
        None => {
            debug!("{} {}: no strategy matched", chamber, layout.name);
            Vec::new()
        }
    }
}

/// Parse and extract in one go. Keeps the non-`Send` document off async stacks.
pub fn extract_html(html: &str, chamber: Chamber, extractor: Extractor) -> Vec<RawRecord> {
    let doc = Html::parse_document(html);
    extractor(&doc, chamber)
}

// ── Table strategy ────────────────────────────────────────────────────────────

/// The table with the most rows (at least a header and one data row).
fn largest_table(doc: &Html) -> Option<ElementRef<'_>> {
    let mut best: Option<(usize, ElementRef<'_>)> = None;
    for table in doc.select(&TABLE_SEL) {
        let n = table.select(&TR_SEL).count();
        if n >= 2 && best.as_ref().is_none_or(|(m, _)| n > *m) {
            best = Some((n, table));
        }
    }
    best.map(|(_, t)| t)
}

fn extract_table(doc: &Html, chamber: Chamber, layout: &Layout) -> Vec<RawRecord> {
    let Some(table) = largest_table(doc) else {
        return Vec::new();
    };

    let rows: Vec<ElementRef> = table.select(&TR_SEL).collect();
    let header_idx = rows
        .iter()
        .position(|tr| tr.select(&TH_SEL).next().is_some())
        .unwrap_or(0);

    let mut columns: Vec<(Field, usize)> = Vec::new();
    for (i, cell) in rows[header_idx].select(&CELL_SEL).enumerate() {
        if let Some(field) = layout.header_field(&element_text(&cell)) {
            if !columns.iter().any(|(f, _)| *f == field) {
                columns.push((field, i));
            }
        }
    }

    if columns.is_empty() {
        debug!("Largest table has no recognisable headers");
        return Vec::new();
    }

    rows.iter()
        .enumerate()
        .filter(|(i, _)| *i != header_idx)
        .filter_map(|(_, tr)| {
            let cells: Vec<String> = tr.select(&CELL_SEL).map(|c| element_text(&c)).collect();
            if cells.len() < MIN_ROW_CELLS {
                return None;
            }
            let mut raw = RawRecord::new(chamber, Strategy::Table.as_str());
            for (field, idx) in &columns {
                if let Some(value) = cells.get(*idx) {
                    raw.insert(field.key(), value);
                }
            }
            layout.is_usable(&raw).then_some(raw)
        })
        .collect()
}

// ── Card strategy ─────────────────────────────────────────────────────────────

fn class_matches(el: &ElementRef, keywords: &[&str]) -> bool {
    el.value().classes().any(|c| {
        let c = c.to_lowercase();
        keywords.iter().any(|k| c.contains(k))
    })
}

/// `trade-card` and `card` name a container; `card-title` and `card-body` do not.
fn is_card_container(el: &ElementRef, hints: &[&str]) -> bool {
    el.value().classes().any(|c| {
        let c = c.to_lowercase();
        let last = c.rsplit(['-', '_']).next().unwrap_or_default();
        hints.iter().any(|h| *h == last)
    })
}

fn is_field_element(el: &ElementRef, layout: &Layout) -> bool {
    layout.classes.iter().any(|(_, kws)| class_matches(el, kws))
}

fn find_cards<'a>(doc: &'a Html, layout: &Layout) -> Vec<ElementRef<'a>> {
    let hinted: Vec<ElementRef<'a>> = doc
        .select(&CLASSED_SEL)
        .filter(|el| is_card_container(el, layout.card_hints))
        .collect();
    let hinted_ids: HashSet<_> = hinted.iter().map(|el| el.id()).collect();

    // A hinted element nested in another one and carrying a field class is a field.
    let cards: Vec<ElementRef<'a>> = hinted
        .into_iter()
        .filter(|el| {
            !(is_field_element(el, layout) && el.ancestors().any(|a| hinted_ids.contains(&a.id())))
        })
        .collect();
    let card_ids: HashSet<_> = cards.iter().map(|el| el.id()).collect();

    // Keep innermost containers only.
    cards
        .into_iter()
        .filter(|el| !el.descendants().skip(1).any(|d| card_ids.contains(&d.id())))
        .collect()
}

fn extract_cards(doc: &Html, chamber: Chamber, layout: &Layout) -> Vec<RawRecord> {
    find_cards(doc, layout)
        .into_iter()
        .filter_map(|card| {
            let mut raw = RawRecord::new(chamber, Strategy::Card.as_str());

            for (field, keywords) in layout.classes {
                let found = card
                    .select(&CLASSED_SEL)
                    .filter(|el| el.id() != card.id())
                    .find(|el| class_matches(el, keywords))
                    .map(|el| element_text(&el));
                if let Some(text) = found {
                    raw.insert(field.key(), text);
                }
            }

            let missing_key = layout.key_fields.iter().any(|f| raw.get(f.key()).is_none());
            if missing_key {
                let text = card.text().map(str::trim).filter(|t| !t.is_empty()).collect::<Vec<_>>().join("\n");
                fill_labeled(&mut raw, &text, layout);
            }

            // An unlabelled heading names the card's subject.
            if raw.get(layout.primary.key()).is_none() {
                let title = card
                    .select(&TITLE_SEL)
                    .filter(|el| el.id() != card.id())
                    .map(|el| element_text(&el))
                    .find(|t| !t.is_empty() && !t.contains(':'));
                if let Some(title) = title {
                    raw.insert(layout.primary.key(), title);
                }
            }

            layout.is_usable(&raw).then_some(raw)
        })
        .collect()
}

/// Fill fields that are still empty from `Label: value` lines. A value on the
/// line after an empty label is taken only if that line is not a label itself.
fn fill_labeled(raw: &mut RawRecord, text: &str, layout: &Layout) {
    for (field, re) in layout.label_patterns() {
        if raw.get(field.key()).is_some() {
            continue;
        }
        let value = re.captures_iter(text).find_map(|cap| {
            let value = cap[1].trim();
            let next_line = cap[0].contains('\n');
            (!(next_line && LABEL_LIKE_RE.is_match(value))).then(|| collapse_ws(value))
        });
        if let Some(value) = value {
            raw.insert(field.key(), value);
        }
    }
}

// ── Generic strategy ──────────────────────────────────────────────────────────

/// Visible document text with a blank line at every section boundary.
pub fn document_text(doc: &Html) -> String {
    let mut out = String::new();
    for node in doc.root_element().descendants() {
        match node.value() {
            Node::Element(el) if SECTION_TAGS.contains(&el.name()) => out.push('\n'),
            Node::Text(text) => {
                let hidden = node
                    .parent()
                    .and_then(|p| p.value().as_element().map(|e| e.name()))
                    .is_some_and(|name| matches!(name, "script" | "style" | "noscript" | "template"));
                let text = text.trim();
                if !hidden && !text.is_empty() {
                    out.push_str(text);
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
    out
}

fn extract_generic(doc: &Html, chamber: Chamber, layout: &Layout) -> Vec<RawRecord> {
    extract_text(&document_text(doc), chamber, layout)
}

/// Labeled-text extraction over free text split into sections.
pub fn extract_text(text: &str, chamber: Chamber, layout: &Layout) -> Vec<RawRecord> {
    SECTION_SPLIT_RE
        .split(text)
        .map(str::trim)
        .filter(|section| section.chars().count() >= MIN_SECTION_LEN)
        .filter_map(|section| {
            let mut raw = RawRecord::new(chamber, Strategy::Generic.as_str());
            fill_labeled(&mut raw, section, layout);
            if !layout.is_usable(&raw) {
                return None;
            }
            if layout.symbol_fallback && raw.get(Field::Ticker.key()).is_none() {
                if let Some(sym) = first_symbol_like_token(section) {
                    raw.insert(Field::Ticker.key(), sym);
                }
            }
            Some(raw)
        })
        .collect()
}

// ── Structured payloads ───────────────────────────────────────────────────────

/// `transactionDate` → `transaction_date`, `Asset Description` → `asset_description`.
pub fn canonical_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut prev_lower = false;
    for c in key.trim().chars() {
        if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else if c.is_alphanumeric() {
            out.push(c);
            prev_lower = true;
        } else {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            prev_lower = false;
        }
    }
    out.trim_end_matches('_').to_string()
}

const ARRAY_KEYS: &[&str] = &[
    "data", "trades", "transactions", "results", "representatives", "senators", "items",
];

/// JSON array of objects, or an object wrapping one.
pub fn parse_json_records(body: &str, chamber: Chamber) -> FetchResult<Vec<RawRecord>> {
    let value: Value = serde_json::from_str(body)?;

    let items: Vec<&Value> = match &value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => {
            let nested = ARRAY_KEYS
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_array))
                .or_else(|| map.values().find_map(Value::as_array));
            match nested {
                Some(items) => items.iter().collect(),
                None => vec![&value],
            }
        }
        _ => Vec::new(),
    };

    Ok(items
        .into_iter()
        .filter_map(Value::as_object)
        .map(|obj| {
            let mut raw = RawRecord::new(chamber, "json");
            for (k, v) in obj {
                let text = match v {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => continue,
                };
                raw.insert(canonical_key(k), text);
            }
            raw
        })
        .filter(|raw| !raw.is_empty())
        .collect())
}

/// CSV with a header row. Malformed rows are skipped.
pub fn parse_csv_records(body: &str, chamber: Chamber) -> FetchResult<Vec<RawRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(canonical_key).collect();
    let mut out = Vec::new();

    for (i, result) in reader.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("CSV row {}: {}", i + 1, e);
                continue;
            }
        };
        let mut raw = RawRecord::new(chamber, "csv");
        for (key, value) in headers.iter().zip(record.iter()) {
            if !key.is_empty() {
                raw.insert(key.clone(), value);
            }
        }
        if !raw.is_empty() {
            out.push(raw);
        }
    }

    Ok(out)
}

// ── Download links ────────────────────────────────────────────────────────────

/// Links that look like bulk data exports, resolved against `base`.
pub fn find_download_links(html: &str, base: &Url) -> Vec<Url> {
    let doc = Html::parse_document(html);
    let mut seen = HashSet::new();

    doc.select(&ANCHOR_SEL)
        .filter(|a| {
            let href = a.value().attr("href").unwrap_or_default().to_lowercase();
            let text = element_text(a).to_lowercase();
            href.contains(".csv")
                || href.contains(".json")
                || href.contains("download")
                || text.contains("download data")
        })
        .filter_map(|a| a.value().attr("href").and_then(|h| base.join(h).ok()))
        .filter(|u| seen.insert(u.clone()))
        .collect()
}
