use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ── Chamber ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Chamber {
    House,
    Senate,
}

impl Chamber {
    pub fn as_str(&self) -> &'static str {
        match self {
            Chamber::House => "house",
            Chamber::Senate => "senate",
        }
    }
}

impl fmt::Display for Chamber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chamber {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "house" | "representatives" | "rep" => Ok(Chamber::House),
            "senate" | "senators" | "sen" => Ok(Chamber::Senate),
            other => Err(format!("unknown chamber '{}'", other)),
        }
    }
}

// ── Trade ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: String,
    pub chamber: Chamber,
    pub politician: String,
    #[serde(with = "us_date")]
    pub transaction_date: NaiveDate,
    pub ticker: String,
    pub raw_ticker_text: String,
    pub asset_description: String,
    pub transaction_type: String,
    pub amount: String,
    pub comment: Option<String>,
    pub data_source: String,
    pub scraped_at: DateTime<Utc>,
}

// ── Politician ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Politician {
    pub id: String,
    pub name: String,
    pub state: String,
    pub party: String,
    pub chamber: Chamber,
    pub district: Option<String>,
    pub data_source: String,
}

// ── Raw field dictionary ──────────────────────────────────────────────────────

/// One extracted row before normalization. Keys are canonical snake_case.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub chamber: Option<Chamber>,
    pub provenance: String,
    pub fields: BTreeMap<String, String>,
}

impl RawRecord {
    pub fn new(chamber: Chamber, provenance: impl Into<String>) -> Self {
        Self {
            chamber: Some(chamber),
            provenance: provenance.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Stores `value` trimmed; empty values are not stored.
    pub fn insert(&mut self, key: impl Into<String>, value: impl AsRef<str>) {
        let value = value.as_ref().trim();
        if !value.is_empty() {
            self.fields.insert(key.into(), value.to_string());
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(|s| s.as_str())
    }

    /// First non-empty value among `aliases`.
    pub fn first_of(&self, aliases: &[&str]) -> Option<&str> {
        aliases
            .iter()
            .filter_map(|k| self.get(k))
            .find(|v| !v.trim().is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Prefixes the provenance with the name of the source that fetched it.
    pub fn with_source(mut self, source: &str) -> Self {
        self.provenance = if self.provenance.is_empty() {
            source.to_string()
        } else {
            format!("{}/{}", source, self.provenance)
        };
        self
    }
}

// ── Dataset envelope ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Dataset<T> {
    pub records: Vec<T>,
    pub fetched_at: DateTime<Utc>,
    pub source_used: String,
}

impl<T> Dataset<T> {
    pub fn empty(fetched_at: DateTime<Utc>) -> Self {
        Self {
            records: Vec::new(),
            fetched_at,
            source_used: "none".to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ── Market quote ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub ticker: String,
    pub company_name: Option<String>,
    pub current_price: Option<f64>,
    pub previous_close: Option<f64>,
    pub open: Option<f64>,
    pub day_high: Option<f64>,
    pub day_low: Option<f64>,
    pub volume: Option<i64>,
    pub market_cap: Option<f64>,
    pub change: Option<f64>,
    pub change_percent: Option<f64>,
    pub exchange: Option<String>,
    pub data_source: String,
    pub last_updated: DateTime<Utc>,
}

/// Serializes dates as zero-padded `MM/DD/YYYY`.
pub mod us_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%m/%d/%Y";

    pub fn serialize<S: Serializer>(date: &NaiveDate, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&date.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDate, D::Error> {
        let s = String::deserialize(d)?;
        NaiveDate::parse_from_str(&s, FORMAT).map_err(serde::de::Error::custom)
    }
}
