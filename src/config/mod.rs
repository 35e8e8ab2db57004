use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub quotes: QuotesConfig,
}

/// HTTP behaviour shared by every upstream request
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Upstream locations and the per-source time budget
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourcesConfig {
    #[serde(default = "default_house_url")]
    pub house_base_url: String,

    #[serde(default = "default_senate_url")]
    pub senate_base_url: String,

    #[serde(default = "default_capitol_trades_url")]
    pub capitol_trades_url: String,

    #[serde(default = "default_source_timeout_secs")]
    pub source_timeout_secs: u64,
}

/// Freshness windows
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_dataset_window_mins")]
    pub trades_window_mins: i64,

    #[serde(default = "default_dataset_window_mins")]
    pub politicians_window_mins: i64,

    #[serde(default = "default_quotes_window_hours")]
    pub quotes_window_hours: i64,
}

/// Market-data provider credentials
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QuotesConfig {
    #[serde(default = "default_yahoo_url")]
    pub yahoo_quote_url: String,

    #[serde(default = "default_api_key")]
    pub alpha_vantage_key: String,

    #[serde(default = "default_api_key")]
    pub fmp_key: String,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_timeout_secs() -> u64 {
    10
}
fn default_request_delay_ms() -> u64 {
    250
}
fn default_jitter_ms() -> u64 {
    250
}
fn default_max_retries() -> u32 {
    1
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_string()
}
fn default_house_url() -> String {
    "https://housestockwatcher.com".to_string()
}
fn default_senate_url() -> String {
    "https://senatestockwatcher.com".to_string()
}
fn default_capitol_trades_url() -> String {
    "https://www.capitoltrades.com/trades".to_string()
}
fn default_source_timeout_secs() -> u64 {
    10
}
fn default_dataset_window_mins() -> i64 {
    60
}
fn default_quotes_window_hours() -> i64 {
    12
}
fn default_yahoo_url() -> String {
    "https://query1.finance.yahoo.com/v7/finance/quote".to_string()
}
fn default_api_key() -> String {
    "demo".to_string()
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            request_delay_ms: default_request_delay_ms(),
            jitter_ms: default_jitter_ms(),
            max_retries: default_max_retries(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            house_base_url: default_house_url(),
            senate_base_url: default_senate_url(),
            capitol_trades_url: default_capitol_trades_url(),
            source_timeout_secs: default_source_timeout_secs(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            trades_window_mins: default_dataset_window_mins(),
            politicians_window_mins: default_dataset_window_mins(),
            quotes_window_hours: default_quotes_window_hours(),
        }
    }
}

impl Default for QuotesConfig {
    fn default() -> Self {
        Self {
            yahoo_quote_url: default_yahoo_url(),
            alpha_vantage_key: default_api_key(),
            fmp_key: default_api_key(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scraper: ScraperConfig::default(),
            sources: SourcesConfig::default(),
            cache: CacheConfig::default(),
            quotes: QuotesConfig::default(),
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("CONGRESS").separator("__"))
            .build()?;

        let app_cfg: AppConfig = cfg.try_deserialize()?;
        Ok(app_cfg)
    }
}
