mod cache;
mod config;
mod loader;
mod models;
mod pipeline;
mod quotes;
mod scraper;
mod utils;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::AppConfig;
use crate::models::Chamber;
use crate::pipeline::{DatasetName, DatasetView, Pipeline};
use crate::quotes::QuoteResponse;
use crate::scraper::{cleaner, tickers};

#[derive(Parser)]
#[command(
    name = "congress-trades",
    about = "Congressional stock-trade disclosures, scraped and normalized",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch trades for both chambers, or one with --chamber
    Trades {
        #[arg(short, long)]
        chamber: Option<Chamber>,
    },

    /// Fetch the member roster
    Politicians {
        #[arg(short, long)]
        chamber: Option<Chamber>,
    },

    /// Fetch a dataset by name: houseTrades, senateTrades, congressionalTrades, politicians
    Dataset {
        name: DatasetName,

        #[arg(short, long)]
        chamber: Option<Chamber>,
    },

    /// Market quote for a ticker
    Quote { ticker: String },

    /// Resolve free text (and optional asset description) to a ticker
    Resolve {
        text: String,

        #[arg(short, long)]
        asset: Option<String>,
    },

    /// Normalize a disclosure date to MM/DD/YYYY
    Date { text: String },

    /// Extract records from a saved HTML, CSV or JSON file
    Extract {
        file: PathBuf,

        #[arg(short, long, default_value = "house")]
        chamber: Chamber,

        /// Treat the file as a member roster instead of trades
        #[arg(long)]
        politicians: bool,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("Failed to serialize output")?);
    Ok(())
}

fn report(t: &mut utils::Timer, name: DatasetName, view: &DatasetView) {
    if view.is_empty() {
        warn!("{}: no records from any source", name.as_str());
    }
    t.note(format!("{} records via {}", view.len(), view.source_used()));
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "congress_trades=info,warn",
        1 => "congress_trades=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    match cli.command {
        Command::Trades { chamber } => {
            let mut t = utils::Timer::start(DatasetName::CongressionalTrades.as_str());
            let view = Pipeline::new(&config)?
                .fetch_dataset(DatasetName::CongressionalTrades, chamber)
                .await;
            report(&mut t, DatasetName::CongressionalTrades, &view);
            print_json(&view)?;
        }

        Command::Politicians { chamber } => {
            let mut t = utils::Timer::start(DatasetName::Politicians.as_str());
            let view = Pipeline::new(&config)?
                .fetch_dataset(DatasetName::Politicians, chamber)
                .await;
            report(&mut t, DatasetName::Politicians, &view);
            print_json(&view)?;
        }

        Command::Dataset { name, chamber } => {
            let mut t = utils::Timer::start(name.as_str());
            let view = Pipeline::new(&config)?.fetch_dataset(name, chamber).await;
            report(&mut t, name, &view);
            print_json(&view)?;
        }

        Command::Quote { ticker } => {
            let _t = utils::Timer::start(format!("quote {}", ticker));
            let response = Pipeline::new(&config)?.enrich_ticker(&ticker).await;
            if let QuoteResponse::Error(failure) = &response {
                info!("No quote for '{}': {}", ticker, failure.error);
            }
            print_json(&response)?;
        }

        Command::Resolve { text, asset } => {
            let ticker = tickers::resolve(&text, asset.as_deref());
            print_json(&serde_json::json!({ "input": text, "asset": asset, "ticker": ticker }))?;
        }

        Command::Date { text } => {
            let normalized = cleaner::normalize_date(&text);
            print_json(&serde_json::json!({ "input": text, "normalized": normalized }))?;
        }

        Command::Extract {
            file,
            chamber,
            politicians,
        } => {
            let _t = utils::Timer::start(format!("extract {:?}", file));
            let now = Utc::now();
            if politicians {
                print_json(&loader::load_politicians(&file, chamber, now)?)?;
            } else {
                print_json(&loader::load_trades(&file, chamber, now)?)?;
            }
        }
    }

    Ok(())
}
