//! NetMon CLI
//!
//! Queries the ingestion service for metrics and events, inspects the
//! agent's counter cache and runs the rate calculator offline.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{cache, events, metrics, parse_sample, parse_since, parse_width, rate, Sample};
use netmon_lib::rate::CounterWidth;
use std::path::PathBuf;
use std::time::Duration;

/// NetMon CLI
#[derive(Parser)]
#[command(name = "netmon")]
#[command(author, version, about = "CLI for the NetMon network monitoring agent", long_about = None)]
pub struct Cli {
    /// Ingestion service URL (can also be set via NETMON_API_URL env var)
    #[arg(long, env = "NETMON_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Query stored samples of one metric on one device
    Metrics {
        /// Device identifier (the monitored host name)
        device: String,

        /// Metric name, e.g. "net.if.in[ifHCInOctets.3]"
        metric: String,

        /// Look-back window (e.g. 30m, 1h, 7d)
        #[arg(long, default_value = "1h", value_parser = parse_since)]
        since: Duration,

        /// Maximum number of samples
        #[arg(long, default_value_t = 1000)]
        limit: usize,
    },

    /// List recent events, newest first
    Events {
        /// Only events of this device
        #[arg(long, short)]
        device: Option<String>,

        /// Maximum number of events
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },

    /// Counter cache tools
    #[command(subcommand)]
    Cache(CacheCommands),

    /// Compute a rate from two counter samples
    Rate {
        /// Previous sample as VALUE@TIMESTAMP
        #[arg(long, value_parser = parse_sample)]
        prev: Sample,

        /// Current sample as VALUE@TIMESTAMP
        #[arg(long, value_parser = parse_sample)]
        curr: Sample,

        /// Item key, used to guess the counter width
        #[arg(long, default_value = "")]
        key: String,

        /// Counter width in bits (32 or 64), overrides the guess
        #[arg(long, value_parser = parse_width)]
        width: Option<CounterWidth>,

        /// The counter counts octets; report bits per second
        #[arg(long)]
        bytes: bool,

        /// Link speed in bits per second, for the capacity check and status
        #[arg(long)]
        link_speed: Option<f64>,
    },
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Show entries of a counter cache file, most recently updated first
    Inspect {
        /// Path to the cache file
        file: PathBuf,

        /// Maximum number of entries
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = config::Config::load()?;
    let format = settings.format(cli.format);

    let result = match cli.command {
        Commands::Metrics {
            device,
            metric,
            since,
            limit,
        } => {
            let client = client::ApiClient::new(&settings.api_url(cli.api_url))?;
            metrics::show_metrics(&client, &device, &metric, since, limit, format).await
        }
        Commands::Events { device, limit } => {
            let client = client::ApiClient::new(&settings.api_url(cli.api_url))?;
            events::show_events(&client, device.as_deref(), limit, format).await
        }
        Commands::Cache(CacheCommands::Inspect { file, limit }) => {
            cache::inspect_cache(&file, limit, format)
        }
        Commands::Rate {
            prev,
            curr,
            key,
            width,
            bytes,
            link_speed,
        } => rate::run(
            &rate::RateInput {
                prev,
                curr,
                key,
                width,
                bytes,
                link_speed_bps: link_speed,
            },
            format,
        ),
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
