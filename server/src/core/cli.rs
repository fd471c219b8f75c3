use clap::{Parser, Subcommand};

use std::path::PathBuf;

use chrono_tz::Tz;

use super::constants::{
    APP_NAME, ENV_ANALYTICS_TIMEZONE, ENV_CONFIG, ENV_PRICING_FILE, ENV_PRICING_REFRESH_MINUTES,
    ENV_PRICING_URL, ENV_SEMCONV_VERSION,
};
use crate::domain::semconv::Vocabulary;

#[derive(Parser)]
#[command(name = APP_NAME)]
#[command(version, about = "Agent trace normalization and aggregation", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Model price list URL (LiteLLM format)
    #[arg(long, global = true, env = ENV_PRICING_URL)]
    pub pricing_url: Option<String>,

    /// Local model price file (LiteLLM format), used instead of the URL
    #[arg(long, global = true, env = ENV_PRICING_FILE)]
    pub pricing_file: Option<PathBuf>,

    /// Price table refresh interval in minutes (0 = before every batch)
    #[arg(long, global = true, env = ENV_PRICING_REFRESH_MINUTES)]
    pub pricing_refresh_minutes: Option<u64>,

    /// Semantic convention table version
    #[arg(long, global = true, env = ENV_SEMCONV_VERSION)]
    pub semconv_version: Option<String>,

    /// Default analytics timezone (IANA name)
    #[arg(long, global = true, env = ENV_ANALYTICS_TIMEZONE, value_parser = parse_timezone)]
    pub timezone: Option<Tz>,
}

/// Parse an IANA timezone name from CLI/env string
fn parse_timezone(s: &str) -> Result<Tz, String> {
    s.parse::<Tz>()
        .map_err(|_| format!("Invalid timezone '{}'. Expected an IANA name such as Europe/Berlin", s))
}

/// Parse a vendor vocabulary from CLI string
fn parse_vocabulary(s: &str) -> Result<Vocabulary, String> {
    s.parse::<Vocabulary>().map_err(|_| {
        let valid: Vec<&str> = Vocabulary::ALL.iter().map(|v| v.as_str()).collect();
        format!(
            "Invalid vocabulary '{}'. Valid options: {}",
            s,
            valid.join(", ")
        )
    })
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Normalize and aggregate a span batch, print spans and trace trees
    Ingest {
        /// JSON array of raw spans, or an OTLP protobuf request (.pb)
        file: PathBuf,
    },
    /// Ingest a span batch and run a query over it
    Query {
        /// JSON array of raw spans, or an OTLP protobuf request (.pb)
        #[arg(long)]
        spans: PathBuf,
        /// Query request JSON (filter, grouping, windowing)
        #[arg(long)]
        request: Option<PathBuf>,
    },
    /// Ingest a span batch and compute time-bucketed analytics
    Analytics {
        /// JSON array of raw spans, or an OTLP protobuf request (.pb)
        #[arg(long)]
        spans: PathBuf,
        /// Query request JSON (filter, windowing)
        #[arg(long)]
        request: Option<PathBuf>,
    },
    /// Show how vendor attribute keys translate into the canonical namespace
    Semconv {
        /// Vendor vocabulary (openllmetry, openinference, otel-genai)
        #[arg(long, value_parser = parse_vocabulary)]
        vocabulary: Vocabulary,
        /// Vendor attribute keys
        #[arg(required = true)]
        keys: Vec<String>,
    },
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub config: Option<PathBuf>,
    pub pricing_url: Option<String>,
    pub pricing_file: Option<PathBuf>,
    pub pricing_refresh_minutes: Option<u64>,
    pub semconv_version: Option<String>,
    pub timezone: Option<Tz>,
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Commands) {
    let cli = Cli::parse();
    let config = CliConfig {
        config: cli.config,
        pricing_url: cli.pricing_url,
        pricing_file: cli.pricing_file,
        pricing_refresh_minutes: cli.pricing_refresh_minutes,
        semconv_version: cli.semconv_version,
        timezone: cli.timezone,
    };
    (config, cli.command)
}
