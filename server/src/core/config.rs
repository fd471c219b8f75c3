use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::Deserialize;

use super::cli::CliConfig;
use super::constants::{
    CONFIG_FILE_NAME, DEFAULT_ANALYTICS_TIMEZONE, DEFAULT_PRICING_REFRESH_MINUTES,
    PRICING_SYNC_URL,
};
use crate::domain::semconv::{LATEST_VERSION, available_versions};

// =============================================================================
// File Configuration (JSON)
// =============================================================================

/// Pricing configuration section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PricingFileConfig {
    pub refresh_minutes: Option<u64>,
    pub url: Option<String>,
    pub file: Option<PathBuf>,
}

/// Semantic convention section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct SemconvFileConfig {
    pub version: Option<String>,
}

/// Analytics section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct AnalyticsFileConfig {
    pub timezone: Option<String>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub pricing: Option<PricingFileConfig>,
    pub semconv: Option<SemconvFileConfig>,
    pub analytics: Option<AnalyticsFileConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Where model prices come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PricingSourceConfig {
    Url(String),
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct PricingConfig {
    pub source: PricingSourceConfig,
    /// 0 refreshes before every batch and disables the background sync
    pub refresh_minutes: u64,
}

#[derive(Debug, Clone)]
pub struct SemconvConfig {
    pub version: String,
}

#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    pub timezone: Tz,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub pricing: PricingConfig,
    pub semconv: SemconvConfig,
    pub analytics: AnalyticsConfig,
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Local directory config OR CLI-specified config path
    /// 3. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");
        tracing::trace!(cli = ?cli, "CLI config");

        let path = if let Some(ref path) = cli.config {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            Some(path.clone())
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        let file_config = match path {
            Some(path) => {
                let config = FileConfig::load_from_file(&path)?;
                config.warn_unknown_fields();
                config
            }
            None => FileConfig::default(),
        };

        Self::resolve(cli, file_config)
    }

    /// Layer configs: defaults -> file config -> CLI/env overrides
    fn resolve(cli: &CliConfig, file_config: FileConfig) -> Result<Self> {
        let file_pricing = file_config.pricing.unwrap_or_default();
        let file_semconv = file_config.semconv.unwrap_or_default();
        let file_analytics = file_config.analytics.unwrap_or_default();

        // A CLI source of either kind replaces both file-configured sources
        let source = match (&cli.pricing_file, &cli.pricing_url) {
            (Some(file), _) => PricingSourceConfig::File(file.clone()),
            (None, Some(url)) => PricingSourceConfig::Url(url.clone()),
            (None, None) => match file_pricing.file {
                Some(file) => PricingSourceConfig::File(file),
                None => PricingSourceConfig::Url(
                    file_pricing
                        .url
                        .unwrap_or_else(|| PRICING_SYNC_URL.to_string()),
                ),
            },
        };

        let refresh_minutes = cli
            .pricing_refresh_minutes
            .or(file_pricing.refresh_minutes)
            .unwrap_or(DEFAULT_PRICING_REFRESH_MINUTES);

        let version = cli
            .semconv_version
            .clone()
            .or(file_semconv.version)
            .unwrap_or_else(|| LATEST_VERSION.to_string());

        let timezone = match cli.timezone {
            Some(tz) => tz,
            None => {
                let name = file_analytics
                    .timezone
                    .unwrap_or_else(|| DEFAULT_ANALYTICS_TIMEZONE.to_string());
                name.parse::<Tz>()
                    .map_err(|_| anyhow::anyhow!("Invalid analytics.timezone: {}", name))?
            }
        };

        let config = Self {
            pricing: PricingConfig {
                source,
                refresh_minutes,
            },
            semconv: SemconvConfig { version },
            analytics: AnalyticsConfig { timezone },
        };
        config.validate()?;
        tracing::debug!(
            semconv = %config.semconv.version,
            pricing = ?config.pricing.source,
            refresh_minutes = config.pricing.refresh_minutes,
            timezone = %config.analytics.timezone,
            "Configuration loaded"
        );
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let versions = available_versions();
        if !versions.contains(&self.semconv.version.as_str()) {
            anyhow::bail!(
                "Unknown semconv version '{}'. Available: {}",
                self.semconv.version,
                versions.join(", ")
            );
        }
        if let PricingSourceConfig::Url(url) = &self.pricing.source
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            anyhow::bail!("pricing.url must be an http(s) URL, got '{}'", url);
        }
        Ok(())
    }
}
