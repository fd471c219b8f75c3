//! Pricing service for LLM cost calculations
//!
//! Prices are kept in USD per 1 000 000 tokens. The active table is an
//! `Arc<PriceTable>` snapshot behind a read-heavy lock and is swapped whole
//! on refresh, so a reader never sees a half-updated table.
//!
//! Lookup order: exact → suffix after the last `/` → alias (`-latest`
//! stripped) → family (date suffix stripped).

mod source;

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::utils::time::Clock;

pub use source::{FilePricingSource, HttpPricingSource, PricingSource, StaticPricingSource};

/// LiteLLM quotes per-token prices.
const TOKENS_PER_UNIT: f64 = 1_000_000.0;

/// A refreshed table must keep at least this share of the current models.
const MIN_REFRESH_RATIO_PERCENT: usize = 50;

// ============================================================================
// ERROR TYPE
// ============================================================================

#[derive(Error, Debug)]
pub enum PricingError {
    #[error("Failed to parse pricing data: {0}")]
    ParseError(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Pricing source returned HTTP {0}")]
    Status(u16),
    #[error("Refreshed table has too few models ({new} < half of {current})")]
    TooFewModels { current: usize, new: usize },
}

// ============================================================================
// PRICE TABLE
// ============================================================================

/// Per-model prices in USD per 1M tokens.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ModelPrice {
    pub input: f64,
    pub output: f64,
}

impl ModelPrice {
    pub fn new(input: f64, output: f64) -> Self {
        Self { input, output }
    }

    pub fn cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        (prompt_tokens as f64 * self.input + completion_tokens as f64 * self.output)
            / TOKENS_PER_UNIT
    }
}

/// How a model name was matched against the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Exact key (case-insensitive)
    Exact,
    /// Provider path stripped, e.g. `openai/gpt-4o` → `gpt-4o`
    Suffix,
    /// `-latest` / `:latest` stripped
    Alias,
    /// Date suffix stripped, e.g. `gpt-4o-2024-08-06` → `gpt-4o`
    Family,
    #[default]
    NotFound,
}

impl MatchType {
    pub fn confidence(self) -> f64 {
        match self {
            MatchType::Exact => 1.0,
            MatchType::Suffix => 0.95,
            MatchType::Alias => 0.85,
            MatchType::Family => 0.70,
            MatchType::NotFound => 0.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    /// Lowercase model key → price
    models: HashMap<String, ModelPrice>,
}

impl PriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, model: &str, price: ModelPrice) {
        self.models.insert(model.to_lowercase(), price);
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Parse LiteLLM `model_prices_and_context_window.json`.
    ///
    /// Entries without prices (image generation, the `sample_spec` doc entry)
    /// are skipped, as are negative prices.
    pub fn from_litellm_json(json: &str) -> Result<Self, PricingError> {
        let raw: serde_json::Value =
            serde_json::from_str(json).map_err(|e| PricingError::ParseError(e.to_string()))?;
        let obj = raw
            .as_object()
            .ok_or_else(|| PricingError::ParseError("Expected JSON object".into()))?;

        let mut table = Self::new();
        for (key, value) in obj {
            if key == "sample_spec" {
                continue;
            }
            let Some(entry) = value.as_object() else {
                continue;
            };
            let per_token = |field: &str| entry.get(field).and_then(|v| v.as_f64()).unwrap_or(0.0);
            let input = per_token("input_cost_per_token");
            let output = per_token("output_cost_per_token");

            if input == 0.0 && output == 0.0 {
                continue;
            }
            if input < 0.0 || output < 0.0 {
                tracing::warn!(model = %key, "Skipping model with negative pricing");
                continue;
            }
            table.insert(
                key,
                ModelPrice::new(input * TOKENS_PER_UNIT, output * TOKENS_PER_UNIT),
            );
        }
        Ok(table)
    }

    pub fn lookup(&self, model: &str) -> Option<(ModelPrice, MatchType)> {
        let model = model.trim().to_lowercase();
        if model.is_empty() {
            return None;
        }

        if let Some(price) = self.models.get(&model) {
            return Some((*price, MatchType::Exact));
        }

        let suffix = model
            .rsplit_once('/')
            .map(|(_, tail)| tail)
            .filter(|tail| !tail.is_empty());
        if let Some(tail) = suffix
            && let Some(price) = self.models.get(tail)
        {
            return Some((*price, MatchType::Suffix));
        }

        let candidates: Vec<&str> = std::iter::once(model.as_str()).chain(suffix).collect();

        for &name in &candidates {
            if let Some(base) = strip_latest_alias(name)
                && let Some(price) = self.models.get(base)
            {
                return Some((*price, MatchType::Alias));
            }
        }

        for &name in &candidates {
            let family = strip_date_suffix(strip_latest_alias(name).unwrap_or(name));
            if family != name
                && let Some(price) = self.models.get(&family)
            {
                return Some((*price, MatchType::Family));
            }
        }

        None
    }
}

fn strip_latest_alias(model: &str) -> Option<&str> {
    model
        .strip_suffix("-latest")
        .or_else(|| model.strip_suffix(":latest"))
        .filter(|base| !base.is_empty())
}

/// Strip date suffixes: `claude-3-5-sonnet-20241022` → `claude-3-5-sonnet`,
/// `gpt-4o-2024-11-20` → `gpt-4o`.
fn strip_date_suffix(model: &str) -> String {
    static RE_DATE: OnceLock<Option<regex::Regex>> = OnceLock::new();

    let re = RE_DATE.get_or_init(|| regex::Regex::new(r"-(\d{8}|\d{4}-\d{2}-\d{2})$").ok());
    match re {
        Some(re) => re.replace(model, "").into_owned(),
        None => model.to_string(),
    }
}

// ============================================================================
// PRICING SERVICE
// ============================================================================

/// Price-table cache with an injected source, refresh interval and clock.
pub struct PricingService {
    source: Arc<dyn PricingSource>,
    table: RwLock<Option<Arc<PriceTable>>>,
    last_attempt: Mutex<Option<DateTime<Utc>>>,
    refresh_interval: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl PricingService {
    pub fn new(
        source: Arc<dyn PricingSource>,
        refresh_interval: TimeDelta,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source,
            table: RwLock::new(None),
            last_attempt: Mutex::new(None),
            refresh_interval,
            clock,
        }
    }

    /// Current snapshot, if any table was ever loaded.
    pub fn table(&self) -> Option<Arc<PriceTable>> {
        self.table.read().clone()
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    pub fn lookup(&self, model: &str) -> Option<(ModelPrice, MatchType)> {
        self.table.read().as_ref()?.lookup(model)
    }

    /// True when no attempt was made yet or the interval has elapsed since
    /// the last one.
    pub fn is_stale(&self) -> bool {
        match *self.last_attempt.lock() {
            None => true,
            Some(at) => self.clock.now() - at >= self.refresh_interval,
        }
    }

    /// Fetch from the source and swap the table in. Returns the new model
    /// count.
    pub async fn refresh(&self) -> Result<usize, PricingError> {
        let fetched = self.source.fetch().await?;
        let new = fetched.len();

        let current = self.table.read().as_ref().map_or(0, |t| t.len());
        if new * 100 < current * MIN_REFRESH_RATIO_PERCENT {
            return Err(PricingError::TooFewModels { current, new });
        }

        *self.table.write() = Some(Arc::new(fetched));
        tracing::debug!(source = %self.source.name(), models = new, "Price table refreshed");
        Ok(new)
    }

    /// Refresh when stale. The attempt time is recorded before fetching so
    /// concurrent callers trigger a single fetch. Failures keep the previous
    /// table.
    pub async fn refresh_if_stale(&self) -> bool {
        {
            let mut last_attempt = self.last_attempt.lock();
            let now = self.clock.now();
            if let Some(at) = *last_attempt
                && now - at < self.refresh_interval
            {
                return false;
            }
            *last_attempt = Some(now);
        }

        match self.refresh().await {
            Ok(_) => true,
            Err(e) => {
                if self.table.read().is_some() {
                    tracing::warn!(
                        source = %self.source.name(),
                        error = %e,
                        "Pricing refresh failed, keeping cached table"
                    );
                } else {
                    tracing::error!(
                        source = %self.source.name(),
                        error = %e,
                        "Pricing source unavailable, costs will be zero"
                    );
                }
                false
            }
        }
    }

    /// Start background sync task. Returns `None` when the interval is not
    /// positive.
    pub fn start_sync_task(
        self: &Arc<Self>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Option<JoinHandle<()>> {
        let interval = self
            .refresh_interval
            .to_std()
            .ok()
            .filter(|d| !d.is_zero())?;
        let service = Arc::clone(self);

        Some(tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = timer.tick() => {
                        service.refresh_if_stale().await;
                    }
                }
            }
        }))
    }
}

// ============================================================================
// TESTS
// ============================================================================
