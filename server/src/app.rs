//! Core application

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::TimeDelta;
use serde_json::{Value as JsonValue, json};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::core::cli::{self, Commands};
use crate::core::config::{AppConfig, PricingSourceConfig};
use crate::core::constants::{APP_NAME_LOWER, DEFAULT_MAX_STORED_SPANS, ENV_LOG};
use crate::data::MemorySpanRepository;
use crate::data::types::{QueryRequest, RawSpan, TraceView};
use crate::domain::pricing::{FilePricingSource, HttpPricingSource, PricingService, PricingSource};
use crate::domain::semconv::{self, Vocabulary};
use crate::domain::traces::{SpanNormalizer, TraceForest, ViewProjection};
use crate::domain::{QueryService, TracePipeline};
use crate::utils::otlp::{decode_trace_request, raw_spans_from_request};
use crate::utils::time::SystemClock;

pub struct CoreApp {
    pub config: AppConfig,
    pub pricing: Arc<PricingService>,
    pub pipeline: TracePipeline,
    pub query: QueryService,
    shutdown_tx: watch::Sender<bool>,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let (cli_config, command) = cli::parse();
        tracing::trace!(command = ?command, "Parsed command");

        let config = AppConfig::load(&cli_config)?;
        let output = match command {
            Commands::Semconv { vocabulary, keys } => {
                Self::translate_keys(&config.semconv.version, vocabulary, &keys)?
            }
            command => {
                let app = Self::init(config)?;
                let sync = app.start_background_tasks().await;
                let result = app.execute(command).await;
                app.shutdown(sync).await;
                result?
            }
        };

        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }

    pub fn init(config: AppConfig) -> Result<Self> {
        let source: Arc<dyn PricingSource> = match &config.pricing.source {
            PricingSourceConfig::File(path) => Arc::new(FilePricingSource::new(path.clone())),
            PricingSourceConfig::Url(url) => Arc::new(
                HttpPricingSource::new(url.clone())
                    .map_err(|e| anyhow::anyhow!("Failed to initialize pricing source: {}", e))?,
            ),
        };
        let interval = i64::try_from(config.pricing.refresh_minutes)
            .ok()
            .and_then(TimeDelta::try_minutes)
            .context("pricing refresh interval out of range")?;
        let pricing = Arc::new(PricingService::new(source, interval, Arc::new(SystemClock)));

        let normalizer = SpanNormalizer::for_version(&config.semconv.version)?;
        let repository = Arc::new(MemorySpanRepository::with_max_spans(DEFAULT_MAX_STORED_SPANS));
        let pipeline = TracePipeline::new(normalizer, Some(Arc::clone(&pricing)), repository.clone());
        let query = QueryService::new(repository).with_default_timezone(config.analytics.timezone);

        tracing::debug!(
            pricing = pricing.source_name(),
            semconv = %config.semconv.version,
            "Services initialized"
        );

        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            config,
            pricing,
            pipeline,
            query,
            shutdown_tx,
        })
    }

    /// Load the price table, then keep it fresh in the background while a
    /// command runs. `None` when the refresh interval is 0, in which case each
    /// batch refreshes on its own.
    pub async fn start_background_tasks(&self) -> Option<JoinHandle<()>> {
        self.pricing.refresh_if_stale().await;
        let handle = self.pricing.start_sync_task(self.shutdown_tx.subscribe());
        tracing::debug!(sync = handle.is_some(), "Background tasks started");
        handle
    }

    /// Signal background tasks to stop and wait for them.
    pub async fn shutdown(&self, sync: Option<JoinHandle<()>>) {
        self.shutdown_tx.send_replace(true);
        if let Some(handle) = sync
            && let Err(e) = handle.await
        {
            tracing::warn!(error = %e, "Pricing sync task ended abnormally");
        }
    }

    /// Run one command and return its JSON report.
    pub async fn execute(&self, command: Commands) -> Result<JsonValue> {
        match command {
            Commands::Ingest { file } => {
                let forests = self.ingest_file(&file).await?;
                let spans: Vec<JsonValue> = forests
                    .iter()
                    .flat_map(|forest| forest.nodes())
                    .map(|node| {
                        json!({
                            "trace_id": node.trace_id(),
                            "span_id": node.span_id(),
                            "parent_id": node.parent_id(),
                            "name": node.span.span_name,
                            "attributes": node.span.to_wire(),
                        })
                    })
                    .collect();
                let traces: Vec<TraceView> = forests.iter().filter_map(trace_view).collect();
                Ok(json!({ "spans": spans, "traces": traces }))
            }
            Commands::Query { spans, request } => {
                self.ingest_file(&spans).await?;
                let request = load_request(request.as_deref()).await?;
                let (output, total) = self.query.query(&request).await?;
                Ok(json!({ "total": total, "results": output }))
            }
            Commands::Analytics { spans, request } => {
                self.ingest_file(&spans).await?;
                let request = load_request(request.as_deref()).await?;
                let (buckets, total) = self.query.analytics(&request).await?;
                Ok(json!({ "total": total, "buckets": buckets }))
            }
            Commands::Semconv { vocabulary, keys } => {
                Self::translate_keys(&self.config.semconv.version, vocabulary, &keys)
            }
        }
    }

    async fn ingest_file(&self, path: &Path) -> Result<Vec<TraceForest>> {
        let raws = load_spans(path).await?;
        tracing::info!(path = %path.display(), spans = raws.len(), "Ingesting spans");
        Ok(self.pipeline.ingest(&raws).await?)
    }

    /// Canonical spelling of each vendor key (null when no rule applies).
    fn translate_keys(version: &str, vocabulary: Vocabulary, keys: &[String]) -> Result<JsonValue> {
        let codex = semconv::codex(version)?;
        if !codex.supports(vocabulary) {
            anyhow::bail!("Vocabulary {} is not defined in semconv {}", vocabulary, version);
        }

        let mut translated = serde_json::Map::new();
        for key in keys {
            let canonical = match codex.ingest(vocabulary, key, &JsonValue::Null) {
                Ok(Some((canonical, _))) => JsonValue::String(canonical),
                Ok(None) => JsonValue::Null,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Translation failed");
                    JsonValue::Null
                }
            };
            translated.insert(key.clone(), canonical);
        }
        Ok(json!({
            "version": version,
            "vocabulary": vocabulary.as_str(),
            "keys": translated,
        }))
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME_LOWER);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }
}

fn trace_view(forest: &TraceForest) -> Option<TraceView> {
    let trace_id = forest.nodes().first()?.trace_id().to_string();
    Some(TraceView {
        trace_id,
        roots: forest.to_view(ViewProjection::default()),
    })
}

/// Read a span batch: OTLP protobuf for `.pb` files, a JSON array otherwise.
async fn load_spans(path: &Path) -> Result<Vec<RawSpan>> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read spans: {}", path.display()))?;

    if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("pb")) {
        let request = decode_trace_request(&bytes)
            .with_context(|| format!("Failed to decode OTLP request: {}", path.display()))?;
        return Ok(raw_spans_from_request(&request));
    }
    serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse spans: {}", path.display()))
}

async fn load_request(path: Option<&Path>) -> Result<QueryRequest> {
    let Some(path) = path else {
        return Ok(QueryRequest::default());
    };
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read query request: {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse query request: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{AnalyticsConfig, PricingConfig, SemconvConfig};
    use crate::domain::semconv::LATEST_VERSION;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::{NamedTempFile, TempDir};

    fn write(dir: &TempDir, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn app(prices: &NamedTempFile) -> CoreApp {
        CoreApp::init(AppConfig {
            pricing: PricingConfig {
                source: PricingSourceConfig::File(prices.path().to_path_buf()),
                refresh_minutes: 60,
            },
            semconv: SemconvConfig {
                version: LATEST_VERSION.to_string(),
            },
            analytics: AnalyticsConfig {
                timezone: chrono_tz::UTC,
            },
        })
        .unwrap()
    }

    fn price_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"gpt-4": {{"input_cost_per_token": 0.00003, "output_cost_per_token": 0.00006}}}}"#
        )
        .unwrap();
        file
    }

    const SPANS: &str = r#"[
        {
            "trace_id": "t1", "span_id": "A", "name": "agent",
            "start_time": "2024-01-01T00:00:00Z", "end_time": "2024-01-01T00:00:03Z",
            "attributes": {"traceloop.span.kind": "agent"}
        },
        {
            "trace_id": "t1", "span_id": "B", "parent_id": "A", "name": "openai.chat",
            "start_time": "2024-01-01T00:00:01Z", "end_time": "2024-01-01T00:00:02Z",
            "attributes": {
                "gen_ai.request.model": "gpt-4",
                "gen_ai.usage.prompt_tokens": 2,
                "gen_ai.usage.completion_tokens": 1
            }
        }
    ]"#;

    #[tokio::test]
    async fn test_ingest_command_reports_spans_and_trees() {
        let prices = price_file();
        let dir = tempfile::tempdir().unwrap();
        let spans = write(&dir, "spans.json", SPANS.as_bytes());

        let output = app(&prices)
            .execute(Commands::Ingest { file: spans })
            .await
            .unwrap();

        assert_eq!(output["spans"].as_array().unwrap().len(), 2);
        let trace = &output["traces"][0];
        assert_eq!(trace["trace_id"], "t1");
        // children are keyed by display name
        assert!(trace["roots"]["A"]["children"]["openai.chat"].is_object());
        let root = output["spans"]
            .as_array()
            .unwrap()
            .iter()
            .find(|s| s["span_id"] == "A")
            .unwrap();
        assert!(root["parent_id"].is_null());
        let cost = root["attributes"]["ag.metrics.costs.cumulative.total"]
            .as_f64()
            .unwrap();
        assert!((cost - 120.0 / 1e6).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_background_sync_starts_and_stops() {
        let prices = price_file();
        let app = app(&prices);

        let sync = app.start_background_tasks().await;
        assert!(sync.is_some());
        // the table is loaded before any command runs
        assert!(app.pricing.lookup("gpt-4").is_some());
        assert!(!app.pricing.is_stale());

        app.shutdown(sync).await;
        assert!(*app.shutdown_tx.borrow());
    }

    #[tokio::test]
    async fn test_background_sync_disabled_for_zero_interval() {
        let prices = price_file();
        let mut config = app(&prices).config;
        config.pricing.refresh_minutes = 0;
        let app = CoreApp::init(config).unwrap();

        assert!(app.start_background_tasks().await.is_none());
        app.shutdown(None).await;
    }

    #[tokio::test]
    async fn test_query_and_analytics_commands() {
        let prices = price_file();
        let dir = tempfile::tempdir().unwrap();
        let spans = write(&dir, "spans.json", SPANS.as_bytes());
        let request = write(
            &dir,
            "request.json",
            br#"{"grouping": {"focus": "trace"}}"#,
        );

        let app = app(&prices);
        let output = app
            .execute(Commands::Query {
                spans: spans.clone(),
                request: Some(request),
            })
            .await
            .unwrap();
        assert_eq!(output["total"], 2);
        assert_eq!(output["results"]["focus"], "trace");

        let output = app
            .execute(Commands::Analytics {
                spans,
                request: None,
            })
            .await
            .unwrap();
        let buckets = output["buckets"].as_array().unwrap();
        assert_eq!(buckets.len(), 1);
        // the second ingest upserts the same two spans
        assert_eq!(buckets[0]["count"], 2);
    }

    #[tokio::test]
    async fn test_load_spans_from_protobuf() {
        use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
        use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span};
        use prost::Message;

        let request = ExportTraceServiceRequest {
            resource_spans: vec![ResourceSpans {
                scope_spans: vec![ScopeSpans {
                    spans: vec![Span {
                        trace_id: vec![7; 16],
                        span_id: vec![3; 8],
                        name: "root".to_string(),
                        start_time_unix_nano: 1_700_000_000_000_000_000,
                        end_time_unix_nano: 1_700_000_001_000_000_000,
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
                ..Default::default()
            }],
        };
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "request.pb", &request.encode_to_vec());

        let spans = load_spans(&path).await.unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].span_id, "0303030303030303");
    }

    #[tokio::test]
    async fn test_load_errors_carry_context() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let err = load_spans(&missing).await.unwrap_err();
        assert!(err.to_string().contains("Failed to read spans"));

        let garbage = write(&dir, "bad.json", b"{not json");
        let err = load_spans(&garbage).await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse spans"));

        assert!(load_request(None).await.is_ok());
    }

    #[test]
    fn test_translate_keys() {
        let output = CoreApp::translate_keys(
            LATEST_VERSION,
            Vocabulary::OpenLlmetry,
            &["llm.top_k".to_string(), "not.a.vendor.key".to_string()],
        )
        .unwrap();
        assert_eq!(output["vocabulary"], "openllmetry");
        assert!(output["keys"]["llm.top_k"].as_str().unwrap().starts_with("ag."));
        assert!(output["keys"]["not.a.vendor.key"].is_null());

        assert!(CoreApp::translate_keys("0.0.1", Vocabulary::OpenLlmetry, &[]).is_err());
    }
}
