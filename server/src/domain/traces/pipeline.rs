//! Trace Processing Pipeline
//!
//! ```text
//! RawSpan ──▶ 1. NORMALIZE ──▶ 2. PRICE ──▶ 3. TREE ──▶ 4. CUMULATE ──▶ 5. PERSIST
//!             adapters +       per-span     per-trace   bottom-up       repository
//!             semconv codex    cost/tokens  forest      + commit
//! ```
//!
//! | Stage        | Input                  | Output                     | Module         |
//! |--------------|------------------------|----------------------------|----------------|
//! | 1. Normalize | `&[RawSpan]`           | `Vec<CanonicalAttributes>` | `normalize.rs` |
//! | 2. Price     | `SpanIndex` per trace  | incremental accumulators   | `aggregate.rs` |
//! | 3. Tree      | `SpanIndex`            | `TraceForest`              | `tree.rs`      |
//! | 4. Cumulate  | `&mut TraceForest`     | cumulative + `ag.metrics`  | `aggregate.rs` |
//! | 5. Persist   | `Vec<SpanNode>`        | stored count               | `data::traits` |

use std::collections::HashMap;
use std::sync::Arc;

use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;

use super::aggregate::{cumulate, price_span};
use super::normalize::SpanNormalizer;
use super::tree::{SpanIndex, TraceForest, build_forest};
use crate::data::types::{RawSpan, SpanNode};
use crate::data::{DataError, SpanRepository};
use crate::domain::pricing::PricingService;
use crate::utils::otlp::raw_spans_from_request;

pub struct TracePipeline {
    normalizer: SpanNormalizer,
    pricing: Option<Arc<PricingService>>,
    repository: Arc<dyn SpanRepository>,
}

impl TracePipeline {
    pub fn new(
        normalizer: SpanNormalizer,
        pricing: Option<Arc<PricingService>>,
        repository: Arc<dyn SpanRepository>,
    ) -> Self {
        Self {
            normalizer,
            pricing,
            repository,
        }
    }

    pub fn normalizer(&self) -> &SpanNormalizer {
        &self.normalizer
    }

    /// Stages 1-4: one aggregated forest per trace, in first-seen order.
    pub async fn process(&self, raws: &[RawSpan]) -> Vec<TraceForest> {
        if raws.is_empty() {
            return Vec::new();
        }
        if let Some(pricing) = &self.pricing {
            pricing.refresh_if_stale().await;
        }
        let pricing = self.pricing.as_deref();

        let mut order: Vec<String> = Vec::new();
        let mut traces: HashMap<String, SpanIndex> = HashMap::new();
        for span in self.normalizer.normalize_batch(raws) {
            let index = traces.entry(span.trace_id.clone()).or_insert_with(|| {
                order.push(span.trace_id.clone());
                SpanIndex::new()
            });
            index.insert(SpanNode::from(span));
        }

        order
            .into_iter()
            .filter_map(|trace_id| traces.remove(&trace_id))
            .map(|mut index| {
                for node in index.iter_mut() {
                    price_span(node, pricing);
                }
                let mut forest = build_forest(index);
                cumulate(&mut forest);
                forest
            })
            .collect()
    }

    /// All stages. Returns the stored forests.
    pub async fn ingest(&self, raws: &[RawSpan]) -> Result<Vec<TraceForest>, DataError> {
        let forests = self.process(raws).await;
        let spans: Vec<SpanNode> = forests
            .iter()
            .flat_map(|forest| forest.nodes().iter().cloned())
            .collect();
        if spans.is_empty() {
            return Ok(forests);
        }

        let stored = self.repository.create_spans(spans).await?;
        tracing::debug!(
            traces = forests.len(),
            spans = stored,
            version = self.normalizer.version(),
            "Ingested batch"
        );
        Ok(forests)
    }

    pub async fn ingest_otlp(
        &self,
        request: &ExportTraceServiceRequest,
    ) -> Result<Vec<TraceForest>, DataError> {
        self.ingest(&raw_spans_from_request(request)).await
    }
}
