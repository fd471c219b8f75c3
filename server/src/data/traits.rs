//! Repository trait for span storage backends

use async_trait::async_trait;

use crate::data::error::DataError;
use crate::data::filters::FilterExpr;
use crate::data::types::{SpanNode, Windowing};

/// Storage collaborator for aggregated spans.
///
/// Spans are keyed by `(trace_id, span_id)`; writing an existing key
/// replaces it.
#[async_trait]
pub trait SpanRepository: Send + Sync {
    /// Upsert spans, returning how many were written.
    async fn create_spans(&self, spans: Vec<SpanNode>) -> Result<u64, DataError>;

    /// All spans of one trace in ingestion order.
    async fn read_spans_by_trace(&self, trace_id: &str) -> Result<Vec<SpanNode>, DataError>;

    /// Spans matching `filter` inside the window, sampled, ordered by start
    /// time and limited. The count is taken before the limit.
    async fn read_spans_by_filter(
        &self,
        filter: Option<&FilterExpr>,
        windowing: &Windowing,
    ) -> Result<(Vec<SpanNode>, u64), DataError>;

    /// Delete spans by span id, returning how many were removed.
    async fn delete_spans(&self, span_ids: &[String]) -> Result<u64, DataError>;
}
