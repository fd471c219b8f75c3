//! Query and analytics over stored spans
//!
//! Requests are validated up front; storage only sees well-formed filters
//! and windows. Node queries return flat spans, trace queries one forest
//! view per trace, analytics fixed-width time buckets.

mod buckets;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono_tz::Tz;
use thiserror::Error;

use crate::data::filters::{FilterError, FilterExpr, parse_filter};
use crate::data::types::{Bucket, Focus, QueryOutput, QueryRequest, SpanNode, TraceView, Windowing};
use crate::data::{DataError, SpanRepository};
use crate::domain::traces::{TraceForest, ViewProjection, build_forest};

pub use buckets::{
    BucketPlan, DAILY_INTERVAL_MINUTES, HOURLY_INTERVAL_MINUTES, MAX_BUCKETS,
    MAX_INTERVAL_MINUTES, default_interval, local_day_start,
};

// ============================================================================
// ERROR TYPE
// ============================================================================

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Invalid filter: {0}")]
    InvalidFilter(#[from] FilterError),
    #[error("Invalid windowing: {0}")]
    InvalidWindowing(String),
    #[error("Storage error: {0}")]
    Storage(#[from] DataError),
}

impl QueryError {
    fn windowing(message: impl Into<String>) -> Self {
        Self::InvalidWindowing(message.into())
    }
}

/// A request that passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedQuery {
    pub filter: Option<FilterExpr>,
    pub windowing: Windowing,
    pub timezone: Tz,
}

// ============================================================================
// QUERY SERVICE
// ============================================================================

pub struct QueryService {
    repository: Arc<dyn SpanRepository>,
    default_timezone: Tz,
}

impl QueryService {
    pub fn new(repository: Arc<dyn SpanRepository>) -> Self {
        Self {
            repository,
            default_timezone: Tz::UTC,
        }
    }

    /// Timezone used when a request does not name one.
    pub fn with_default_timezone(mut self, timezone: Tz) -> Self {
        self.default_timezone = timezone;
        self
    }

    pub fn validate(&self, request: &QueryRequest) -> Result<ValidatedQuery, QueryError> {
        let filter = request.filter.as_ref().map(parse_filter).transpose()?;
        let windowing = &request.windowing;

        if let Some(interval) = windowing.interval
            && !(1..=MAX_INTERVAL_MINUTES).contains(&interval)
        {
            return Err(QueryError::windowing(format!(
                "interval must be between 1 and {} minutes, got {}",
                MAX_INTERVAL_MINUTES, interval
            )));
        }
        if let Some(rate) = windowing.rate
            && !(0.0..=1.0).contains(&rate)
        {
            return Err(QueryError::windowing(format!(
                "rate must be within [0, 1], got {}",
                rate
            )));
        }
        if let (Some(oldest), Some(newest)) = (windowing.oldest, windowing.newest)
            && oldest >= newest
        {
            return Err(QueryError::windowing("oldest must be before newest"));
        }
        if windowing.limit == Some(0) {
            return Err(QueryError::windowing("limit must be positive"));
        }
        let timezone = match windowing.timezone.as_deref() {
            Some(name) => Tz::from_str(name)
                .map_err(|_| QueryError::windowing(format!("unknown timezone: {}", name)))?,
            None => self.default_timezone,
        };

        Ok(ValidatedQuery {
            filter,
            windowing: windowing.clone(),
            timezone,
        })
    }

    pub async fn query(&self, request: &QueryRequest) -> Result<(QueryOutput, u64), QueryError> {
        let validated = self.validate(request)?;
        let (spans, total) = self
            .repository
            .read_spans_by_filter(validated.filter.as_ref(), &validated.windowing)
            .await?;

        let output = match request.grouping.focus {
            Focus::Node => QueryOutput::Node(spans),
            Focus::Trace => QueryOutput::Trace(trace_views(spans)),
        };
        tracing::debug!(returned = output.len(), total, "Query complete");
        Ok((output, total))
    }

    pub async fn analytics(&self, request: &QueryRequest) -> Result<(Vec<Bucket>, u64), QueryError> {
        let mut validated = self.validate(request)?;
        validated.windowing.limit = None;

        let (spans, total) = self
            .repository
            .read_spans_by_filter(validated.filter.as_ref(), &validated.windowing)
            .await?;

        let observed = || spans.iter().map(|s| s.span.start_time);
        let oldest = validated.windowing.oldest.or_else(|| observed().min());
        let newest = validated
            .windowing
            .newest
            .or_else(|| observed().max().map(|t| t + chrono::TimeDelta::nanoseconds(1)));
        let (Some(oldest), Some(newest)) = (oldest, newest) else {
            return Ok((Vec::new(), total));
        };
        if oldest >= newest {
            return Ok((Vec::new(), total));
        }

        let interval = validated
            .windowing
            .interval
            .unwrap_or_else(|| default_interval(newest - oldest));
        let plan = BucketPlan::new(oldest, newest, interval, validated.timezone).ok_or_else(|| {
            QueryError::windowing(format!("more than {} buckets requested", MAX_BUCKETS))
        })?;

        Ok((plan.fill(&spans), total))
    }

    /// Forest of one trace.
    pub async fn read_trace(&self, trace_id: &str) -> Result<TraceForest, QueryError> {
        let spans = self.repository.read_spans_by_trace(trace_id).await?;
        Ok(build_forest(spans.into_iter().collect()))
    }

    pub async fn delete_spans(&self, span_ids: &[String]) -> Result<u64, QueryError> {
        Ok(self.repository.delete_spans(span_ids).await?)
    }
}

/// Group spans by trace (first-seen order) and build one view per trace.
fn trace_views(spans: Vec<SpanNode>) -> Vec<TraceView> {
    let mut order: Vec<String> = Vec::new();
    let mut grouped: HashMap<String, Vec<SpanNode>> = HashMap::new();
    for span in spans {
        let trace_id = span.trace_id().to_string();
        grouped
            .entry(trace_id.clone())
            .or_insert_with(|| {
                order.push(trace_id);
                Vec::new()
            })
            .push(span);
    }

    order
        .into_iter()
        .filter_map(|trace_id| {
            let spans = grouped.remove(&trace_id)?;
            let forest = build_forest(spans.into_iter().collect());
            Some(TraceView {
                roots: forest.to_view(ViewProjection::default()),
                trace_id,
            })
        })
        .collect()
}

#[cfg(test)]
#[path = "query_tests.rs"]
mod tests;
