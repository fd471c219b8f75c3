use super::*;
use crate::data::MemorySpanRepository;
use crate::domain::semconv::LATEST_VERSION;
use crate::domain::traces::aggregate::price_span;
use crate::domain::traces::normalize::SpanNormalizer;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::{Value as JsonValue, json};

fn midnight() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn node(trace_id: &str, span_id: &str, parent: Option<&str>, minutes: i64, attributes: JsonValue) -> SpanNode {
    let start = midnight() + TimeDelta::minutes(minutes);
    let raw = serde_json::from_value(json!({
        "trace_id": trace_id,
        "span_id": span_id,
        "parent_id": parent,
        "name": span_id,
        "start_time": start.to_rfc3339(),
        "end_time": (start + TimeDelta::seconds(2)).to_rfc3339(),
        "attributes": attributes
    }))
    .unwrap();
    let normalizer = SpanNormalizer::for_version(LATEST_VERSION).unwrap();
    let mut node = SpanNode::from(normalizer.normalize(&raw));
    price_span(&mut node, None);
    node
}

async fn service_with(spans: Vec<SpanNode>) -> QueryService {
    let repository = Arc::new(MemorySpanRepository::new());
    repository.create_spans(spans).await.unwrap();
    QueryService::new(repository)
}

fn request(value: JsonValue) -> QueryRequest {
    serde_json::from_value(value).unwrap()
}

fn sample_spans() -> Vec<SpanNode> {
    vec![
        node("t1", "root", None, 5, json!({})),
        node(
            "t1",
            "llm",
            Some("root"),
            6,
            json!({"ag.metrics.tokens.incremental.prompt": 10, "ag.metrics.costs.incremental.total": 0.25}),
        ),
        node("t2", "solo", None, 70, json!({"ag.metrics.tokens.incremental.prompt": 5})),
    ]
}

// ========================================================================
// Validation
// ========================================================================

#[tokio::test]
async fn test_validation_rejections() {
    let service = service_with(Vec::new()).await;
    for (body, windowing_error) in [
        (json!({"filter": {"field": "nope", "operator": "is"}}), false),
        (json!({"windowing": {"interval": 0}}), true),
        (json!({"windowing": {"interval": -5}}), true),
        (json!({"windowing": {"rate": 1.5}}), true),
        (json!({"windowing": {"rate": -0.1}}), true),
        (
            json!({"windowing": {"oldest": "2024-01-02T00:00:00Z", "newest": "2024-01-01T00:00:00Z"}}),
            true,
        ),
        (json!({"windowing": {"timezone": "Mars/Olympus"}}), true),
        (json!({"windowing": {"limit": 0}}), true),
    ] {
        let err = service.query(&request(body.clone())).await.unwrap_err();
        if windowing_error {
            assert!(matches!(err, QueryError::InvalidWindowing(_)), "{body}: {err}");
        } else {
            assert!(matches!(err, QueryError::InvalidFilter(_)), "{body}: {err}");
        }
    }
}

#[test]
fn test_validate_resolves_timezone() {
    let service = QueryService::new(Arc::new(MemorySpanRepository::new()))
        .with_default_timezone(chrono_tz::Europe::Berlin);
    let validated = service.validate(&request(json!({}))).unwrap();
    assert_eq!(validated.timezone, chrono_tz::Europe::Berlin);
    let validated = service
        .validate(&request(json!({"windowing": {"timezone": "Asia/Tokyo"}})))
        .unwrap();
    assert_eq!(validated.timezone, chrono_tz::Asia::Tokyo);
}

// ========================================================================
// Query
// ========================================================================

#[tokio::test]
async fn test_node_focus_returns_flat_spans() {
    let service = service_with(sample_spans()).await;
    let (output, total) = service
        .query(&request(json!({"windowing": {"limit": 2}})))
        .await
        .unwrap();
    assert_eq!(total, 3);
    let QueryOutput::Node(spans) = output else {
        panic!("expected node output");
    };
    // newest first by default
    assert_eq!(spans[0].span_id(), "solo");
    assert_eq!(spans.len(), 2);
}

#[tokio::test]
async fn test_trace_focus_groups_by_trace() {
    let service = service_with(sample_spans()).await;
    let (output, total) = service
        .query(&request(json!({
            "grouping": {"focus": "trace"},
            "windowing": {"order": "ascending"}
        })))
        .await
        .unwrap();
    assert_eq!(total, 3);
    let QueryOutput::Trace(traces) = output else {
        panic!("expected trace output");
    };
    let ids: Vec<_> = traces.iter().map(|t| t.trace_id.as_str()).collect();
    assert_eq!(ids, ["t1", "t2"]);
    assert!(traces[0].roots["root"]["children"]["llm"].is_object());
    assert!(traces[1].roots.contains_key("solo"));
}

#[tokio::test]
async fn test_filtered_query() {
    let service = service_with(sample_spans()).await;
    let (output, total) = service
        .query(&request(json!({
            "filter": {"field": "attributes", "key": "ag.metrics.tokens.incremental.prompt", "operator": "gte", "value": 10}
        })))
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(output.len(), 1);
}

#[tokio::test]
async fn test_read_trace_and_delete() {
    let service = service_with(sample_spans()).await;
    let forest = service.read_trace("t1").await.unwrap();
    assert_eq!(forest.root_ids(), ["root"]);
    assert_eq!(forest.len(), 2);

    assert_eq!(service.delete_spans(&["llm".to_string()]).await.unwrap(), 1);
    assert_eq!(service.read_trace("t1").await.unwrap().len(), 1);
    assert!(service.read_trace("missing").await.unwrap().is_empty());
}

// ========================================================================
// Analytics
// ========================================================================

#[tokio::test]
async fn test_empty_day_gives_24_zero_buckets() {
    let service = service_with(Vec::new()).await;
    let (buckets, total) = service
        .analytics(&request(json!({
            "windowing": {"oldest": "2024-01-01T00:00:00Z", "newest": "2024-01-02T00:00:00Z"}
        })))
        .await
        .unwrap();
    assert_eq!(total, 0);
    assert_eq!(buckets.len(), 24);
    assert!(buckets.iter().all(Bucket::is_empty));
    assert_eq!(buckets[0].timestamp, midnight());
    assert_eq!(buckets[23].timestamp, midnight() + TimeDelta::hours(23));
    assert!(buckets.iter().all(|b| b.interval_minutes == 60));
}

#[tokio::test]
async fn test_analytics_counts_incremental_values() {
    let service = service_with(sample_spans()).await;
    let (buckets, total) = service
        .analytics(&request(json!({
            "windowing": {
                "oldest": "2024-01-01T00:00:00Z",
                "newest": "2024-01-01T03:00:00Z",
                "limit": 1
            }
        })))
        .await
        .unwrap();
    assert_eq!(total, 3);
    assert_eq!(buckets.len(), 3);

    let first = &buckets[0];
    assert_eq!(first.count, 2);
    assert_eq!(first.cost, 0.25);
    assert_eq!(first.tokens.prompt, 10);
    assert_eq!(first.duration_ms, 4000.0);
    assert_eq!(first.avg_duration_ms, 2000.0);

    assert_eq!(buckets[1].count, 1);
    assert_eq!(buckets[1].tokens.prompt, 5);
    assert!(buckets[2].is_empty());
}

#[tokio::test]
async fn test_analytics_derives_missing_bounds() {
    let service = service_with(sample_spans()).await;
    let (buckets, _) = service.analytics(&request(json!({}))).await.unwrap();
    // spans at 00:05 and 01:10, hourly buckets from midnight
    assert_eq!(buckets.len(), 2);
    assert_eq!(buckets[0].timestamp, midnight());
    assert_eq!(buckets.iter().map(|b| b.count).sum::<u64>(), 3);

    let empty = service_with(Vec::new()).await;
    let (buckets, total) = empty.analytics(&request(json!({}))).await.unwrap();
    assert!(buckets.is_empty());
    assert_eq!(total, 0);
}

#[tokio::test]
async fn test_analytics_timezone_alignment() {
    let service = service_with(Vec::new()).await;
    let (buckets, _) = service
        .analytics(&request(json!({
            "windowing": {
                "oldest": "2024-01-01T00:00:00Z",
                "newest": "2024-01-04T00:00:00Z",
                "timezone": "America/New_York"
            }
        })))
        .await
        .unwrap();
    // daily buckets start at New York midnight (05:00Z) of Dec 31
    assert_eq!(buckets[0].interval_minutes, 1440);
    assert_eq!(
        buckets[0].timestamp,
        midnight() - TimeDelta::hours(19)
    );
    assert_eq!(buckets.len(), 4);
}

#[tokio::test]
async fn test_analytics_rejects_excessive_buckets() {
    let service = service_with(Vec::new()).await;
    let err = service
        .analytics(&request(json!({
            "windowing": {
                "oldest": "2024-01-01T00:00:00Z",
                "newest": "2025-01-01T00:00:00Z",
                "interval": 1
            }
        })))
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::InvalidWindowing(_)));
}

// ========================================================================
// Storage failures
// ========================================================================

struct UnavailableRepository;

#[async_trait]
impl SpanRepository for UnavailableRepository {
    async fn create_spans(&self, _spans: Vec<SpanNode>) -> Result<u64, DataError> {
        Err(unavailable())
    }

    async fn read_spans_by_trace(&self, _trace_id: &str) -> Result<Vec<SpanNode>, DataError> {
        Err(unavailable())
    }

    async fn read_spans_by_filter(
        &self,
        _filter: Option<&FilterExpr>,
        _windowing: &Windowing,
    ) -> Result<(Vec<SpanNode>, u64), DataError> {
        Err(unavailable())
    }

    async fn delete_spans(&self, _span_ids: &[String]) -> Result<u64, DataError> {
        Err(unavailable())
    }
}

fn unavailable() -> DataError {
    DataError::BackendUnavailable {
        backend: "test",
        reason: "offline".into(),
    }
}

#[tokio::test]
async fn test_storage_errors_propagate() {
    let service = QueryService::new(Arc::new(UnavailableRepository));
    assert!(matches!(
        service.query(&QueryRequest::default()).await,
        Err(QueryError::Storage(_))
    ));
    assert!(matches!(
        service.read_trace("t").await,
        Err(QueryError::Storage(_))
    ));
}
