//! In-memory span repository

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::data::error::DataError;
use crate::data::filters::FilterExpr;
use crate::data::traits::SpanRepository;
use crate::data::types::{SortOrder, SpanNode, Windowing};

type SpanKey = (String, String);

#[derive(Default)]
struct Store {
    spans: HashMap<SpanKey, (u64, SpanNode)>,
    next_seq: u64,
}

#[derive(Default)]
pub struct MemorySpanRepository {
    store: RwLock<Store>,
    max_spans: Option<usize>,
}

impl MemorySpanRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository that refuses writes adding spans beyond `max_spans`.
    /// Upserts of stored spans are always accepted.
    pub fn with_max_spans(max_spans: usize) -> Self {
        Self {
            store: RwLock::default(),
            max_spans: Some(max_spans),
        }
    }

    pub fn len(&self) -> usize {
        self.store.read().spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Deterministic position of a trace in `[0, 1)`, so sampling keeps or drops
/// whole traces.
pub fn sample_point(trace_id: &str) -> f64 {
    let hash = blake3::hash(trace_id.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&hash.as_bytes()[..8]);
    (u64::from_be_bytes(head) >> 11) as f64 / (1u64 << 53) as f64
}

fn in_window(node: &SpanNode, windowing: &Windowing) -> bool {
    let start = node.span.start_time;
    windowing.oldest.is_none_or(|oldest| start >= oldest)
        && windowing.newest.is_none_or(|newest| start < newest)
}

#[async_trait]
impl SpanRepository for MemorySpanRepository {
    async fn create_spans(&self, spans: Vec<SpanNode>) -> Result<u64, DataError> {
        let mut store = self.store.write();
        if let Some(max) = self.max_spans {
            let mut incoming: Vec<SpanKey> = spans
                .iter()
                .map(|node| (node.trace_id().to_string(), node.span_id().to_string()))
                .filter(|key| !store.spans.contains_key(key))
                .collect();
            incoming.sort_unstable();
            incoming.dedup();
            if store.spans.len() + incoming.len() > max {
                return Err(DataError::BackendUnavailable {
                    backend: "memory",
                    reason: format!(
                        "capacity of {} spans exceeded ({} stored, {} new)",
                        max,
                        store.spans.len(),
                        incoming.len()
                    ),
                });
            }
        }
        let mut written = 0;
        for node in spans {
            let key = (node.trace_id().to_string(), node.span_id().to_string());
            let existing = store.spans.get(&key).map(|(seq, _)| *seq);
            let seq = match existing {
                Some(seq) => seq,
                None => {
                    store.next_seq += 1;
                    store.next_seq
                }
            };
            store.spans.insert(key, (seq, node));
            written += 1;
        }
        Ok(written)
    }

    async fn read_spans_by_trace(&self, trace_id: &str) -> Result<Vec<SpanNode>, DataError> {
        let store = self.store.read();
        let mut spans: Vec<_> = store
            .spans
            .iter()
            .filter(|((trace, _), _)| trace == trace_id)
            .map(|(_, (seq, node))| (*seq, node.clone()))
            .collect();
        spans.sort_by_key(|(seq, _)| *seq);
        Ok(spans.into_iter().map(|(_, node)| node).collect())
    }

    async fn read_spans_by_filter(
        &self,
        filter: Option<&FilterExpr>,
        windowing: &Windowing,
    ) -> Result<(Vec<SpanNode>, u64), DataError> {
        let rate = windowing.rate.unwrap_or(1.0);
        let store = self.store.read();

        let mut selected: Vec<(u64, &SpanNode)> = store
            .spans
            .values()
            .filter(|(_, node)| in_window(node, windowing))
            .filter(|(_, node)| rate >= 1.0 || sample_point(node.trace_id()) < rate)
            .filter(|(_, node)| filter.is_none_or(|f| f.matches(node)))
            .map(|(seq, node)| (*seq, node))
            .collect();

        let order = windowing.order.unwrap_or_default();
        selected.sort_by(|(seq_a, a), (seq_b, b)| {
            let by_time = a.span.start_time.cmp(&b.span.start_time);
            let by_time = match order {
                SortOrder::Ascending => by_time,
                SortOrder::Descending => by_time.reverse(),
            };
            by_time.then(seq_a.cmp(seq_b))
        });

        let count = selected.len() as u64;
        let limit = windowing.limit.unwrap_or(usize::MAX);
        let spans = selected
            .into_iter()
            .take(limit)
            .map(|(_, node)| node.clone())
            .collect();
        Ok((spans, count))
    }

    async fn delete_spans(&self, span_ids: &[String]) -> Result<u64, DataError> {
        let mut store = self.store.write();
        let before = store.spans.len();
        store
            .spans
            .retain(|(_, span_id), _| !span_ids.contains(span_id));
        Ok((before - store.spans.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::filters::parse_filter;
    use crate::domain::semconv::LATEST_VERSION;
    use crate::domain::traces::normalize::SpanNormalizer;
    use chrono::{DateTime, Utc};
    use serde_json::json;

    const BASE_SECS: i64 = 1_700_000_000;

    fn at(offset_secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(BASE_SECS + offset_secs, 0).unwrap()
    }

    fn node(trace_id: &str, span_id: &str, offset_secs: i64) -> SpanNode {
        let raw = serde_json::from_value(json!({
            "trace_id": trace_id,
            "span_id": span_id,
            "name": format!("{}-{}", trace_id, span_id),
            "start_time": at(offset_secs).to_rfc3339(),
        }))
        .unwrap();
        let normalizer = SpanNormalizer::for_version(LATEST_VERSION).unwrap();
        SpanNode::from(normalizer.normalize(&raw))
    }

    async fn seeded() -> MemorySpanRepository {
        let repo = MemorySpanRepository::new();
        repo.create_spans(vec![
            node("t1", "a", 0),
            node("t1", "b", 10),
            node("t2", "c", 20),
            node("t3", "d", 30),
        ])
        .await
        .unwrap();
        repo
    }

    fn ids(spans: &[SpanNode]) -> Vec<&str> {
        spans.iter().map(SpanNode::span_id).collect()
    }

    #[tokio::test]
    async fn test_upsert_by_trace_and_span_id() {
        let repo = seeded().await;
        let mut replacement = node("t1", "a", 5);
        replacement.span.span_name = "renamed".into();
        repo.create_spans(vec![replacement]).await.unwrap();
        assert_eq!(repo.len(), 4);

        let spans = repo.read_spans_by_trace("t1").await.unwrap();
        assert_eq!(ids(&spans), ["a", "b"]);
        assert_eq!(spans[0].span.span_name, "renamed");
    }

    #[tokio::test]
    async fn test_window_and_order() {
        let repo = seeded().await;
        let windowing = Windowing {
            oldest: Some(at(10)),
            newest: Some(at(30)),
            ..Default::default()
        };
        let (spans, count) = repo.read_spans_by_filter(None, &windowing).await.unwrap();
        // oldest inclusive, newest exclusive, newest first
        assert_eq!(ids(&spans), ["c", "b"]);
        assert_eq!(count, 2);

        let ascending = Windowing {
            order: Some(SortOrder::Ascending),
            ..Default::default()
        };
        let (spans, _) = repo.read_spans_by_filter(None, &ascending).await.unwrap();
        assert_eq!(ids(&spans), ["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_count_before_limit() {
        let repo = seeded().await;
        let windowing = Windowing {
            limit: Some(1),
            ..Default::default()
        };
        let (spans, count) = repo.read_spans_by_filter(None, &windowing).await.unwrap();
        assert_eq!(ids(&spans), ["d"]);
        assert_eq!(count, 4);
    }

    #[tokio::test]
    async fn test_filter_applied() {
        let repo = seeded().await;
        let filter = parse_filter(&json!({
            "field": "trace_id", "operator": "in", "value": ["t1", "t3"]
        }))
        .unwrap();
        let (spans, count) = repo
            .read_spans_by_filter(Some(&filter), &Windowing::default())
            .await
            .unwrap();
        assert_eq!(count, 3);
        assert!(spans.iter().all(|s| s.trace_id() != "t2"));
    }

    #[tokio::test]
    async fn test_sampling_keeps_whole_traces() {
        let repo = MemorySpanRepository::new();
        let spans: Vec<_> = (0..200)
            .flat_map(|t| {
                let trace = format!("trace-{}", t);
                [node(&trace, "root", t), node(&trace, "child", t)]
            })
            .collect();
        repo.create_spans(spans).await.unwrap();

        let windowing = Windowing {
            rate: Some(0.5),
            ..Default::default()
        };
        let (sampled, count) = repo.read_spans_by_filter(None, &windowing).await.unwrap();
        assert_eq!(count as usize, sampled.len());
        assert!(count > 0 && count < 400);
        let mut per_trace: HashMap<&str, usize> = HashMap::new();
        for span in &sampled {
            *per_trace.entry(span.trace_id()).or_default() += 1;
        }
        assert!(per_trace.values().all(|&n| n == 2));

        let none = Windowing {
            rate: Some(0.0),
            ..Default::default()
        };
        assert_eq!(repo.read_spans_by_filter(None, &none).await.unwrap().1, 0);
    }

    #[test]
    fn test_sample_point_is_stable() {
        let p = sample_point("trace-42");
        assert_eq!(p, sample_point("trace-42"));
        assert!((0.0..1.0).contains(&p));
    }

    #[tokio::test]
    async fn test_delete_spans() {
        let repo = seeded().await;
        let removed = repo
            .delete_spans(&["a".to_string(), "d".to_string(), "zz".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(repo.len(), 2);
    }

    #[tokio::test]
    async fn test_capacity_limit_rejects_new_spans() {
        let repo = MemorySpanRepository::with_max_spans(2);
        repo.create_spans(vec![node("t1", "a", 0), node("t1", "b", 10)])
            .await
            .unwrap();

        // upserts of stored spans still fit
        assert_eq!(repo.create_spans(vec![node("t1", "a", 5)]).await.unwrap(), 1);

        let err = repo
            .create_spans(vec![node("t1", "b", 10), node("t2", "c", 20)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DataError::BackendUnavailable { backend: "memory", .. }
        ));
        assert!(err.to_string().contains("capacity of 2 spans"));
        // the rejected batch wrote nothing
        assert_eq!(repo.len(), 2);
    }
}
