//! Cost and token aggregation
//!
//! Incremental values are computed per span, then summed bottom-up over the
//! forest so each span's cumulative value covers its whole subtree.

use super::tree::TraceForest;
use crate::data::types::{SpanNode, TokenUsage, metric_paths};
use crate::domain::pricing::PricingService;

/// Token counts reported on the span. Total falls back to prompt + completion.
pub fn span_tokens(node: &SpanNode) -> TokenUsage {
    let prompt = node.span.metric_u64(metric_paths::PROMPT_TOKENS).unwrap_or(0);
    let completion = node
        .span
        .metric_u64(metric_paths::COMPLETION_TOKENS)
        .unwrap_or(0);
    let total = node
        .span
        .metric_u64(metric_paths::TOTAL_TOKENS)
        .unwrap_or(prompt.saturating_add(completion));
    TokenUsage {
        prompt,
        completion,
        total,
    }
}

/// Own cost of a span in USD.
///
/// A cost reported by the instrumentation wins. Otherwise the model is
/// priced from the table; no model, no tokens or no price gives zero.
pub fn span_cost(node: &SpanNode, tokens: TokenUsage, pricing: Option<&PricingService>) -> f64 {
    if let Some(reported) = node
        .span
        .metric_f64(metric_paths::REPORTED_COST)
        .filter(|c| c.is_finite() && *c >= 0.0)
    {
        return reported;
    }

    let Some(model) = node.span.model() else {
        if tokens.prompt > 0 || tokens.completion > 0 {
            tracing::trace!(span_id = %node.span_id(), "Token usage without model, cost is zero");
        }
        return 0.0;
    };
    if tokens.prompt == 0 && tokens.completion == 0 {
        return 0.0;
    }

    match pricing.and_then(|p| p.lookup(model)) {
        Some((price, match_type)) => {
            let cost = price.cost(tokens.prompt, tokens.completion);
            tracing::trace!(
                span_id = %node.span_id(),
                model,
                match_type = ?match_type,
                cost,
                "Calculated cost"
            );
            cost
        }
        None => {
            tracing::trace!(span_id = %node.span_id(), model, "No pricing found for model");
            0.0
        }
    }
}

/// Fill the incremental accumulators of one span.
pub fn price_span(node: &mut SpanNode, pricing: Option<&PricingService>) {
    let tokens = span_tokens(node);
    node.tokens.incremental = tokens;
    node.cost.incremental = span_cost(node, tokens, pricing);
    node.duration.incremental = node.span.duration_ms();
}

/// `cumulative = incremental + Σ children.cumulative`, children first, then
/// commit every accumulator into the metrics group.
pub fn cumulate(forest: &mut TraceForest) {
    for position in forest.bottom_up_order() {
        let (mut cost, mut tokens, mut duration) = {
            let node = &forest.nodes()[position];
            (
                node.cost.incremental,
                node.tokens.incremental,
                node.duration.incremental,
            )
        };
        for &child in forest.child_positions(position) {
            let child = &forest.nodes()[child];
            cost += child.cost.cumulative;
            tokens += child.tokens.cumulative;
            duration += child.duration.cumulative;
        }

        let node = forest.node_mut(position);
        node.cost.cumulative = cost;
        node.tokens.cumulative = tokens;
        node.duration.cumulative = duration;
        node.commit_metrics();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::TimeDelta;
    use serde_json::{Value as JsonValue, json};

    use crate::domain::pricing::{ModelPrice, PriceTable, StaticPricingSource};
    use crate::domain::semconv::LATEST_VERSION;
    use crate::domain::traces::normalize::SpanNormalizer;
    use crate::domain::traces::tree::{SpanIndex, build_forest};
    use crate::utils::json::get_path;
    use crate::utils::time::SystemClock;

    async fn gpt4_pricing() -> PricingService {
        let mut table = PriceTable::new();
        table.insert("gpt-4", ModelPrice::new(30.0, 60.0));
        let service = PricingService::new(
            Arc::new(StaticPricingSource::new(table)),
            TimeDelta::minutes(60),
            Arc::new(SystemClock),
        );
        service.refresh_if_stale().await;
        service
    }

    fn node(span_id: &str, parent: Option<&str>, offset_ms: u64, attributes: JsonValue) -> SpanNode {
        let normalizer = SpanNormalizer::for_version(LATEST_VERSION).unwrap();
        let start = 1_700_000_000_000_000_000u64 + offset_ms * 1_000_000;
        let raw = serde_json::from_value(json!({
            "trace_id": "trace-1",
            "span_id": span_id,
            "parent_id": parent,
            "name": span_id,
            "start_time": start,
            "end_time": start + 100_000_000,
            "attributes": attributes
        }))
        .unwrap();
        SpanNode::from(normalizer.normalize(&raw))
    }

    fn aggregate(mut nodes: Vec<SpanNode>, pricing: Option<&PricingService>) -> TraceForest {
        for node in &mut nodes {
            price_span(node, pricing);
        }
        let mut forest = build_forest(nodes.into_iter().collect::<SpanIndex>());
        cumulate(&mut forest);
        forest
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[tokio::test]
    async fn test_gpt4_two_span_scenario() {
        let pricing = gpt4_pricing().await;
        let forest = aggregate(
            vec![
                node(
                    "A",
                    None,
                    0,
                    json!({
                        "ag.meta.request.model": "gpt-4",
                        "ag.metrics.tokens.incremental.prompt": 10,
                        "ag.metrics.tokens.incremental.completion": 5
                    }),
                ),
                node(
                    "B",
                    Some("A"),
                    10,
                    json!({
                        "ag.meta.request.model": "gpt-4",
                        "ag.metrics.tokens.incremental.prompt": 2,
                        "ag.metrics.tokens.incremental.completion": 1
                    }),
                ),
            ],
            Some(&pricing),
        );

        let b = forest.get("B").unwrap();
        let expected = (2.0 * 30.0 + 1.0 * 60.0) / 1e6;
        assert!(approx(b.cost.incremental, expected));
        assert!(approx(b.cost.cumulative, expected));
        assert_eq!(b.tokens.incremental.total, 3);

        let a = forest.get("A").unwrap();
        let own = (10.0 * 30.0 + 5.0 * 60.0) / 1e6;
        assert!(approx(a.cost.incremental, own));
        assert!(approx(a.cost.cumulative, a.cost.incremental + b.cost.incremental));
        assert!(approx(a.cost.cumulative, own + expected));
        assert_eq!(a.tokens.cumulative.prompt, 12);
        assert_eq!(a.tokens.cumulative.completion, 6);
        assert_eq!(a.tokens.cumulative.total, 18);

        let committed = get_path(&a.span.metrics, "costs.cumulative.total")
            .and_then(JsonValue::as_f64)
            .unwrap();
        assert!(approx(committed, own + expected));
    }

    #[tokio::test]
    async fn test_huge_token_counts_saturate() {
        let pricing = gpt4_pricing().await;
        let usage = json!({
            "gen_ai.request.model": "gpt-4",
            "gen_ai.usage.prompt_tokens": 1e20,
            "gen_ai.usage.completion_tokens": 1e20
        });
        let forest = aggregate(
            vec![
                node("A", None, 0, usage.clone()),
                node("B", Some("A"), 1, usage),
            ],
            Some(&pricing),
        );

        let b = forest.get("B").unwrap();
        assert_eq!(b.tokens.incremental.total, u64::MAX);
        let a = forest.get("A").unwrap();
        assert_eq!(a.tokens.cumulative.prompt, u64::MAX);
        assert_eq!(a.tokens.cumulative.completion, u64::MAX);
        assert_eq!(a.tokens.cumulative.total, u64::MAX);
        assert!(a.cost.cumulative.is_finite());
    }

    #[tokio::test]
    async fn test_three_level_cumulation() {
        let pricing = gpt4_pricing().await;
        let usage = |prompt: u64, completion: u64| {
            json!({
                "ag.meta.response.model": "gpt-4",
                "ag.metrics.tokens.incremental.prompt": prompt,
                "ag.metrics.tokens.incremental.completion": completion
            })
        };
        let forest = aggregate(
            vec![
                node("root", None, 0, usage(10, 0)),
                node("mid", Some("root"), 1, usage(20, 5)),
                node("leaf1", Some("mid"), 2, usage(100, 50)),
                node("leaf2", Some("mid"), 3, usage(1, 1)),
            ],
            Some(&pricing),
        );

        let leaf_sum = forest.get("leaf1").unwrap().cost.cumulative
            + forest.get("leaf2").unwrap().cost.cumulative;
        let mid = forest.get("mid").unwrap();
        assert!(approx(mid.cost.cumulative, mid.cost.incremental + leaf_sum));
        assert_eq!(mid.tokens.cumulative.prompt, 121);

        let root = forest.get("root").unwrap();
        assert!(approx(root.cost.cumulative, root.cost.incremental + mid.cost.cumulative));
        assert_eq!(root.tokens.cumulative.prompt, 131);
        assert_eq!(root.tokens.cumulative.completion, 56);
        assert_eq!(root.tokens.cumulative.total, 187);
        assert!(approx(root.duration.cumulative, 400.0));
        assert!(approx(root.duration.incremental, 100.0));
    }

    #[tokio::test]
    async fn test_reported_cost_takes_precedence() {
        let pricing = gpt4_pricing().await;
        let forest = aggregate(
            vec![node(
                "s",
                None,
                0,
                json!({
                    "llm.model_name": "gpt-4",
                    "llm.token_count.prompt": 1000,
                    "llm.cost.total": 0.5
                }),
            )],
            Some(&pricing),
        );
        let span = forest.get("s").unwrap();
        assert_eq!(span.cost.incremental, 0.5);
        assert_eq!(span.tokens.incremental.prompt, 1000);
    }

    #[test]
    fn test_unpriceable_usage_is_zero() {
        let forest = aggregate(
            vec![
                node("no-model", None, 0, json!({"ag.metrics.tokens.incremental.prompt": 5})),
                node(
                    "no-table",
                    None,
                    1,
                    json!({
                        "ag.meta.request.model": "gpt-4",
                        "ag.metrics.tokens.incremental.prompt": 5
                    }),
                ),
            ],
            None,
        );
        assert_eq!(forest.get("no-model").unwrap().cost.cumulative, 0.0);
        assert_eq!(forest.get("no-table").unwrap().cost.cumulative, 0.0);
        assert_eq!(forest.get("no-table").unwrap().tokens.incremental.total, 5);
    }

    #[test]
    fn test_reported_total_tokens_kept() {
        let mut span = node(
            "s",
            None,
            0,
            json!({
                "ag.metrics.tokens.incremental.prompt": 2,
                "ag.metrics.tokens.incremental.completion": 1,
                "ag.metrics.tokens.incremental.total": 10
            }),
        );
        price_span(&mut span, None);
        assert_eq!(span.tokens.incremental.total, 10);
    }
}
