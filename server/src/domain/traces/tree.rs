//! Trace tree reconstruction
//!
//! Spans live in an arena (`Vec<SpanNode>`) addressed by position; the
//! forest only stores positions. Building happens in two passes:
//!
//! 1. **Skeleton**: spans are visited by start time (ties broken by
//!    ingestion order). A span attaches to its parent only if the parent is
//!    already in the skeleton, otherwise it becomes a root. A span can never
//!    end up below itself, so cyclic parent references cannot loop.
//! 2. **Hydration**: a FIFO queue walks the skeleton from the roots. Every
//!    child is discovered after its parent, so replaying the discovery order
//!    backwards assembles views bottom-up without recursion.

use std::collections::{HashMap, VecDeque};

use serde_json::{Map, Value as JsonValue, json};

use crate::data::types::SpanNode;

// ============================================================================
// SPAN INDEX
// ============================================================================

/// Span id → node, unique keys, ingestion order remembered by position.
#[derive(Debug, Default, Clone)]
pub struct SpanIndex {
    nodes: Vec<SpanNode>,
    positions: HashMap<String, usize>,
}

impl SpanIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node. A duplicate span id replaces the earlier node in place
    /// and the earlier node is returned.
    pub fn insert(&mut self, node: SpanNode) -> Option<SpanNode> {
        if let Some(&position) = self.positions.get(node.span_id()) {
            tracing::debug!(span_id = %node.span_id(), "Duplicate span id, keeping latest");
            return Some(std::mem::replace(&mut self.nodes[position], node));
        }
        self.positions
            .insert(node.span_id().to_string(), self.nodes.len());
        self.nodes.push(node);
        None
    }

    pub fn get(&self, span_id: &str) -> Option<&SpanNode> {
        self.positions.get(span_id).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, span_id: &str) -> bool {
        self.positions.contains_key(span_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SpanNode> {
        self.nodes.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SpanNode> {
        self.nodes.iter_mut()
    }

    pub fn into_nodes(self) -> Vec<SpanNode> {
        self.nodes
    }
}

impl FromIterator<SpanNode> for SpanIndex {
    fn from_iter<I: IntoIterator<Item = SpanNode>>(iter: I) -> Self {
        let mut index = Self::new();
        for node in iter {
            index.insert(node);
        }
        index
    }
}

// ============================================================================
// FOREST
// ============================================================================

/// Which span groups a hydrated view carries.
#[derive(Debug, Clone, Copy)]
pub struct ViewProjection {
    pub data: bool,
    pub metrics: bool,
    pub meta: bool,
}

impl Default for ViewProjection {
    fn default() -> Self {
        Self {
            data: true,
            metrics: true,
            meta: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TraceForest {
    nodes: Vec<SpanNode>,
    positions: HashMap<String, usize>,
    children: Vec<Vec<usize>>,
    roots: Vec<usize>,
}

/// Reconstruct the parent/child forest of one span index.
pub fn build_forest(index: SpanIndex) -> TraceForest {
    let SpanIndex { nodes, positions } = index;

    let mut order: Vec<usize> = (0..nodes.len()).collect();
    order.sort_by(|&a, &b| nodes[a].span.start_time.cmp(&nodes[b].span.start_time).then(a.cmp(&b)));

    let mut inserted = vec![false; nodes.len()];
    let mut children = vec![Vec::new(); nodes.len()];
    let mut roots = Vec::new();

    for i in order {
        let parent = nodes[i]
            .parent_id()
            .and_then(|pid| positions.get(pid).copied())
            .filter(|&p| inserted[p]);

        match parent {
            Some(p) => children[p].push(i),
            None => {
                if let Some(pid) = nodes[i].parent_id() {
                    tracing::debug!(
                        span_id = %nodes[i].span_id(),
                        parent_id = %pid,
                        "Unresolved parent, promoting span to root"
                    );
                }
                roots.push(i);
            }
        }
        inserted[i] = true;
    }

    TraceForest {
        nodes,
        positions,
        children,
        roots,
    }
}

impl TraceForest {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> impl Iterator<Item = &SpanNode> {
        self.roots.iter().map(|&i| &self.nodes[i])
    }

    pub fn root_ids(&self) -> Vec<&str> {
        self.roots().map(SpanNode::span_id).collect()
    }

    pub fn get(&self, span_id: &str) -> Option<&SpanNode> {
        self.positions.get(span_id).map(|&i| &self.nodes[i])
    }

    /// Children of a span, in start-time order.
    pub fn children(&self, span_id: &str) -> Vec<&SpanNode> {
        self.positions
            .get(span_id)
            .map(|&i| self.children[i].iter().map(|&c| &self.nodes[c]).collect())
            .unwrap_or_default()
    }

    pub fn nodes(&self) -> &[SpanNode] {
        &self.nodes
    }

    pub fn into_nodes(self) -> Vec<SpanNode> {
        self.nodes
    }

    pub(crate) fn node_mut(&mut self, position: usize) -> &mut SpanNode {
        &mut self.nodes[position]
    }

    pub(crate) fn child_positions(&self, position: usize) -> &[usize] {
        &self.children[position]
    }

    /// Breadth-first discovery order from the roots.
    pub fn discovery_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut queue: VecDeque<usize> = self.roots.iter().copied().collect();
        while let Some(position) = queue.pop_front() {
            order.push(position);
            queue.extend(self.children[position].iter().copied());
        }
        order
    }

    /// Every child precedes its parent.
    pub fn bottom_up_order(&self) -> Vec<usize> {
        let mut order = self.discovery_order();
        order.reverse();
        order
    }

    /// Hydrated view: root span id → subtree.
    ///
    /// Children are keyed by span name. A name shared by several siblings
    /// maps to a list in start-time order, a unique name to a single subtree.
    pub fn to_view(&self, projection: ViewProjection) -> Map<String, JsonValue> {
        let mut views: Vec<Option<JsonValue>> = vec![None; self.nodes.len()];

        for position in self.bottom_up_order() {
            let mut grouped: Map<String, JsonValue> = Map::new();
            for &child in &self.children[position] {
                let Some(view) = views[child].take() else {
                    continue;
                };
                let name = self.nodes[child].span.span_name.clone();
                match grouped.get_mut(&name) {
                    Some(JsonValue::Array(siblings)) => siblings.push(view),
                    Some(single) => {
                        let first = single.take();
                        *single = JsonValue::Array(vec![first, view]);
                    }
                    None => {
                        grouped.insert(name, view);
                    }
                }
            }
            views[position] = Some(node_view(&self.nodes[position], projection, grouped));
        }

        self.roots
            .iter()
            .filter_map(|&root| {
                views[root]
                    .take()
                    .map(|view| (self.nodes[root].span_id().to_string(), view))
            })
            .collect()
    }
}

fn node_view(
    node: &SpanNode,
    projection: ViewProjection,
    children: Map<String, JsonValue>,
) -> JsonValue {
    let span = &node.span;
    let mut view = Map::new();
    view.insert("span_id".into(), json!(span.span_id));
    view.insert("span_name".into(), json!(span.span_name));
    if let Some(span_type) = span.types.span {
        view.insert("type".into(), json!(span_type.as_str()));
    }
    view.insert("start_time".into(), json!(span.start_time));
    view.insert("end_time".into(), json!(span.end_time));
    view.insert("status_code".into(), json!(span.status_code.as_str()));
    if projection.data && !span.data.is_empty() {
        view.insert("data".into(), JsonValue::Object(span.data.clone()));
    }
    if projection.metrics && !span.metrics.is_empty() {
        view.insert("metrics".into(), JsonValue::Object(span.metrics.clone()));
    }
    if projection.meta && !span.meta.is_empty() {
        view.insert("meta".into(), JsonValue::Object(span.meta.clone()));
    }
    if !children.is_empty() {
        view.insert("children".into(), JsonValue::Object(children));
    }
    JsonValue::Object(view)
}

#[cfg(test)]
#[path = "tree_tests.rs"]
mod tests;
