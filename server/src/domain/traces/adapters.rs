//! Attribute adapters
//!
//! Each adapter reads the raw attribute bag of a span and feeds canonical
//! pairs into the shared [`SpanFeatures`]. The chain order is fixed:
//! native canonical keys first, then one adapter per vendor vocabulary.

use serde_json::{Map, Value as JsonValue};

use super::features::SpanFeatures;
use crate::data::types::{CANONICAL_PREFIX, RawSpan};
use crate::domain::semconv::{SemconvCodex, Vocabulary};
use crate::utils::json::{flatten, flatten_into};

/// Root key of a nested (unflattened) canonical bag: `{"ag": {...}}`.
const CANONICAL_ROOT: &str = "ag";

pub trait SpanAdapter: Send + Sync {
    fn name(&self) -> &'static str;
    fn process(&self, span: &RawSpan, features: &mut SpanFeatures);
}

/// Build the standard chain for a codex version.
pub fn default_chain(codex: &'static SemconvCodex) -> Vec<Box<dyn SpanAdapter>> {
    let mut chain: Vec<Box<dyn SpanAdapter>> = vec![Box::new(NativeAdapter)];
    for vocabulary in Vocabulary::ALL {
        chain.push(Box::new(VendorAdapter::new(vocabulary, codex)));
    }
    chain
}

fn is_canonical(key: &str) -> bool {
    key == CANONICAL_ROOT || key.starts_with(CANONICAL_PREFIX)
}

// ============================================================================
// NATIVE
// ============================================================================

/// Passes through attributes already in the `ag.*` namespace, dotted or
/// nested.
#[derive(Debug, Default)]
pub struct NativeAdapter;

impl SpanAdapter for NativeAdapter {
    fn name(&self) -> &'static str {
        "native"
    }

    fn process(&self, span: &RawSpan, features: &mut SpanFeatures) {
        let canonical: Map<String, JsonValue> = span
            .attributes
            .iter()
            .filter(|(key, _)| is_canonical(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        for (key, value) in flatten(&canonical) {
            features.absorb(&key, value);
        }
    }
}

// ============================================================================
// VENDOR
// ============================================================================

/// Translates one vendor vocabulary through the semconv codex.
#[derive(Debug)]
pub struct VendorAdapter {
    vocabulary: Vocabulary,
    codex: &'static SemconvCodex,
}

impl VendorAdapter {
    pub fn new(vocabulary: Vocabulary, codex: &'static SemconvCodex) -> Self {
        Self { vocabulary, codex }
    }

    /// Returns whether a rule matched.
    fn translate(&self, span: &RawSpan, key: &str, value: &JsonValue, features: &mut SpanFeatures) -> bool {
        match self.codex.ingest(self.vocabulary, key, value) {
            Ok(Some((canonical, mapped))) => {
                features.absorb(&canonical, mapped);
                true
            }
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(
                    span_id = %span.span_id,
                    vocabulary = %self.vocabulary,
                    error = %e,
                    "Dropping attribute"
                );
                true
            }
        }
    }
}

impl SpanAdapter for VendorAdapter {
    fn name(&self) -> &'static str {
        self.vocabulary.as_str()
    }

    fn process(&self, span: &RawSpan, features: &mut SpanFeatures) {
        if !self.codex.supports(self.vocabulary) {
            return;
        }
        for (key, value) in &span.attributes {
            if is_canonical(key) || self.translate(span, key, value, features) {
                continue;
            }
            // Nested producers: retry on the dotted leaves
            if matches!(value, JsonValue::Object(m) if !m.is_empty())
                || matches!(value, JsonValue::Array(a) if !a.is_empty())
            {
                let mut leaves = Map::new();
                flatten_into(&mut leaves, key, value);
                for (leaf, leaf_value) in &leaves {
                    self.translate(span, leaf, leaf_value, features);
                }
            }
        }
    }
}
