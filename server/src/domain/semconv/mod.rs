//! Semantic convention mapping
//!
//! Translates attribute keys between vendor vocabularies and the canonical
//! `ag.*` namespace. Rules come in three classes, tried in order:
//!
//! 1. **exact**: full key equality
//! 2. **prefix**: the vendor prefix is swapped for the canonical one at a
//!    `.` boundary, the remainder of the key is kept verbatim
//! 3. **dynamic**: the value needs a computed transform (JSON decoding,
//!    field lifting, span-kind classification)
//!
//! Tables are versioned. Every version in [`tables::VERSIONS`] is compiled
//! once into a [`SemconvCodex`] and stays resolvable; [`LATEST_VERSION`] is
//! used for new ingestion.

mod tables;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde_json::{Map, Value as JsonValue, json};
use thiserror::Error;

use crate::data::types::{CANONICAL_PREFIX, SpanType};
use crate::utils::json::{decode_json_string, get_path};

pub use tables::{VERSIONS, VersionTable, VocabularyTable};

pub const LATEST_VERSION: &str = "0.4.1";

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum SemconvError {
    #[error("Unknown semantic convention version: {0}")]
    UnknownVersion(String),

    #[error("Unknown vocabulary: {0}")]
    UnknownVocabulary(String),
}

/// A single attribute that could not be translated. Callers drop the
/// attribute and continue with the rest of the span.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("Malformed attribute '{key}': {reason}")]
    MalformedAttribute { key: String, reason: String },
}

impl MappingError {
    fn malformed(key: &str, reason: impl Into<String>) -> Self {
        Self::MalformedAttribute {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

// ============================================================================
// VOCABULARIES AND RULES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vocabulary {
    /// Traceloop OpenLLMetry (`traceloop.*`, legacy `gen_ai.*`, `llm.*`)
    OpenLlmetry,
    /// Arize OpenInference (`input.value`, `llm.token_count.*`, ...)
    OpenInference,
    /// OpenTelemetry GenAI semantic conventions
    OtelGenAi,
}

impl Vocabulary {
    pub const ALL: [Vocabulary; 3] = [Self::OpenLlmetry, Self::OpenInference, Self::OtelGenAi];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenLlmetry => "openllmetry",
            Self::OpenInference => "openinference",
            Self::OtelGenAi => "otel-genai",
        }
    }
}

impl fmt::Display for Vocabulary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vocabulary {
    type Err = SemconvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openllmetry" | "traceloop" => Ok(Self::OpenLlmetry),
            "openinference" => Ok(Self::OpenInference),
            "otel-genai" | "otel_genai" | "genai" => Ok(Self::OtelGenAi),
            other => Err(SemconvError::UnknownVocabulary(other.to_string())),
        }
    }
}

/// Computed value transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicRule {
    /// Decode a JSON string and emit one of its fields.
    LiftJsonField {
        canonical: &'static str,
        field: &'static str,
    },
    /// Decode a JSON string. When not strict, text that is not JSON is
    /// passed through as a plain string.
    ParseJson {
        canonical: &'static str,
        strict: bool,
    },
    /// Classify a vendor span kind as a canonical span type.
    SpanType { canonical: &'static str },
}

impl DynamicRule {
    fn apply(&self, key: &str, value: &JsonValue) -> Result<Option<(String, JsonValue)>, MappingError> {
        match *self {
            Self::LiftJsonField { canonical, field } => {
                let decoded = match value {
                    JsonValue::String(s) => serde_json::from_str::<JsonValue>(s)
                        .map_err(|e| MappingError::malformed(key, e.to_string()))?,
                    other => other.clone(),
                };
                let JsonValue::Object(object) = decoded else {
                    return Err(MappingError::malformed(key, "expected a JSON object"));
                };
                Ok(get_path(&object, field).map(|lifted| (canonical.to_string(), lifted.clone())))
            }
            Self::ParseJson { canonical, strict } => {
                let parsed = match value {
                    JsonValue::String(s) if strict => serde_json::from_str::<JsonValue>(s)
                        .map_err(|e| MappingError::malformed(key, e.to_string()))?,
                    JsonValue::String(s) => decode_json_string(s).unwrap_or_else(|| value.clone()),
                    other => other.clone(),
                };
                Ok(Some((canonical.to_string(), parsed)))
            }
            Self::SpanType { canonical } => {
                let kind = value
                    .as_str()
                    .ok_or_else(|| MappingError::malformed(key, "span kind must be a string"))?;
                let span_type = classify_span_kind(kind).ok_or_else(|| {
                    MappingError::malformed(key, format!("unrecognized span kind '{}'", kind))
                })?;
                Ok(Some((canonical.to_string(), json!(span_type.as_str()))))
            }
        }
    }
}

/// Map a vendor span kind / operation name onto a canonical span type.
pub fn classify_span_kind(kind: &str) -> Option<SpanType> {
    let span_type = match kind.trim().to_ascii_lowercase().as_str() {
        "llm" | "chat" => SpanType::Chat,
        "text_completion" | "completion" | "generate_content" => SpanType::Completion,
        "embedding" | "embeddings" => SpanType::Embedding,
        "retriever" | "query" => SpanType::Query,
        "reranker" | "rerank" => SpanType::Rerank,
        "tool" | "execute_tool" => SpanType::Tool,
        "agent" | "invoke_agent" | "create_agent" => SpanType::Agent,
        "chain" => SpanType::Chain,
        "workflow" => SpanType::Workflow,
        "task" => SpanType::Task,
        "guardrail" => SpanType::Guardrail,
        "evaluator" => SpanType::Evaluator,
        "unknown" => SpanType::Unknown,
        _ => return None,
    };
    Some(span_type)
}

// ============================================================================
// COMPILED CODEX
// ============================================================================

#[derive(Debug, Default)]
struct CompiledVocabulary {
    ingest_exact: HashMap<&'static str, &'static str>,
    export_exact: HashMap<&'static str, &'static str>,
    /// `(vendor prefix, canonical prefix)`, longest vendor prefix first
    ingest_prefix: Vec<(&'static str, &'static str)>,
    /// `(canonical prefix, vendor prefix)`, longest canonical prefix first
    export_prefix: Vec<(&'static str, &'static str)>,
    dynamic: HashMap<&'static str, DynamicRule>,
}

impl CompiledVocabulary {
    fn compile(table: &VocabularyTable) -> Self {
        let mut compiled = Self::default();

        // Declaration order with overwriting inserts: the last declaration wins.
        for &(vendor, canonical) in table.exact {
            compiled.ingest_exact.insert(vendor, canonical);
            compiled.export_exact.insert(canonical, vendor);
        }

        let mut ingest_prefix: HashMap<&'static str, &'static str> = HashMap::new();
        let mut export_prefix: HashMap<&'static str, &'static str> = HashMap::new();
        for &(vendor, canonical) in table.prefix {
            ingest_prefix.insert(vendor, canonical);
            export_prefix.insert(canonical, vendor);
        }
        compiled.ingest_prefix = by_specificity(ingest_prefix);
        compiled.export_prefix = by_specificity(export_prefix);

        for &(vendor, rule) in table.dynamic {
            compiled.dynamic.insert(vendor, rule);
        }
        compiled
    }
}

fn by_specificity(rules: HashMap<&'static str, &'static str>) -> Vec<(&'static str, &'static str)> {
    let mut rules: Vec<_> = rules.into_iter().collect();
    rules.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));
    rules
}

/// Swap `from` for `to` when `key` equals `from` or continues it at a `.`.
fn replace_prefix(key: &str, from: &str, to: &str) -> Option<String> {
    let rest = key.strip_prefix(from)?;
    if rest.is_empty() || rest.starts_with('.') {
        Some(format!("{}{}", to, rest))
    } else {
        None
    }
}

/// Compiled lookup tables for one version.
#[derive(Debug)]
pub struct SemconvCodex {
    version: &'static str,
    vocabularies: HashMap<Vocabulary, CompiledVocabulary>,
}

impl SemconvCodex {
    pub fn compile(table: &VersionTable) -> Self {
        let mut vocabularies = HashMap::new();
        for vocabulary_table in table.vocabularies {
            vocabularies.insert(
                vocabulary_table.vocabulary,
                CompiledVocabulary::compile(vocabulary_table),
            );
        }
        Self {
            version: table.version,
            vocabularies,
        }
    }

    pub fn version(&self) -> &'static str {
        self.version
    }

    pub fn supports(&self, vocabulary: Vocabulary) -> bool {
        self.vocabularies.contains_key(&vocabulary)
    }

    /// Translate one vendor attribute into the canonical namespace.
    ///
    /// Keys already under `ag.` pass through untouched. `Ok(None)` means no
    /// rule matched (or a dynamic rule had nothing to emit).
    pub fn ingest(
        &self,
        vocabulary: Vocabulary,
        key: &str,
        value: &JsonValue,
    ) -> Result<Option<(String, JsonValue)>, MappingError> {
        if key.starts_with(CANONICAL_PREFIX) {
            return Ok(Some((key.to_string(), value.clone())));
        }
        let Some(rules) = self.vocabularies.get(&vocabulary) else {
            return Ok(None);
        };

        if let Some(canonical) = rules.ingest_exact.get(key) {
            return Ok(Some((canonical.to_string(), value.clone())));
        }
        for (vendor, canonical) in &rules.ingest_prefix {
            if let Some(mapped) = replace_prefix(key, vendor, canonical) {
                return Ok(Some((mapped, value.clone())));
            }
        }
        match rules.dynamic.get(key) {
            Some(rule) => rule.apply(key, value),
            None => Ok(None),
        }
    }

    /// Vendor spelling of a canonical key, if this vocabulary has one.
    pub fn export_key(&self, vocabulary: Vocabulary, canonical: &str) -> Option<String> {
        let rules = self.vocabularies.get(&vocabulary)?;
        if let Some(vendor) = rules.export_exact.get(canonical) {
            return Some(vendor.to_string());
        }
        rules
            .export_prefix
            .iter()
            .find_map(|(canonical_prefix, vendor)| replace_prefix(canonical, canonical_prefix, vendor))
    }

    /// Translate a canonical wire map into a vendor vocabulary. Keys with
    /// no vendor spelling keep their canonical name.
    pub fn export_attributes(
        &self,
        vocabulary: Vocabulary,
        wire: &Map<String, JsonValue>,
    ) -> Map<String, JsonValue> {
        wire.iter()
            .map(|(key, value)| {
                let exported = self
                    .export_key(vocabulary, key)
                    .unwrap_or_else(|| key.clone());
                (exported, value.clone())
            })
            .collect()
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

static REGISTRY: OnceLock<Vec<SemconvCodex>> = OnceLock::new();

fn registry() -> &'static [SemconvCodex] {
    REGISTRY.get_or_init(|| VERSIONS.iter().map(SemconvCodex::compile).collect())
}

/// Resolve a compiled codex by version.
pub fn codex(version: &str) -> Result<&'static SemconvCodex, SemconvError> {
    registry()
        .iter()
        .find(|c| c.version == version)
        .ok_or_else(|| SemconvError::UnknownVersion(version.to_string()))
}

pub fn available_versions() -> Vec<&'static str> {
    VERSIONS.iter().map(|t| t.version).collect()
}

#[cfg(test)]
#[path = "semconv_tests.rs"]
mod tests;
