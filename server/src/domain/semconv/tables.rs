//! Declarative mapping tables, one list per vocabulary and version.
//!
//! Each list is read top to bottom. When a vendor key (ingest) or a
//! canonical key (export) appears more than once, the last declaration wins.

use super::{DynamicRule, Vocabulary};

/// One vocabulary's rules within a table version.
#[derive(Debug)]
pub struct VocabularyTable {
    pub vocabulary: Vocabulary,
    /// `(vendor key, canonical key)`
    pub exact: &'static [(&'static str, &'static str)],
    /// `(vendor prefix, canonical prefix)`
    pub prefix: &'static [(&'static str, &'static str)],
    /// `(vendor key, transform)`
    pub dynamic: &'static [(&'static str, DynamicRule)],
}

#[derive(Debug)]
pub struct VersionTable {
    pub version: &'static str,
    pub vocabularies: &'static [VocabularyTable],
}

pub const VERSIONS: &[VersionTable] = &[V0_4_0, V0_4_1];

// ============================================================================
// 0.4.1 (latest)
// ============================================================================

pub const V0_4_1: VersionTable = VersionTable {
    version: "0.4.1",
    vocabularies: &[
        VocabularyTable {
            vocabulary: Vocabulary::OpenLlmetry,
            exact: &[
                ("gen_ai.system", "ag.meta.system"),
                ("gen_ai.request.model", "ag.meta.request.model"),
                ("gen_ai.response.model", "ag.meta.response.model"),
                ("gen_ai.request.max_tokens", "ag.meta.request.max_tokens"),
                ("gen_ai.request.temperature", "ag.meta.request.temperature"),
                ("gen_ai.request.top_p", "ag.meta.request.top_p"),
                ("llm.top_k", "ag.meta.request.top_k"),
                ("llm.frequency_penalty", "ag.meta.request.frequency_penalty"),
                ("llm.presence_penalty", "ag.meta.request.presence_penalty"),
                ("llm.is_streaming", "ag.meta.request.streaming"),
                ("llm.user", "ag.meta.request.user"),
                ("llm.request.type", "ag.meta.request.type"),
                ("gen_ai.usage.prompt_tokens", "ag.metrics.tokens.incremental.prompt"),
                (
                    "gen_ai.usage.completion_tokens",
                    "ag.metrics.tokens.incremental.completion",
                ),
                ("llm.usage.total_tokens", "ag.metrics.tokens.incremental.total"),
                ("traceloop.entity.name", "ag.meta.entity.name"),
                ("traceloop.workflow.name", "ag.meta.workflow.name"),
            ],
            prefix: &[
                ("gen_ai.prompt", "ag.data.inputs.prompt"),
                ("gen_ai.completion", "ag.data.outputs.completion"),
                ("llm.request.functions", "ag.meta.request.tools"),
                ("traceloop.association.properties", "ag.tags"),
            ],
            dynamic: &[
                (
                    "traceloop.entity.input",
                    DynamicRule::LiftJsonField {
                        canonical: "ag.data.inputs",
                        field: "inputs",
                    },
                ),
                (
                    "traceloop.entity.output",
                    DynamicRule::LiftJsonField {
                        canonical: "ag.data.outputs",
                        field: "outputs",
                    },
                ),
                (
                    "traceloop.span.kind",
                    DynamicRule::SpanType {
                        canonical: "ag.type.span",
                    },
                ),
            ],
        },
        VocabularyTable {
            vocabulary: Vocabulary::OpenInference,
            exact: &[
                ("embedding.model_name", "ag.meta.request.model"),
                ("llm.model_name", "ag.meta.request.model"),
                ("llm.provider", "ag.meta.provider"),
                ("llm.system", "ag.meta.system"),
                ("llm.token_count.prompt", "ag.metrics.tokens.incremental.prompt"),
                (
                    "llm.token_count.completion",
                    "ag.metrics.tokens.incremental.completion",
                ),
                ("llm.token_count.total", "ag.metrics.tokens.incremental.total"),
                ("llm.cost.total", "ag.metrics.costs.incremental.total"),
                ("session.id", "ag.refs.session.id"),
                ("user.id", "ag.refs.user.id"),
                ("input.mime_type", "ag.meta.input.mime_type"),
                ("output.mime_type", "ag.meta.output.mime_type"),
                ("tool.name", "ag.meta.tool.name"),
                ("tool.description", "ag.meta.tool.description"),
            ],
            prefix: &[
                ("llm.input_messages", "ag.data.inputs.prompt"),
                ("llm.output_messages", "ag.data.outputs.completion"),
                ("retrieval.documents", "ag.data.outputs.documents"),
                ("embedding.embeddings", "ag.data.outputs.embeddings"),
            ],
            dynamic: &[
                (
                    "input.value",
                    DynamicRule::ParseJson {
                        canonical: "ag.data.inputs",
                        strict: false,
                    },
                ),
                (
                    "output.value",
                    DynamicRule::ParseJson {
                        canonical: "ag.data.outputs",
                        strict: false,
                    },
                ),
                (
                    "llm.invocation_parameters",
                    DynamicRule::ParseJson {
                        canonical: "ag.meta.request.parameters",
                        strict: true,
                    },
                ),
                (
                    "metadata",
                    DynamicRule::ParseJson {
                        canonical: "ag.meta.metadata",
                        strict: true,
                    },
                ),
                (
                    "openinference.span.kind",
                    DynamicRule::SpanType {
                        canonical: "ag.type.span",
                    },
                ),
            ],
        },
        VocabularyTable {
            vocabulary: Vocabulary::OtelGenAi,
            exact: &[
                ("gen_ai.system", "ag.meta.system"),
                ("gen_ai.provider.name", "ag.meta.provider"),
                ("gen_ai.request.model", "ag.meta.request.model"),
                ("gen_ai.response.model", "ag.meta.response.model"),
                ("gen_ai.response.id", "ag.meta.response.id"),
                (
                    "gen_ai.response.finish_reasons",
                    "ag.meta.response.finish_reasons",
                ),
                ("gen_ai.request.temperature", "ag.meta.request.temperature"),
                ("gen_ai.request.top_p", "ag.meta.request.top_p"),
                ("gen_ai.request.top_k", "ag.meta.request.top_k"),
                ("gen_ai.request.max_tokens", "ag.meta.request.max_tokens"),
                (
                    "gen_ai.request.frequency_penalty",
                    "ag.meta.request.frequency_penalty",
                ),
                (
                    "gen_ai.request.presence_penalty",
                    "ag.meta.request.presence_penalty",
                ),
                ("gen_ai.request.stop_sequences", "ag.meta.request.stop"),
                ("gen_ai.request.seed", "ag.meta.request.seed"),
                // deprecated spellings first so export emits the current ones
                ("gen_ai.usage.prompt_tokens", "ag.metrics.tokens.incremental.prompt"),
                ("gen_ai.usage.input_tokens", "ag.metrics.tokens.incremental.prompt"),
                (
                    "gen_ai.usage.completion_tokens",
                    "ag.metrics.tokens.incremental.completion",
                ),
                (
                    "gen_ai.usage.output_tokens",
                    "ag.metrics.tokens.incremental.completion",
                ),
                ("gen_ai.agent.name", "ag.meta.agent.name"),
                ("gen_ai.agent.id", "ag.refs.agent.id"),
                ("gen_ai.tool.name", "ag.meta.tool.name"),
                ("gen_ai.tool.call.id", "ag.meta.tool.call_id"),
                ("gen_ai.conversation.id", "ag.refs.session.id"),
            ],
            prefix: &[],
            dynamic: &[
                (
                    "gen_ai.input.messages",
                    DynamicRule::ParseJson {
                        canonical: "ag.data.inputs.prompt",
                        strict: true,
                    },
                ),
                (
                    "gen_ai.output.messages",
                    DynamicRule::ParseJson {
                        canonical: "ag.data.outputs.completion",
                        strict: true,
                    },
                ),
                (
                    "gen_ai.system_instructions",
                    DynamicRule::ParseJson {
                        canonical: "ag.data.inputs.system",
                        strict: false,
                    },
                ),
                (
                    "gen_ai.operation.name",
                    DynamicRule::SpanType {
                        canonical: "ag.type.span",
                    },
                ),
            ],
        },
    ],
};

// ============================================================================
// 0.4.0 (kept resolvable for re-processing stored spans)
// ============================================================================

pub const V0_4_0: VersionTable = VersionTable {
    version: "0.4.0",
    vocabularies: &[
        VocabularyTable {
            vocabulary: Vocabulary::OpenLlmetry,
            exact: &[
                ("gen_ai.system", "ag.meta.system"),
                ("gen_ai.request.model", "ag.meta.request.model"),
                ("gen_ai.response.model", "ag.meta.response.model"),
                ("gen_ai.request.max_tokens", "ag.meta.request.max_tokens"),
                ("gen_ai.request.temperature", "ag.meta.request.temperature"),
                ("gen_ai.request.top_p", "ag.meta.request.top_p"),
                ("gen_ai.usage.prompt_tokens", "ag.metrics.tokens.incremental.prompt"),
                (
                    "gen_ai.usage.completion_tokens",
                    "ag.metrics.tokens.incremental.completion",
                ),
                ("llm.usage.total_tokens", "ag.metrics.tokens.incremental.total"),
            ],
            prefix: &[
                ("gen_ai.prompt", "ag.data.inputs.prompt"),
                ("gen_ai.completion", "ag.data.outputs.completion"),
            ],
            dynamic: &[
                (
                    "traceloop.entity.input",
                    DynamicRule::LiftJsonField {
                        canonical: "ag.data.inputs",
                        field: "inputs",
                    },
                ),
                (
                    "traceloop.entity.output",
                    DynamicRule::LiftJsonField {
                        canonical: "ag.data.outputs",
                        field: "outputs",
                    },
                ),
                (
                    "traceloop.span.kind",
                    DynamicRule::SpanType {
                        canonical: "ag.type.span",
                    },
                ),
            ],
        },
        VocabularyTable {
            vocabulary: Vocabulary::OpenInference,
            exact: &[
                ("llm.model_name", "ag.meta.request.model"),
                ("llm.token_count.prompt", "ag.metrics.tokens.incremental.prompt"),
                (
                    "llm.token_count.completion",
                    "ag.metrics.tokens.incremental.completion",
                ),
                ("llm.token_count.total", "ag.metrics.tokens.incremental.total"),
                ("session.id", "ag.refs.session.id"),
            ],
            prefix: &[
                ("llm.input_messages", "ag.data.inputs.prompt"),
                ("llm.output_messages", "ag.data.outputs.completion"),
            ],
            dynamic: &[
                (
                    "input.value",
                    DynamicRule::ParseJson {
                        canonical: "ag.data.inputs",
                        strict: false,
                    },
                ),
                (
                    "output.value",
                    DynamicRule::ParseJson {
                        canonical: "ag.data.outputs",
                        strict: false,
                    },
                ),
                (
                    "openinference.span.kind",
                    DynamicRule::SpanType {
                        canonical: "ag.type.span",
                    },
                ),
            ],
        },
    ],
};
