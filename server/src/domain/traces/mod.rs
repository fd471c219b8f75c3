//! Trace processing
//!
//! - `normalize` - RawSpan → CanonicalAttributes through the adapter chain
//! - `adapters` - Native and per-vocabulary attribute adapters
//! - `features` - Per-span feature group accumulator
//! - `tree` - Span index and parent/child forest
//! - `aggregate` - Per-span cost/tokens and bottom-up cumulation
//! - `pipeline` - Pipeline orchestrator

mod adapters;
pub mod aggregate;
mod features;
pub mod normalize;
mod pipeline;
pub mod tree;

pub use normalize::SpanNormalizer;
pub use pipeline::TracePipeline;
pub use tree::{SpanIndex, TraceForest, ViewProjection, build_forest};
