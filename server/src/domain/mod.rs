//! Domain logic for agent trace processing
//!
//! - `semconv` - Vendor ↔ canonical attribute vocabularies, per version
//! - `traces` - Normalization, tree building, cost aggregation pipeline
//! - `pricing` - Model price tables and cost calculation
//! - `query` - Span queries and time-bucketed analytics

pub mod pricing;
pub mod query;
pub mod semconv;
pub mod traces;

pub use pricing::PricingService;
pub use query::QueryService;
pub use traces::TracePipeline;
