//! Data layer
//!
//! - `types` - Raw, canonical and query types shared across the crate
//! - `filters` - Filter expressions over span fields and `ag.*` attributes
//! - `traits` - Storage collaborator trait
//! - `memory` - In-memory reference backend
//! - `error` - Storage error type

pub mod error;
pub mod filters;
pub mod memory;
pub mod traits;
pub mod types;

pub use error::DataError;
pub use memory::MemorySpanRepository;
pub use traits::SpanRepository;
