//! Span filter expressions
//!
//! A filter is either a condition on one span field or a boolean group of
//! nested filters:
//!
//! ```json
//! {"operator": "and", "conditions": [
//!     {"field": "status_code", "operator": "is", "value": "error"},
//!     {"field": "attributes", "key": "ag.meta.request.model", "operator": "startswith", "value": "gpt-4"}
//! ]}
//! ```
//!
//! Expressions are validated once by [`parse_filter`] and then evaluated
//! against spans with [`FilterExpr::matches`].

mod matcher;
mod parser;
mod types;

pub use parser::{MAX_CONDITIONS, MAX_FILTER_DEPTH, MAX_FILTER_JSON_SIZE, parse_filter, parse_filter_str};
pub use types::{Condition, FilterError, FilterExpr, FilterField, FilterOp, GroupOp};
