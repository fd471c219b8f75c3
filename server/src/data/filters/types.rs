//! Filter type definitions

use serde::Deserialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Rejected filter expression. `code` is stable for callers to match on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct FilterError {
    pub code: &'static str,
    pub message: String,
}

impl FilterError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// A condition or a boolean group of sub-expressions.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FilterExpr {
    Group {
        operator: GroupOp,
        conditions: Vec<FilterExpr>,
    },
    Condition(Condition),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Condition {
    pub field: FilterField,
    /// Canonical attribute key, only for `attributes`
    #[serde(default)]
    pub key: Option<String>,
    pub operator: FilterOp,
    #[serde(default)]
    pub value: Option<JsonValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupOp {
    And,
    Or,
    /// Negation of the conjunction of its conditions
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterField {
    TraceId,
    SpanId,
    ParentId,
    SpanName,
    SpanKind,
    StatusCode,
    StartTime,
    EndTime,
    Attributes,
}

impl FilterField {
    pub fn is_timestamp(self) -> bool {
        matches!(self, Self::StartTime | Self::EndTime)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Is,
    IsNot,
    In,
    NotIn,
    Contains,
    #[serde(alias = "starts_with")]
    Startswith,
    #[serde(alias = "ends_with")]
    Endswith,
    Gt,
    Gte,
    Lt,
    Lte,
    Exists,
    NotExists,
}

impl FilterOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Is => "is",
            Self::IsNot => "is_not",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::Contains => "contains",
            Self::Startswith => "startswith",
            Self::Endswith => "endswith",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Exists => "exists",
            Self::NotExists => "not_exists",
        }
    }

    pub fn takes_value(self) -> bool {
        !matches!(self, Self::Exists | Self::NotExists)
    }

    pub fn is_ordering(self) -> bool {
        matches!(self, Self::Gt | Self::Gte | Self::Lt | Self::Lte)
    }

    pub fn is_text(self) -> bool {
        matches!(self, Self::Contains | Self::Startswith | Self::Endswith)
    }

    pub fn is_membership(self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }
}
