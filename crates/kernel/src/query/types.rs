//! Query vocabulary types.
//!
//! Provides the pieces shared by the catalog, the dispatcher, and executors:
//! - Operator: the fixed set of comparison operators
//! - DynamicQuery: the untyped constraint/order/select descriptor
//! - QueryLimits: row-count limits enforced by executors

use serde::{Deserialize, Serialize};

/// Suffix marking a query class that has no declared query interface.
pub const DYNAMIC_QUERY_SUFFIX: &str = "DynamicQuery";

/// Whether a query class name refers to a dynamic-only query.
pub fn is_dynamic_query_class(query_class: &str) -> bool {
    query_class.ends_with(DYNAMIC_QUERY_SUFFIX)
}

/// Comparison operators for constraints.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Exact match.
    Eq,
    /// Exact match, or the field is NULL.
    EqOrIsNull,
    /// Greater than or equal.
    Ge,
    /// Greater than.
    Gt,
    /// Not equal.
    Ne,
    /// Value in list.
    In,
    /// Value not in list.
    NotIn,
    /// Field is not NULL.
    IsNotNull,
    /// Field is NULL.
    IsNull,
}

impl Operator {
    /// All operators, in declaration order.
    pub const ALL: [Operator; 11] = [
        Operator::Lt,
        Operator::Le,
        Operator::Eq,
        Operator::EqOrIsNull,
        Operator::Ge,
        Operator::Gt,
        Operator::Ne,
        Operator::In,
        Operator::NotIn,
        Operator::IsNotNull,
        Operator::IsNull,
    ];

    /// Wire name (`EQ`, `NOT_IN`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Lt => "LT",
            Operator::Le => "LE",
            Operator::Eq => "EQ",
            Operator::EqOrIsNull => "EQ_OR_IS_NULL",
            Operator::Ge => "GE",
            Operator::Gt => "GT",
            Operator::Ne => "NE",
            Operator::In => "IN",
            Operator::NotIn => "NOT_IN",
            Operator::IsNotNull => "IS_NOT_NULL",
            Operator::IsNull => "IS_NULL",
        }
    }

    /// Parse a wire name.
    pub fn parse(name: &str) -> Option<Operator> {
        Operator::ALL.into_iter().find(|op| op.as_str() == name)
    }

    /// Whether the operator ignores its value.
    pub fn is_unary(&self) -> bool {
        matches!(self, Operator::IsNull | Operator::IsNotNull)
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Untyped query built from path/operator/value data.
///
/// Every member is optional on the wire; missing pieces are rejected by the
/// dispatcher rather than by deserialization so the caller gets a precise
/// message.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DynamicQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_class: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Vec<DynamicConstraint>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orders: Option<Vec<DynamicOrder>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<DynamicSelect>,
}

/// A single `(path, operator, value)` filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DynamicConstraint {
    #[serde(default)]
    pub path: Option<String>,

    #[serde(default)]
    pub operator: Option<Operator>,

    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

/// A single `(path, ascending)` sort directive.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DynamicOrder {
    #[serde(default)]
    pub path: Option<String>,

    #[serde(default)]
    pub ascending: Option<bool>,
}

/// Projection paths.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DynamicSelect {
    #[serde(default)]
    pub paths: Option<Vec<String>>,
}

/// Row-count limits applied to every executed query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueryLimits {
    /// Hard ceiling on rows fetched from the executor.
    pub max_max_rows: u32,

    /// Returning more rows than this fails the query.
    pub row_count_error_limit: u32,

    /// Returning more rows than this logs a warning.
    pub row_count_warning_limit: u32,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            max_max_rows: 500,
            row_count_error_limit: 30,
            row_count_warning_limit: 20,
        }
    }
}

impl QueryLimits {
    /// Number of rows an executor should fetch.
    ///
    /// One past the error limit, so an oversized result is detectable
    /// without loading all of it.
    pub fn fetch_limit(&self) -> u32 {
        self.max_max_rows
            .min(self.row_count_error_limit.saturating_add(1))
    }

    /// Check a fetched row count against the limits.
    ///
    /// Returns `Err(count)` when the error limit is exceeded.
    pub fn check_row_count(&self, count: usize, entity: &str) -> Result<(), usize> {
        if count > self.row_count_error_limit as usize {
            return Err(count);
        }
        if count > self.row_count_warning_limit as usize {
            tracing::warn!(
                entity = %entity,
                rows = count,
                limit = self.row_count_warning_limit,
                "query returned more rows than the warning limit"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn operator_serialization() {
        let json = serde_json::to_string(&Operator::EqOrIsNull).unwrap();
        assert_eq!(json, "\"EQ_OR_IS_NULL\"");

        let parsed: Operator = serde_json::from_str("\"NOT_IN\"").unwrap();
        assert_eq!(parsed, Operator::NotIn);
    }

    #[test]
    fn operator_parse_matches_wire_names() {
        for op in Operator::ALL {
            assert_eq!(Operator::parse(op.as_str()), Some(op));
        }
        assert_eq!(Operator::parse("eq"), None);
    }

    #[test]
    fn dynamic_query_class_suffix() {
        assert!(is_dynamic_query_class("MovieDynamicQuery"));
        assert!(!is_dynamic_query_class("MovieQuery"));
    }

    #[test]
    fn dynamic_query_accepts_missing_members() {
        let query: DynamicQuery =
            serde_json::from_str(r#"{"constraints":[{"path":"title"}]}"#).unwrap();
        let constraints = query.constraints.unwrap();
        assert_eq!(constraints[0].path.as_deref(), Some("title"));
        assert!(constraints[0].operator.is_none());
        assert!(query.orders.is_none());
        assert!(query.select.is_none());
    }

    #[test]
    fn limits_fetch_one_past_error_limit() {
        let limits = QueryLimits::default();
        assert_eq!(limits.fetch_limit(), 31);

        let tight = QueryLimits {
            max_max_rows: 10,
            ..QueryLimits::default()
        };
        assert_eq!(tight.fetch_limit(), 10);
    }

    #[test]
    fn limits_reject_past_error_limit() {
        let limits = QueryLimits::default();
        assert!(limits.check_row_count(30, "Movie").is_ok());
        assert_eq!(limits.check_row_count(31, "Movie"), Err(31));
    }
}
