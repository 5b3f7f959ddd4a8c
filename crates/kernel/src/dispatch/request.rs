//! Request and response bodies for the query actions.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::DispatchError;
use crate::executor::Row;
use crate::query::DynamicQuery;

/// Body of the general query action.
///
/// `query` maps parameter type names (`Constraint/MovieQuery/title`) to the
/// form values submitted for them. Entries keep their wire order, which
/// sets order precedence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub entity_class: String,
    pub query_class: String,
    #[serde(default)]
    pub query: Map<String, Value>,
}

/// Body of the dynamic query action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicQueryRequest {
    pub entity_class: String,
    pub query_class: String,
    #[serde(default)]
    pub query: DynamicQuery,
}

/// Body of the legacy static query action. `query` is not interpreted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticQueryRequest {
    pub entity_class: String,
    pub query_class: String,
    #[serde(default)]
    pub query: String,
}

/// Tabular result: one row per match, aligned with `headers`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryResponse {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

/// Kind of a request clause, taken from the key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClauseKind {
    Constraint,
    Order,
    Select,
}

impl ClauseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClauseKind::Constraint => "Constraint",
            ClauseKind::Order => "Order",
            ClauseKind::Select => "Select",
        }
    }
}

/// One entry of a general query request, parsed from its wire key.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryClause {
    pub kind: ClauseKind,
    /// Full key, e.g. `Order/MovieQuery/bestFirst`.
    pub key: String,
    /// Last key segment: the method name, or `Dynamic` / `DynamicList`.
    pub name: String,
    pub value: Value,
}

impl QueryClause {
    /// Parse a `<Kind>/.../<name>` key.
    pub fn parse(key: &str, value: Value) -> Result<Self, DispatchError> {
        let (prefix, rest) = key
            .split_once('/')
            .ok_or_else(|| DispatchError::bad_request(format!("malformed query clause [key={key}]")))?;
        let kind = match prefix {
            "Constraint" => ClauseKind::Constraint,
            "Order" => ClauseKind::Order,
            "Select" => ClauseKind::Select,
            _ => {
                return Err(DispatchError::bad_request(format!(
                    "unknown query clause [key={key}]"
                )));
            }
        };
        let name = rest.rsplit('/').next().unwrap_or(rest);
        if name.is_empty() {
            return Err(DispatchError::bad_request(format!(
                "malformed query clause [key={key}]"
            )));
        }
        Ok(Self {
            kind,
            key: key.to_string(),
            name: name.to_string(),
            value,
        })
    }

    /// Parse every entry of a request map, in request order.
    pub fn parse_all(query: Map<String, Value>) -> Result<Vec<Self>, DispatchError> {
        query
            .into_iter()
            .map(|(key, value)| Self::parse(&key, value))
            .collect()
    }

    /// A toggle value explicitly switched off (`{"Add Order (...)": false}`
    /// or plain `false`).
    pub fn is_switched_off(&self) -> bool {
        match &self.value {
            Value::Bool(on) => !on,
            Value::Object(fields) if fields.len() == 1 => {
                fields.values().next().and_then(Value::as_bool) == Some(false)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_clause_keys() {
        let clause = QueryClause::parse("Constraint/MovieQuery/title", json!({"title": "Up"})).unwrap();
        assert_eq!(clause.kind, ClauseKind::Constraint);
        assert_eq!(clause.name, "title");

        let clause = QueryClause::parse("Order/Dynamic", json!({})).unwrap();
        assert_eq!(clause.kind, ClauseKind::Order);
        assert_eq!(clause.name, "Dynamic");
    }

    #[test]
    fn rejects_unknown_clause_kinds() {
        let err = QueryClause::parse("Group/MovieQuery/byYear", json!(true)).unwrap_err();
        assert!(matches!(err, DispatchError::BadRequest(ref m) if m.contains("Group/MovieQuery/byYear")));

        assert!(QueryClause::parse("title", json!("Up")).is_err());
        assert!(QueryClause::parse("Order/", json!(true)).is_err());
    }

    #[test]
    fn toggles() {
        let off = QueryClause::parse("Order/MovieQuery/bestFirst", json!({"Add Order (path=rating, asc=false)": false})).unwrap();
        assert!(off.is_switched_off());

        let on = QueryClause::parse("Order/MovieQuery/bestFirst", json!({"Add Order (path=rating, asc=false)": true})).unwrap();
        assert!(!on.is_switched_off());

        let value = QueryClause::parse("Constraint/MovieQuery/title", json!({"title": "Up"})).unwrap();
        assert!(!value.is_switched_off());
    }

    #[test]
    fn clauses_keep_request_order() {
        let request: QueryRequest = serde_json::from_str(
            r#"{
                "entityClass": "Movie",
                "queryClass": "MovieQuery",
                "query": {
                    "Order/MovieQuery/oldestFirst": true,
                    "Constraint/MovieQuery/rated": true,
                    "Order/MovieQuery/bestFirst": true
                }
            }"#,
        )
        .unwrap();

        let names: Vec<String> = QueryClause::parse_all(request.query)
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["oldestFirst", "rated", "bestFirst"]);
    }

    #[test]
    fn request_bodies_use_camel_case() {
        let request: QueryRequest = serde_json::from_value(json!({
            "entityClass": "Movie",
            "queryClass": "MovieQuery",
            "query": {"Order/MovieQuery/bestFirst": true}
        }))
        .unwrap();
        assert_eq!(request.entity_class, "Movie");
        assert_eq!(request.query.len(), 1);

        let request: DynamicQueryRequest = serde_json::from_value(json!({
            "entityClass": "Movie",
            "queryClass": "MovieDynamicQuery"
        }))
        .unwrap();
        assert!(request.query.constraints.is_none());
    }
}
