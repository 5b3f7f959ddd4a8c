//! Configured queries.
//!
//! A [`ConfiguredQuery`] is bound to one entity and collects constraints
//! and orders before being handed to a [`Transacter`]. Constraints are
//! conjunctive; orders are applied in the order they were added, the first
//! being the primary sort key.

use serde::{Deserialize, Serialize};

use super::types::{Operator, QueryLimits};
use crate::executor::{EntityType, ExecError, Row, Transacter};

/// A filter predicate on one entity path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Predicate {
    pub path: String,
    pub operator: Operator,
    pub value: Option<serde_json::Value>,
}

/// A sort directive on one entity path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderBy {
    pub path: String,
    pub ascending: bool,
}

/// Builds queries with a shared set of row limits.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryFactory {
    limits: QueryLimits,
}

impl QueryFactory {
    /// Create a factory with the given limits.
    pub fn new(limits: QueryLimits) -> Self {
        Self { limits }
    }

    /// Limits applied to every query this factory builds.
    pub fn limits(&self) -> QueryLimits {
        self.limits
    }

    /// Start an unconfigured query over an entity, with no declared query.
    pub fn dynamic_query(&self, entity: &EntityType) -> ConfiguredQuery {
        ConfiguredQuery {
            entity: entity.clone(),
            query_class: None,
            constraints: Vec::new(),
            orders: Vec::new(),
            limits: self.limits,
        }
    }

    /// Start an unconfigured query for a declared query class.
    pub fn new_query(&self, query_class: &str, entity: &EntityType) -> ConfiguredQuery {
        ConfiguredQuery {
            query_class: Some(query_class.to_string()),
            ..self.dynamic_query(entity)
        }
    }
}

/// A query bound to an entity, ready for execution.
#[derive(Debug, Clone)]
pub struct ConfiguredQuery {
    entity: EntityType,
    query_class: Option<String>,
    constraints: Vec<Predicate>,
    orders: Vec<OrderBy>,
    limits: QueryLimits,
}

impl ConfiguredQuery {
    /// Add a constraint. Path validity is checked by the executor.
    pub fn dynamic_add_constraint(
        &mut self,
        path: impl Into<String>,
        operator: Operator,
        value: Option<serde_json::Value>,
    ) -> &mut Self {
        self.constraints.push(Predicate {
            path: path.into(),
            operator,
            value,
        });
        self
    }

    /// Add an order. Earlier orders take precedence.
    pub fn dynamic_add_order(&mut self, path: impl Into<String>, ascending: bool) -> &mut Self {
        self.orders.push(OrderBy {
            path: path.into(),
            ascending,
        });
        self
    }

    pub fn entity(&self) -> &EntityType {
        &self.entity
    }

    pub fn query_class(&self) -> Option<&str> {
        self.query_class.as_deref()
    }

    pub fn constraints(&self) -> &[Predicate] {
        &self.constraints
    }

    pub fn orders(&self) -> &[OrderBy] {
        &self.orders
    }

    pub fn limits(&self) -> QueryLimits {
        self.limits
    }

    /// Fetch every member of the entity.
    ///
    /// Returns the member names as headers together with the rows.
    pub async fn list(
        &self,
        transacter: &dyn Transacter,
    ) -> Result<(Vec<String>, Vec<Row>), ExecError> {
        let headers = self.entity.member_names();
        let rows = self.dynamic_list(transacter, &headers).await?;
        Ok((headers, rows))
    }

    /// Fetch the given paths only.
    pub async fn dynamic_list(
        &self,
        transacter: &dyn Transacter,
        paths: &[String],
    ) -> Result<Vec<Row>, ExecError> {
        if transacter.entity(&self.entity.name).is_none() {
            return Err(ExecError::UnmanagedEntity(self.entity.name.clone()));
        }
        transacter.select_rows(self, paths).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movie() -> EntityType {
        EntityType::new("Movie", "movies", &["id", "title", "rating"])
    }

    #[test]
    fn dynamic_query_starts_empty() {
        let query = QueryFactory::default().dynamic_query(&movie());

        assert_eq!(query.entity().name, "Movie");
        assert!(query.query_class().is_none());
        assert!(query.constraints().is_empty());
        assert!(query.orders().is_empty());
        assert_eq!(query.limits(), QueryLimits::default());
    }

    #[test]
    fn new_query_records_query_class() {
        let query = QueryFactory::default().new_query("MovieQuery", &movie());
        assert_eq!(query.query_class(), Some("MovieQuery"));
    }

    #[test]
    fn clauses_keep_insertion_order() {
        let mut query = QueryFactory::default().dynamic_query(&movie());
        query
            .dynamic_add_constraint("title", Operator::Eq, Some(serde_json::json!("Up")))
            .dynamic_add_constraint("rating", Operator::IsNotNull, None)
            .dynamic_add_order("rating", false)
            .dynamic_add_order("title", true);

        assert_eq!(query.constraints().len(), 2);
        assert_eq!(query.constraints()[1].operator, Operator::IsNotNull);
        assert_eq!(query.orders()[0].path, "rating");
        assert!(!query.orders()[0].ascending);
        assert_eq!(query.orders()[1].path, "title");
    }
}
