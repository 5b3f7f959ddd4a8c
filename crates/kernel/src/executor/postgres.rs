//! PostgreSQL executor using SeaQuery.
//!
//! Generates one SELECT per configured query:
//! - members mapped to their backing columns, aliased back to member names
//! - constraints as AND-ed WHERE conditions
//! - orders in request order
//! - LIMIT one past the row-count error limit

use async_trait::async_trait;
use sea_query::{Alias, Expr, Order, PostgresQueryBuilder, Query, SimpleExpr};
use sqlx::PgPool;
use tracing::debug;

use super::{EntityType, ExecError, Row, Transacter, value_list};
use crate::db;
use crate::query::{ConfiguredQuery, Operator, Predicate};

/// Default statement timeout applied inside each query transaction.
const DEFAULT_STATEMENT_TIMEOUT_SECS: u64 = 10;

/// Executor backed by a PostgreSQL pool.
pub struct PgTransacter {
    name: String,
    pool: PgPool,
    entities: Vec<EntityType>,
    statement_timeout_secs: u64,
}

impl PgTransacter {
    /// Create an executor managing `entities` through `pool`.
    pub fn new(name: impl Into<String>, pool: PgPool, entities: Vec<EntityType>) -> Self {
        Self {
            name: name.into(),
            pool,
            entities,
            statement_timeout_secs: DEFAULT_STATEMENT_TIMEOUT_SECS,
        }
    }

    /// Override the per-transaction statement timeout.
    pub fn with_statement_timeout(mut self, secs: u64) -> Self {
        self.statement_timeout_secs = secs;
        self
    }

    /// Build the SELECT statement for a configured query.
    pub fn build_select(query: &ConfiguredQuery, paths: &[String]) -> Result<String, ExecError> {
        let entity = query.entity();
        let table = entity.table.as_str();
        let mut select = Query::select();

        for path in paths {
            let column = column_for(entity, path)?;
            select.expr_as(
                Expr::col((Alias::new(table), Alias::new(column))),
                Alias::new(path.as_str()),
            );
        }

        select.from(Alias::new(table));

        for predicate in query.constraints() {
            let column = column_for(entity, &predicate.path)?;
            select.and_where(condition(table, column, predicate)?);
        }

        for order in query.orders() {
            let column = column_for(entity, &order.path)?;
            let direction = if order.ascending {
                Order::Asc
            } else {
                Order::Desc
            };
            select.order_by((Alias::new(table), Alias::new(column)), direction);
        }

        select.limit(u64::from(query.limits().fetch_limit()));

        Ok(select.to_string(PostgresQueryBuilder))
    }
}

#[async_trait]
impl Transacter for PgTransacter {
    fn name(&self) -> &str {
        &self.name
    }

    fn entities(&self) -> &[EntityType] {
        &self.entities
    }

    async fn select_rows(
        &self,
        query: &ConfiguredQuery,
        paths: &[String],
    ) -> Result<Vec<Row>, ExecError> {
        let sql = Self::build_select(query, paths)?;
        debug!(transacter = %self.name, sql = %sql, "executing query");

        // SET LOCAL resets when the transaction ends.
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "SET LOCAL statement_timeout = '{}s'",
            self.statement_timeout_secs
        ))
        .execute(&mut *tx)
        .await?;

        let objects: Vec<serde_json::Value> =
            sqlx::query_scalar(&format!("SELECT row_to_json(t) FROM ({sql}) t"))
                .fetch_all(&mut *tx)
                .await
                .map_err(|err| query_error(&query.entity().name, err))?;

        tx.commit().await?;

        let entity = &query.entity().name;
        let limits = query.limits();
        limits
            .check_row_count(objects.len(), entity)
            .map_err(|rows| ExecError::TooManyRows {
                entity: entity.clone(),
                rows,
                limit: limits.row_count_error_limit,
            })?;

        Ok(objects
            .iter()
            .map(|object| {
                paths
                    .iter()
                    .map(|p| object.get(p).cloned().unwrap_or(serde_json::Value::Null))
                    .collect()
            })
            .collect())
    }

    async fn healthy(&self) -> bool {
        db::check_health(&self.pool).await
    }
}

/// Data exceptions (bad casts, out-of-range values) come from the submitted
/// values, so they are reported as client errors.
fn query_error(entity: &str, err: sqlx::Error) -> ExecError {
    if let Some(db_err) = err.as_database_error()
        && db_err.code().is_some_and(|code| code.starts_with("22"))
    {
        return ExecError::RejectedValue {
            entity: entity.to_string(),
            message: db_err.message().to_string(),
        };
    }
    ExecError::Database(err)
}

fn column_for<'a>(entity: &'a EntityType, path: &str) -> Result<&'a str, ExecError> {
    entity
        .member(path)
        .map(|m| m.column())
        .ok_or_else(|| ExecError::UnknownPath {
            entity: entity.name.clone(),
            path: path.to_string(),
        })
}

/// Build a single WHERE condition.
fn condition(table: &str, column: &str, predicate: &Predicate) -> Result<SimpleExpr, ExecError> {
    let col = || Expr::col((Alias::new(table), Alias::new(column)));

    let expr = match predicate.operator {
        Operator::IsNull => col().is_null(),
        Operator::IsNotNull => col().is_not_null(),
        Operator::Eq => col().eq(scalar(predicate)?),
        Operator::EqOrIsNull => col().eq(scalar(predicate)?).or(col().is_null()),
        Operator::Ne => col().ne(scalar(predicate)?),
        Operator::Lt => col().lt(scalar(predicate)?),
        Operator::Le => col().lte(scalar(predicate)?),
        Operator::Gt => col().gt(scalar(predicate)?),
        Operator::Ge => col().gte(scalar(predicate)?),
        Operator::In => col().is_in(list(predicate)?),
        Operator::NotIn => col().is_not_in(list(predicate)?),
    };
    Ok(expr)
}

fn required_value(predicate: &Predicate) -> Result<&serde_json::Value, ExecError> {
    match &predicate.value {
        Some(v) if !v.is_null() => Ok(v),
        _ => Err(ExecError::MissingValue {
            path: predicate.path.clone(),
            operator: predicate.operator.to_string(),
        }),
    }
}

fn scalar(predicate: &Predicate) -> Result<sea_query::Value, ExecError> {
    let value = required_value(predicate)?;
    to_sql_value(value).ok_or_else(|| ExecError::InvalidValue {
        path: predicate.path.clone(),
        operator: predicate.operator.to_string(),
        value: value.to_string(),
    })
}

fn list(predicate: &Predicate) -> Result<Vec<sea_query::Value>, ExecError> {
    let value = required_value(predicate)?;
    let invalid = || ExecError::InvalidValue {
        path: predicate.path.clone(),
        operator: predicate.operator.to_string(),
        value: value.to_string(),
    };
    let values = value_list(value)
        .iter()
        .map(to_sql_value)
        .collect::<Option<Vec<_>>>()
        .ok_or_else(invalid)?;
    if values.is_empty() {
        return Err(invalid());
    }
    Ok(values)
}

/// Convert a JSON scalar into a bound SQL value.
fn to_sql_value(value: &serde_json::Value) -> Option<sea_query::Value> {
    match value {
        serde_json::Value::String(s) => Some(s.clone().into()),
        serde_json::Value::Bool(b) => Some((*b).into()),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Some(i.into()),
            None => n.as_f64().map(Into::into),
        },
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::executor::EntityMember;
    use crate::query::{QueryFactory, QueryLimits};
    use serde_json::json;

    fn movie() -> EntityType {
        EntityType {
            name: "Movie".to_string(),
            table: "movies".to_string(),
            members: vec![
                EntityMember::new("id"),
                EntityMember::new("title"),
                EntityMember::with_column("releaseDate", "release_date"),
            ],
        }
    }

    fn paths(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn select_aliases_columns_to_members() {
        let query = QueryFactory::default().dynamic_query(&movie());
        let sql = PgTransacter::build_select(&query, &paths(&["id", "releaseDate"])).unwrap();

        assert!(sql.contains(r#""movies"."release_date" AS "releaseDate""#));
        assert!(sql.contains(r#"FROM "movies""#));
        assert!(sql.contains("LIMIT 31"));
    }

    #[test]
    fn constraints_are_conjunctive() {
        let mut query = QueryFactory::default().dynamic_query(&movie());
        query
            .dynamic_add_constraint("title", Operator::Eq, Some(json!("Up")))
            .dynamic_add_constraint("releaseDate", Operator::IsNotNull, None);

        let sql = PgTransacter::build_select(&query, &paths(&["id"])).unwrap();
        assert!(sql.contains(r#""movies"."title" = 'Up'"#));
        assert!(sql.contains(" AND "));
        assert!(sql.contains(r#""movies"."release_date" IS NOT NULL"#));
    }

    #[test]
    fn orders_follow_request_order() {
        let mut query = QueryFactory::default().dynamic_query(&movie());
        query
            .dynamic_add_order("releaseDate", false)
            .dynamic_add_order("title", true);

        let sql = PgTransacter::build_select(&query, &paths(&["id"])).unwrap();
        let date = sql.find(r#""release_date" DESC"#).unwrap();
        let title = sql.find(r#""title" ASC"#).unwrap();
        assert!(date < title);
    }

    #[test]
    fn in_expands_value_list() {
        let mut query = QueryFactory::default().dynamic_query(&movie());
        query.dynamic_add_constraint("id", Operator::In, Some(json!([1, 2, 3])));

        let sql = PgTransacter::build_select(&query, &paths(&["id"])).unwrap();
        assert!(sql.contains(r#""movies"."id" IN (1, 2, 3)"#));
    }

    #[test]
    fn unknown_path_is_rejected() {
        let mut query = QueryFactory::default().dynamic_query(&movie());
        query.dynamic_add_constraint("budget", Operator::Gt, Some(json!(10)));

        let err = PgTransacter::build_select(&query, &paths(&["id"])).unwrap_err();
        assert!(matches!(err, ExecError::UnknownPath { .. }));
    }

    #[test]
    fn object_values_are_rejected() {
        let mut query = QueryFactory::default().dynamic_query(&movie());
        query.dynamic_add_constraint("title", Operator::Eq, Some(json!({"nested": true})));

        let err = PgTransacter::build_select(&query, &paths(&["id"])).unwrap_err();
        assert!(matches!(err, ExecError::InvalidValue { .. }));
    }

    #[derive(Debug)]
    struct PgFailure {
        code: &'static str,
    }

    impl std::fmt::Display for PgFailure {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "SQLSTATE {}", self.code)
        }
    }

    impl std::error::Error for PgFailure {}

    impl sqlx::error::DatabaseError for PgFailure {
        fn message(&self) -> &str {
            "invalid input syntax for type integer: \"abc\""
        }

        fn code(&self) -> Option<std::borrow::Cow<'_, str>> {
            Some(self.code.into())
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::Other
        }
    }

    #[test]
    fn data_exceptions_are_client_errors() {
        let err = query_error(
            "Movie",
            sqlx::Error::Database(Box::new(PgFailure { code: "22P02" })),
        );
        assert!(matches!(err, ExecError::RejectedValue { ref entity, .. } if entity == "Movie"));
        assert!(err.is_client_error());
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn other_database_errors_stay_internal() {
        let err = query_error(
            "Movie",
            sqlx::Error::Database(Box::new(PgFailure { code: "57014" })),
        );
        assert!(matches!(err, ExecError::Database(_)));
        assert!(!err.is_client_error());

        let err = query_error("Movie", sqlx::Error::PoolTimedOut);
        assert!(!err.is_client_error());
    }

    #[test]
    fn limit_respects_max_rows() {
        let limits = QueryLimits {
            max_max_rows: 5,
            ..QueryLimits::default()
        };
        let query = QueryFactory::new(limits).dynamic_query(&movie());
        let sql = PgTransacter::build_select(&query, &paths(&["id"])).unwrap();
        assert!(sql.contains("LIMIT 5"));
    }
}
