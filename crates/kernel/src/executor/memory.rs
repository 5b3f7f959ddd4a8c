//! In-memory executor.
//!
//! Holds fixed rows per entity and evaluates configured queries directly.
//! Comparison follows PostgreSQL conventions where they matter: a NULL never
//! matches a comparison, and NULLs sort last ascending, first descending.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use super::{EntityType, ExecError, Row, Transacter, value_list};
use crate::query::{ConfiguredQuery, Operator, Predicate};

/// Executor over rows kept in memory.
pub struct MemoryTransacter {
    name: String,
    entities: Vec<EntityType>,
    /// Entity name -> rows as JSON objects keyed by member name.
    rows: HashMap<String, Vec<Value>>,
}

impl MemoryTransacter {
    /// Create an executor with no entities.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entities: Vec::new(),
            rows: HashMap::new(),
        }
    }

    /// Manage an entity with the given rows.
    pub fn with_entity(mut self, entity: EntityType, rows: Vec<Value>) -> Self {
        self.rows.insert(entity.name.clone(), rows);
        self.entities.push(entity);
        self
    }

    /// Number of rows held for an entity.
    pub fn row_count(&self, entity: &str) -> usize {
        self.rows.get(entity).map_or(0, Vec::len)
    }
}

#[async_trait]
impl Transacter for MemoryTransacter {
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
        let entity = query.entity();
        let source = self
            .rows
            .get(&entity.name)
            .ok_or_else(|| ExecError::UnmanagedEntity(entity.name.clone()))?;

        let check_path = |path: &str| {
            if entity.member(path).is_some() {
                Ok(())
            } else {
                Err(ExecError::UnknownPath {
                    entity: entity.name.clone(),
                    path: path.to_string(),
                })
            }
        };
        for predicate in query.constraints() {
            check_path(&predicate.path)?;
        }
        for order in query.orders() {
            check_path(&order.path)?;
        }
        for path in paths {
            check_path(path)?;
        }

        let mut matched = Vec::new();
        for row in source {
            let mut keep = true;
            for predicate in query.constraints() {
                if !matches(row, predicate)? {
                    keep = false;
                    break;
                }
            }
            if keep {
                matched.push(row);
            }
        }

        matched.sort_by(|a, b| {
            for order in query.orders() {
                let ordering = sort_cmp(field(a, &order.path), field(b, &order.path));
                let ordering = if order.ascending {
                    ordering
                } else {
                    ordering.reverse()
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });

        let limits = query.limits();
        matched.truncate(limits.fetch_limit() as usize);
        limits
            .check_row_count(matched.len(), &entity.name)
            .map_err(|rows| ExecError::TooManyRows {
                entity: entity.name.clone(),
                rows,
                limit: limits.row_count_error_limit,
            })?;

        Ok(matched
            .into_iter()
            .map(|row| paths.iter().map(|p| field(row, p).clone()).collect())
            .collect())
    }
}

fn field<'a>(row: &'a Value, path: &str) -> &'a Value {
    row.get(path).unwrap_or(&Value::Null)
}

/// Evaluate one predicate against a row.
fn matches(row: &Value, predicate: &Predicate) -> Result<bool, ExecError> {
    let stored = field(row, &predicate.path);
    let operator = predicate.operator;

    match operator {
        Operator::IsNull => return Ok(stored.is_null()),
        Operator::IsNotNull => return Ok(!stored.is_null()),
        _ => {}
    }

    let wanted = match &predicate.value {
        Some(v) if !v.is_null() => v,
        _ => {
            return Err(ExecError::MissingValue {
                path: predicate.path.clone(),
                operator: operator.to_string(),
            });
        }
    };

    let result = match operator {
        Operator::Eq => compare(stored, wanted) == Some(Ordering::Equal),
        Operator::EqOrIsNull => {
            stored.is_null() || compare(stored, wanted) == Some(Ordering::Equal)
        }
        Operator::Ne => matches!(compare(stored, wanted), Some(o) if o != Ordering::Equal),
        Operator::Lt => compare(stored, wanted) == Some(Ordering::Less),
        Operator::Le => matches!(
            compare(stored, wanted),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Operator::Gt => compare(stored, wanted) == Some(Ordering::Greater),
        Operator::Ge => matches!(
            compare(stored, wanted),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Operator::In => value_list(wanted)
            .iter()
            .any(|v| compare(stored, v) == Some(Ordering::Equal)),
        Operator::NotIn => {
            !stored.is_null()
                && value_list(wanted)
                    .iter()
                    .all(|v| matches!(compare(stored, v), Some(o) if o != Ordering::Equal))
        }
        Operator::IsNull | Operator::IsNotNull => false,
    };
    Ok(result)
}

/// Compare a stored value with a requested one.
///
/// Request values often arrive as strings from form fields, so a string is
/// coerced when the stored value is a number or a boolean. Returns `None`
/// when either side is NULL or the two cannot be compared.
fn compare(stored: &Value, wanted: &Value) -> Option<Ordering> {
    match (stored, wanted) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::Number(a), Value::String(b)) => {
            a.as_f64()?.partial_cmp(&b.trim().parse::<f64>().ok()?)
        }
        (Value::String(a), Value::Number(b)) => {
            a.trim().parse::<f64>().ok()?.partial_cmp(&b.as_f64()?)
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::String(b)) => Some(a.cmp(&b.parse::<bool>().ok()?)),
        _ => None,
    }
}

/// Ordering used for sorting: NULLs sort after every value.
fn sort_cmp(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => compare(a, b).unwrap_or(Ordering::Equal),
    }
}
