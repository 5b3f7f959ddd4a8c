//! Query dispatch.
//!
//! Validates a dashboard query request and forwards it to the executor
//! managing the target entity. Every action follows the same gate:
//!
//! 1. Look up the query metadata by query class
//! 2. Check the caller against the metadata's allowed capabilities/services
//! 3. Find the executor managing the metadata's entity
//!
//! Only then is a [`ConfiguredQuery`] built, either from the catalog
//! (declared queries) or from a [`DynamicQuery`] descriptor, and run by the
//! executor within a single transaction.

mod request;

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};

pub use request::{
    ClauseKind, DynamicQueryRequest, QueryClause, QueryRequest, QueryResponse, StaticQueryRequest,
};

use crate::access::Caller;
use crate::catalog::builder::{
    DYNAMIC_CONSTRAINT_TYPE_NAME, DYNAMIC_ORDER_LIST_TYPE_NAME, DYNAMIC_ORDER_TYPE_NAME,
    DYNAMIC_SELECT_TYPE_NAME,
};
use crate::catalog::{QueryMetadata, QueryRegistry};
use crate::executor::{EntityType, ExecError, Transacter, TransacterSet};
use crate::query::{
    ConfiguredQuery, DynamicConstraint, DynamicOrder, DynamicQuery, DynamicSelect, Operator,
    QueryFactory, QueryLimits,
};

/// Failures surfaced to the caller of a query action.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Internal(String),
}

impl DispatchError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        DispatchError::BadRequest(message.into())
    }
}

impl From<ExecError> for DispatchError {
    fn from(err: ExecError) -> Self {
        if err.is_client_error() {
            DispatchError::BadRequest(err.to_string())
        } else {
            error!(error = ?err, "query execution failed");
            DispatchError::Internal("query execution failed".to_string())
        }
    }
}

/// Runs dashboard query requests against the registered executors.
#[derive(Clone)]
pub struct QueryDispatcher {
    registry: Arc<QueryRegistry>,
    transacters: TransacterSet,
    factory: QueryFactory,
}

impl QueryDispatcher {
    pub fn new(registry: Arc<QueryRegistry>, transacters: TransacterSet, limits: QueryLimits) -> Self {
        Self {
            registry,
            transacters,
            factory: QueryFactory::new(limits),
        }
    }

    pub fn registry(&self) -> &Arc<QueryRegistry> {
        &self.registry
    }

    pub fn transacters(&self) -> &TransacterSet {
        &self.transacters
    }

    /// Metadata the caller is allowed to query, sorted by query class.
    pub fn visible_metadata(&self, caller: &Caller) -> Vec<&QueryMetadata> {
        self.registry
            .metadata()
            .filter(|m| caller.is_allowed(&m.allowed_capabilities, &m.allowed_services))
            .collect()
    }

    /// General query action: declared or dynamic query classes, with
    /// clauses keyed by parameter type name.
    pub async fn execute(
        &self,
        caller: &Caller,
        request: QueryRequest,
    ) -> Result<QueryResponse, DispatchError> {
        let (metadata, transacter) = self.resolve(caller, &request.query_class)?;
        let clauses = QueryClause::parse_all(request.query)?;

        if metadata.is_dynamic() {
            let dynamic = dynamic_query_from_clauses(metadata, &clauses)?;
            return self
                .run_dynamic(transacter.as_ref(), metadata, &request.entity_class, &dynamic)
                .await;
        }

        let entity = installed_entity(transacter.as_ref(), metadata, &request.entity_class)?;
        let declaration = self.registry.query(&metadata.query_class).ok_or_else(|| {
            DispatchError::bad_request(format!("[query={}] does not exist", metadata.query_class))
        })?;
        let mut query = self.factory.new_query(&declaration.name, entity);

        let mut select: Option<Vec<String>> = None;
        for clause in &clauses {
            let toggle = is_toggle(metadata, &clause.key);
            match clause.kind {
                ClauseKind::Constraint => {
                    let constraint = metadata
                        .constraint(&clause.key)
                        .ok_or_else(|| unknown_clause(metadata, clause))?;
                    if toggle && clause.is_switched_off() {
                        continue;
                    }
                    let value = if toggle || constraint.operator.is_unary() {
                        None
                    } else {
                        parameter_value(metadata, clause, &constraint.name)
                    };
                    query.dynamic_add_constraint(&constraint.path, constraint.operator, value);
                }
                ClauseKind::Order => {
                    let order = metadata
                        .order(&clause.key)
                        .ok_or_else(|| unknown_clause(metadata, clause))?;
                    if toggle && clause.is_switched_off() {
                        continue;
                    }
                    query.dynamic_add_order(&order.path, order.ascending);
                }
                ClauseKind::Select => {
                    let declared = metadata
                        .select(&clause.key)
                        .ok_or_else(|| unknown_clause(metadata, clause))?;
                    if toggle && clause.is_switched_off() {
                        continue;
                    }
                    if select.is_some() {
                        return Err(DispatchError::bad_request(format!(
                            "[query={}] accepts a single Select clause",
                            metadata.query_class
                        )));
                    }
                    select = Some(select_paths(clause, &declared.paths)?);
                }
            }
        }

        let (headers, rows) = match select {
            Some(paths) => {
                let rows = query.dynamic_list(transacter.as_ref(), &paths).await?;
                (paths, rows)
            }
            None => query.list(transacter.as_ref()).await?,
        };
        debug!(
            query_class = %metadata.query_class,
            caller = %caller.principal(),
            rows = rows.len(),
            "query executed"
        );
        Ok(QueryResponse { headers, rows })
    }

    /// Dynamic query action: only `*DynamicQuery` classes.
    pub async fn execute_dynamic(
        &self,
        caller: &Caller,
        request: DynamicQueryRequest,
    ) -> Result<QueryResponse, DispatchError> {
        let (metadata, transacter) = self.resolve(caller, &request.query_class)?;
        if !metadata.is_dynamic() {
            return Err(DispatchError::bad_request(format!(
                "[queryClass={}] is not a DynamicQuery and can't be handled by the dynamic query action",
                request.query_class
            )));
        }
        self.run_dynamic(
            transacter.as_ref(),
            metadata,
            &request.entity_class,
            &request.query,
        )
        .await
    }

    /// Legacy static action: runs a declared query with no clauses applied
    /// and returns every member of the entity.
    pub async fn execute_static(
        &self,
        caller: &Caller,
        request: StaticQueryRequest,
    ) -> Result<QueryResponse, DispatchError> {
        let (metadata, transacter) = self.resolve(caller, &request.query_class)?;
        if metadata.is_dynamic() {
            return Err(DispatchError::bad_request(format!(
                "[queryClass={}] is a DynamicQuery and can't be handled by the static query action",
                request.query_class
            )));
        }
        let declaration = self.registry.query(&metadata.query_class).ok_or_else(|| {
            DispatchError::bad_request(format!("[query={}] does not exist", metadata.query_class))
        })?;
        let entity = installed_entity(transacter.as_ref(), metadata, &request.entity_class)?;
        if !request.query.is_empty() {
            debug!(query = %request.query, "static query text is not interpreted");
        }

        let (headers, rows) = self
            .factory
            .new_query(&declaration.name, entity)
            .list(transacter.as_ref())
            .await?;
        Ok(QueryResponse { headers, rows })
    }

    /// Metadata lookup, access check, and executor lookup, in that order.
    fn resolve(
        &self,
        caller: &Caller,
        query_class: &str,
    ) -> Result<(&QueryMetadata, &Arc<dyn Transacter>), DispatchError> {
        let metadata = self
            .registry
            .find(query_class)
            .ok_or_else(|| DispatchError::bad_request("Invalid Query Class"))?;

        if !caller.is_allowed(&metadata.allowed_capabilities, &metadata.allowed_services) {
            warn!(
                caller = %caller.principal(),
                query_class = %metadata.query_class,
                "caller not allowed to run query"
            );
            return Err(DispatchError::Unauthorized(format!(
                "Unauthorized to query [dbEntity={}]",
                metadata.entity_class
            )));
        }

        let transacter = self
            .transacters
            .for_entity(&metadata.entity_class)
            .ok_or_else(|| {
                DispatchError::bad_request(format!(
                    "[dbEntity={}] has no associated Transacter",
                    metadata.entity_class
                ))
            })?;
        Ok((metadata, transacter))
    }

    async fn run_dynamic(
        &self,
        transacter: &dyn Transacter,
        metadata: &QueryMetadata,
        entity_class: &str,
        descriptor: &DynamicQuery,
    ) -> Result<QueryResponse, DispatchError> {
        let entity = installed_entity(transacter, metadata, entity_class)?;
        let query = configure_dynamic(self.factory.dynamic_query(entity), descriptor)?;

        let headers = descriptor
            .select
            .as_ref()
            .and_then(|s| s.paths.clone())
            .unwrap_or_else(|| entity.member_names());
        let rows = query.dynamic_list(transacter, &headers).await?;
        debug!(
            query_class = %metadata.query_class,
            constraints = query.constraints().len(),
            orders = query.orders().len(),
            rows = rows.len(),
            "dynamic query executed"
        );
        Ok(QueryResponse { headers, rows })
    }
}

/// The request's entity, as managed by the executor.
///
/// The entity must also be the one the metadata (and so the access check)
/// refers to.
fn installed_entity<'a>(
    transacter: &'a dyn Transacter,
    metadata: &QueryMetadata,
    entity_class: &str,
) -> Result<&'a EntityType, DispatchError> {
    let entity = transacter.entity(entity_class).ok_or_else(|| {
        DispatchError::bad_request(format!("[dbEntity={entity_class}] is not an installed entity"))
    })?;
    if entity.name != metadata.entity_class {
        return Err(DispatchError::bad_request(format!(
            "[dbEntity={entity_class}] does not match [queryClass={}]",
            metadata.query_class
        )));
    }
    Ok(entity)
}

/// Apply a descriptor's constraints and orders, in list order.
fn configure_dynamic(
    mut query: ConfiguredQuery,
    descriptor: &DynamicQuery,
) -> Result<ConfiguredQuery, DispatchError> {
    for constraint in descriptor.constraints.iter().flatten() {
        let path = constraint
            .path
            .as_deref()
            .ok_or_else(|| DispatchError::bad_request("Constraint path must be non-null"))?;
        let operator = constraint
            .operator
            .ok_or_else(|| DispatchError::bad_request("Constraint operator must be non-null"))?;
        query.dynamic_add_constraint(path, operator, constraint.value.clone());
    }
    for order in descriptor.orders.iter().flatten() {
        let path = order
            .path
            .as_deref()
            .ok_or_else(|| DispatchError::bad_request("Order path must be non-null"))?;
        let ascending = order
            .ascending
            .ok_or_else(|| DispatchError::bad_request("Order ascending must be non-null"))?;
        query.dynamic_add_order(path, ascending);
    }
    Ok(query)
}

fn unknown_clause(metadata: &QueryMetadata, clause: &QueryClause) -> DispatchError {
    DispatchError::bad_request(format!(
        "[query={}] has no {} [parametersTypeName={}]",
        metadata.query_class,
        clause.kind.as_str(),
        clause.key
    ))
}

/// Whether the clause's form is a single parameterless Boolean toggle.
fn is_toggle(metadata: &QueryMetadata, key: &str) -> bool {
    metadata.types.get(key).is_some_and(|form| {
        matches!(
            form.fields.as_slice(),
            [field] if field.type_name == "Boolean" && field.name.starts_with("Add ")
        )
    })
}

/// The submitted parameter value for a declared method.
///
/// Form values arrive as an object keyed by field; the method name is tried
/// first, then the form field name. Bare values are used as-is.
fn parameter_value(metadata: &QueryMetadata, clause: &QueryClause, method: &str) -> Option<Value> {
    let value = match &clause.value {
        Value::Object(fields) => fields
            .get(method)
            .or_else(|| {
                let form = metadata.types.get(&clause.key)?;
                let [field] = form.fields.as_slice() else {
                    return None;
                };
                fields.get(&field.name)
            })
            .cloned(),
        other => Some(other.clone()),
    };
    value.filter(|v| !v.is_null())
}

/// Paths for a select clause: submitted `Paths`, else the declared ones.
fn select_paths(clause: &QueryClause, declared: &[String]) -> Result<Vec<String>, DispatchError> {
    if let Some(paths) = clause.value.get("Paths") {
        return string_list(paths).ok_or_else(|| {
            DispatchError::bad_request(format!(
                "[select={}] Paths must be a list of strings",
                clause.key
            ))
        });
    }
    if declared.is_empty() {
        return Err(DispatchError::bad_request(format!(
            "[select={}] has no paths to select",
            clause.key
        )));
    }
    Ok(declared.to_vec())
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

/// Build a descriptor from general-action clauses on a dynamic query.
///
/// Accepted keys are the dynamic form types: `Constraint/Dynamic`,
/// `Order/Dynamic`, `Order/DynamicList`, and `Select/Dynamic`. Constraint
/// and order values may be a single form object or a list of them.
fn dynamic_query_from_clauses(
    metadata: &QueryMetadata,
    clauses: &[QueryClause],
) -> Result<DynamicQuery, DispatchError> {
    let mut descriptor = DynamicQuery::default();
    for clause in clauses {
        match clause.key.as_str() {
            DYNAMIC_CONSTRAINT_TYPE_NAME => {
                let constraints = descriptor.constraints.get_or_insert_with(Vec::new);
                for item in form_items(&clause.value) {
                    constraints.push(dynamic_constraint(item)?);
                }
            }
            DYNAMIC_ORDER_TYPE_NAME => {
                let orders = descriptor.orders.get_or_insert_with(Vec::new);
                orders.extend(form_items(&clause.value).into_iter().map(dynamic_order));
            }
            DYNAMIC_ORDER_LIST_TYPE_NAME => {
                let items = clause
                    .value
                    .get("Dynamic Orders")
                    .map(form_items)
                    .unwrap_or_default();
                let orders = descriptor.orders.get_or_insert_with(Vec::new);
                orders.extend(items.into_iter().map(dynamic_order));
            }
            DYNAMIC_SELECT_TYPE_NAME => {
                let paths = select_paths(clause, &[])?;
                descriptor.select = Some(DynamicSelect { paths: Some(paths) });
            }
            _ => return Err(unknown_clause(metadata, clause)),
        }
    }
    Ok(descriptor)
}

fn form_items(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

fn dynamic_constraint(form: &Value) -> Result<DynamicConstraint, DispatchError> {
    let operator = match form.get("Operator").and_then(Value::as_str) {
        Some(name) => Some(
            Operator::parse(name)
                .ok_or_else(|| DispatchError::bad_request(format!("unknown operator {name}")))?,
        ),
        None => None,
    };
    Ok(DynamicConstraint {
        path: form.get("Path").and_then(Value::as_str).map(str::to_string),
        operator,
        value: form.get("Value").filter(|v| !v.is_null()).cloned(),
    })
}

fn dynamic_order(form: &Value) -> DynamicOrder {
    let ascending = match form.get("Ascending") {
        Some(Value::Bool(asc)) => Some(*asc),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    };
    DynamicOrder {
        path: form.get("Path").and_then(Value::as_str).map(str::to_string),
        ascending,
    }
}
