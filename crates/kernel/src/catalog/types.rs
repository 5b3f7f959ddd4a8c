//! Query catalog types.
//!
//! These are the serializable descriptions handed to the dashboard: one
//! [`QueryMetadata`] per registered entity/query pair, plus the form schema
//! ([`FormType`]) used to render and validate request forms.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::query::Operator;

/// Path of the general query action, recorded in every metadata entry.
pub const QUERY_WEB_ACTION_PATH: &str = "/api/database/query/hibernate";

/// Path of the dynamic query action.
pub const QUERY_DYNAMIC_WEB_ACTION_PATH: &str = "/api/database/query/hibernate/dynamic";

/// Path of the legacy static query action.
pub const QUERY_STATIC_WEB_ACTION_PATH: &str = "/api/database/query/hibernate/static";

/// Key of the root form type in [`QueryMetadata::types`].
pub const QUERY_TYPE_KEY: &str = "queryType";

/// Description of one query type available on the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryMetadata {
    pub query_web_action_path: String,

    #[serde(default)]
    pub allowed_capabilities: BTreeSet<String>,

    #[serde(default)]
    pub allowed_services: BTreeSet<String>,

    /// Name of the access annotation guarding this query, if any.
    pub access_annotation: Option<String>,

    /// SQL table name.
    pub table: String,

    /// Entity name.
    pub entity_class: String,

    /// Query class name; `<Entity>DynamicQuery` for dynamic-only entries.
    pub query_class: String,

    pub constraints: Vec<ConstraintMetadata>,

    pub orders: Vec<OrderMetadata>,

    pub selects: Vec<SelectMetadata>,

    /// Form types keyed by parameter type name, plus [`QUERY_TYPE_KEY`].
    pub types: BTreeMap<String, FormType>,
}

impl QueryMetadata {
    /// Whether this entry describes a dynamic-only query.
    pub fn is_dynamic(&self) -> bool {
        crate::query::is_dynamic_query_class(&self.query_class)
    }

    pub fn constraint(&self, parameters_type_name: &str) -> Option<&ConstraintMetadata> {
        self.constraints
            .iter()
            .find(|c| c.parameters_type_name == parameters_type_name)
    }

    pub fn order(&self, parameters_type_name: &str) -> Option<&OrderMetadata> {
        self.orders
            .iter()
            .find(|o| o.parameters_type_name == parameters_type_name)
    }

    pub fn select(&self, parameters_type_name: &str) -> Option<&SelectMetadata> {
        self.selects
            .iter()
            .find(|s| s.parameters_type_name == parameters_type_name)
    }

    /// Every parameter type name declared by this query's functions.
    pub fn parameter_type_names(&self) -> impl Iterator<Item = &str> {
        self.constraints
            .iter()
            .map(|c| c.parameters_type_name.as_str())
            .chain(self.orders.iter().map(|o| o.parameters_type_name.as_str()))
            .chain(self.selects.iter().map(|s| s.parameters_type_name.as_str()))
    }
}

/// A constraint function on a declared query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintMetadata {
    pub name: String,
    pub parameters_type_name: String,
    pub path: String,
    pub operator: Operator,
}

/// An order function on a declared query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrderMetadata {
    pub name: String,
    pub parameters_type_name: String,
    pub path: String,
    pub ascending: bool,
}

/// A select (projection) function on a declared query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SelectMetadata {
    pub name: String,
    pub parameters_type_name: String,
    pub paths: Vec<String>,
}

/// Form schema for one request parameter group.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormType {
    pub fields: Vec<Field>,
}

impl FormType {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }
}

/// A single form field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Field {
    pub name: String,

    #[serde(rename = "type")]
    pub type_name: String,

    pub repeated: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, repeated: bool) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            repeated,
        }
    }
}
