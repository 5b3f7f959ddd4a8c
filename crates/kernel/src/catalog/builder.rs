//! Metadata builder.
//!
//! Turns an entity and an optional declared query interface into
//! [`QueryMetadata`]. Every annotated method becomes one catalog entry plus a
//! one-field form type describing its parameter. Entities registered without
//! a query interface get the fixed dynamic form types instead.

use std::collections::{BTreeMap, HashSet};

use super::declaration::{
    BASE_QUERY_INTERFACES, ConstraintAnnotation, MethodDeclaration, OrderAnnotation, ParamType,
    ParameterDeclaration, QueryDeclaration, SelectAnnotation,
};
use super::types::{
    ConstraintMetadata, Field, FormType, OrderMetadata, QUERY_TYPE_KEY, QUERY_WEB_ACTION_PATH,
    QueryMetadata, SelectMetadata,
};
use super::CatalogError;
use crate::access::AccessAnnotationEntry;
use crate::executor::EntityType;
use crate::query::{DYNAMIC_QUERY_SUFFIX, Operator};

pub const DYNAMIC_CONSTRAINT_TYPE_NAME: &str = "Constraint/Dynamic";
pub const DYNAMIC_ORDER_TYPE_NAME: &str = "Order/Dynamic";
pub const DYNAMIC_ORDER_LIST_TYPE_NAME: &str = "Order/DynamicList";
pub const DYNAMIC_SELECT_TYPE_NAME: &str = "Select/Dynamic";
pub const DYNAMIC_ROOT_TYPE_NAME: &str = "DynamicQuery";

/// Fixed form types attached to dynamic-only metadata.
pub fn dynamic_types() -> Vec<(String, FormType)> {
    vec![
        (
            DYNAMIC_CONSTRAINT_TYPE_NAME.to_string(),
            FormType::new(vec![
                Field::new("Path", "String", false),
                enum_field(
                    "Operator",
                    "Operator",
                    Operator::ALL.iter().map(|op| op.as_str()),
                    false,
                ),
                Field::new("Value", "String", false),
            ]),
        ),
        (
            DYNAMIC_ORDER_TYPE_NAME.to_string(),
            FormType::new(vec![
                Field::new("Path", "String", false),
                Field::new("Ascending", "Boolean", false),
            ]),
        ),
        (
            DYNAMIC_ORDER_LIST_TYPE_NAME.to_string(),
            FormType::new(vec![Field::new(
                "Dynamic Orders",
                DYNAMIC_ORDER_TYPE_NAME,
                true,
            )]),
        ),
        (
            DYNAMIC_SELECT_TYPE_NAME.to_string(),
            FormType::new(vec![Field::new("Paths", "String", true)]),
        ),
        (
            DYNAMIC_ROOT_TYPE_NAME.to_string(),
            FormType::new(vec![
                Field::new("Constraints", DYNAMIC_CONSTRAINT_TYPE_NAME, true),
                Field::new("Orders", DYNAMIC_ORDER_TYPE_NAME, true),
                Field::new("Select", DYNAMIC_SELECT_TYPE_NAME, false),
            ]),
        ),
    ]
}

fn enum_field<'a>(
    name: &str,
    enum_name: &str,
    values: impl Iterator<Item = &'a str>,
    repeated: bool,
) -> Field {
    let mut type_name = format!("Enum<{enum_name}");
    for value in values {
        type_name.push(',');
        type_name.push_str(value);
    }
    type_name.push('>');
    Field::new(name, type_name, repeated)
}

/// Builds [`QueryMetadata`] from declarations.
#[derive(Debug, Clone, Default)]
pub struct MetadataBuilder {
    access_annotations: Vec<AccessAnnotationEntry>,
    /// Every declared interface by name, for resolving `extends`.
    interfaces: BTreeMap<String, QueryDeclaration>,
}

impl MetadataBuilder {
    pub fn new(access_annotations: Vec<AccessAnnotationEntry>) -> Self {
        Self {
            access_annotations,
            interfaces: BTreeMap::new(),
        }
    }

    /// Make an interface available for `extends` resolution.
    pub fn with_interface(mut self, declaration: QueryDeclaration) -> Self {
        self.interfaces
            .insert(declaration.name.clone(), declaration);
        self
    }

    pub fn interface(&self, name: &str) -> Option<&QueryDeclaration> {
        self.interfaces.get(name)
    }

    /// Build metadata for one entity/query pair.
    pub fn build(
        &self,
        entity: &EntityType,
        query: Option<&QueryDeclaration>,
        access_annotation: Option<&str>,
    ) -> Result<QueryMetadata, CatalogError> {
        let entry = access_annotation.and_then(|name| {
            self.access_annotations
                .iter()
                .find(|e| e.annotation == name)
        });
        if let Some(name) = access_annotation
            && entry.is_none()
        {
            tracing::warn!(
                annotation = %name,
                entity = %entity.name,
                "access annotation has no entry; query will be closed to every caller"
            );
        }
        let allowed_capabilities = entry.map(|e| e.capability_set()).unwrap_or_default();
        let allowed_services = entry.map(|e| e.service_set()).unwrap_or_default();

        let mut constraints = Vec::new();
        let mut orders = Vec::new();
        let mut selects = Vec::new();
        let mut types: Vec<(String, FormType)> = Vec::new();

        let query_class = match query {
            Some(query) => {
                if query.entity != entity.name {
                    return Err(CatalogError::EntityMismatch {
                        query: query.name.clone(),
                        declared: query.entity.clone(),
                        registered: entity.name.clone(),
                    });
                }
                for method in self.criteria_methods(query)? {
                    if let Some(constraint) = &method.constraint {
                        let (form, metadata) = constraint_metadata(query, method, constraint)?;
                        types.push((metadata.parameters_type_name.clone(), form));
                        constraints.push(metadata);
                    } else if let Some(order) = &method.order {
                        let (form, metadata) = order_metadata(query, method, order)?;
                        types.push((metadata.parameters_type_name.clone(), form));
                        orders.push(metadata);
                    } else if let Some(select) = &method.select {
                        let (form, metadata) = select_metadata(query, method, select)?;
                        types.push((metadata.parameters_type_name.clone(), form));
                        selects.push(metadata);
                    }
                }
                query.name.clone()
            }
            None => {
                types.extend(dynamic_types());
                format!("{}{DYNAMIC_QUERY_SUFFIX}", entity.name)
            }
        };

        let query_type = if constraints.is_empty() && orders.is_empty() && selects.is_empty() {
            dynamic_types()
                .into_iter()
                .find(|(name, _)| name == DYNAMIC_ROOT_TYPE_NAME)
                .map(|(_, form)| form)
                .unwrap_or_default()
        } else {
            // Grouped by kind, each group in declaration order.
            let names = constraints
                .iter()
                .map(|c| &c.parameters_type_name)
                .chain(orders.iter().map(|o| &o.parameters_type_name))
                .chain(selects.iter().map(|s| &s.parameters_type_name));
            FormType::new(
                names
                    .map(|name| Field::new(name.clone(), name.clone(), false))
                    .collect(),
            )
        };

        let mut type_map: BTreeMap<String, FormType> = types.into_iter().collect();
        type_map.insert(QUERY_TYPE_KEY.to_string(), query_type);

        Ok(QueryMetadata {
            query_web_action_path: QUERY_WEB_ACTION_PATH.to_string(),
            allowed_capabilities,
            allowed_services,
            access_annotation: access_annotation.map(str::to_string),
            table: entity.table.clone(),
            entity_class: entity.name.clone(),
            query_class,
            constraints,
            orders,
            selects,
            types: type_map,
        })
    }

    /// Own methods first, then inherited ones, skipping the base interfaces.
    ///
    /// A method redeclared lower in the hierarchy hides the inherited one.
    /// Overloads within one interface are all kept; the registry rejects
    /// the resulting duplicate parameter type names.
    fn criteria_methods<'a>(
        &'a self,
        query: &'a QueryDeclaration,
    ) -> Result<Vec<&'a MethodDeclaration>, CatalogError> {
        let mut methods: Vec<&MethodDeclaration> = Vec::new();
        let mut seen_methods: HashSet<&str> = HashSet::new();
        let mut visited: HashSet<&str> = HashSet::from([query.name.as_str()]);
        let mut pending: Vec<&QueryDeclaration> = vec![query];

        while !pending.is_empty() {
            let current = pending.remove(0);
            let inherited: Vec<&MethodDeclaration> = current
                .methods
                .iter()
                .filter(|m| !seen_methods.contains(m.name.as_str()))
                .collect();
            seen_methods.extend(inherited.iter().copied().map(|m| m.name.as_str()));
            methods.extend(inherited);
            for parent in &current.extends {
                if BASE_QUERY_INTERFACES.contains(&parent.as_str())
                    || !visited.insert(parent.as_str())
                {
                    continue;
                }
                let declaration =
                    self.interfaces
                        .get(parent)
                        .ok_or_else(|| CatalogError::UnknownInterface {
                            query: current.name.clone(),
                            interface: parent.clone(),
                        })?;
                pending.push(declaration);
            }
        }

        Ok(methods)
    }
}

/// The method's single parameter, if any.
fn only_parameter<'a>(
    query: &QueryDeclaration,
    method: &'a MethodDeclaration,
) -> Result<Option<&'a ParameterDeclaration>, CatalogError> {
    match method.parameters.as_slice() {
        [] => Ok(None),
        [parameter] => Ok(Some(parameter)),
        parameters => Err(CatalogError::TooManyParameters {
            query: query.name.clone(),
            method: method.name.clone(),
            count: parameters.len(),
        }),
    }
}

fn parameters_type_name(kind: &str, query: &QueryDeclaration, method: &MethodDeclaration) -> String {
    format!("{kind}/{}/{}", query.name, method.name)
}

fn constraint_metadata(
    query: &QueryDeclaration,
    method: &MethodDeclaration,
    constraint: &ConstraintAnnotation,
) -> Result<(FormType, ConstraintMetadata), CatalogError> {
    let field = match only_parameter(query, method)? {
        Some(parameter) => parameter_field(query, method, parameter)?,
        None => Field::new("Add Constraint", "Boolean", false),
    };
    Ok((
        FormType::new(vec![field]),
        ConstraintMetadata {
            name: method.name.clone(),
            parameters_type_name: parameters_type_name("Constraint", query, method),
            path: constraint.path.clone(),
            operator: constraint.operator,
        },
    ))
}

fn order_metadata(
    query: &QueryDeclaration,
    method: &MethodDeclaration,
    order: &OrderAnnotation,
) -> Result<(FormType, OrderMetadata), CatalogError> {
    let field = match only_parameter(query, method)? {
        Some(parameter) => parameter_field(query, method, parameter)?,
        None => Field::new(
            format!("Add Order (path={}, asc={})", order.path, order.asc),
            "Boolean",
            false,
        ),
    };
    Ok((
        FormType::new(vec![field]),
        OrderMetadata {
            name: method.name.clone(),
            parameters_type_name: parameters_type_name("Order", query, method),
            path: order.path.clone(),
            ascending: order.asc,
        },
    ))
}

fn select_metadata(
    query: &QueryDeclaration,
    method: &MethodDeclaration,
    select: &SelectAnnotation,
) -> Result<(FormType, SelectMetadata), CatalogError> {
    let paths: Vec<String> = if !select.path.is_empty() {
        vec![select.path.clone()]
    } else if let Some(projection) = &select.projection {
        projection
            .properties
            .iter()
            .map(|p| p.path.clone())
            .collect()
    } else {
        Vec::new()
    };

    let fields = match only_parameter(query, method)? {
        Some(parameter) if parameter.param_type == ParamType::Session => vec![Field::new(
            format!("Add Select (paths=[{}])", paths.join(", ")),
            "Boolean",
            false,
        )],
        Some(parameter) => vec![parameter_field(query, method, parameter)?],
        None => Vec::new(),
    };

    Ok((
        FormType::new(fields),
        SelectMetadata {
            name: method.name.clone(),
            parameters_type_name: parameters_type_name("Select", query, method),
            paths,
        },
    ))
}

fn parameter_field(
    query: &QueryDeclaration,
    method: &MethodDeclaration,
    parameter: &ParameterDeclaration,
) -> Result<Field, CatalogError> {
    create_field(&parameter.param_type, &parameter.name, parameter.vararg).ok_or_else(|| {
        CatalogError::NestedList {
            query: query.name.clone(),
            method: method.name.clone(),
        }
    })
}

/// Form field for a parameter type; `None` for lists nested in lists.
fn create_field(param_type: &ParamType, name: &str, repeated: bool) -> Option<Field> {
    if let Some(primitive) = param_type.primitive_name() {
        return Some(Field::new(name, primitive, repeated));
    }
    match param_type {
        ParamType::Id => Some(Field::new(name, "Long", repeated)),
        ParamType::Enum {
            name: enum_name,
            values,
        } => Some(enum_field(
            name,
            enum_name,
            values.iter().map(String::as_str),
            repeated,
        )),
        ParamType::List(inner) => {
            if repeated {
                return None;
            }
            create_field(inner, name, true)
        }
        other => Some(Field::new(name, other.to_string(), repeated)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::catalog::declaration::{ProjectionDeclaration, ProjectionProperty};

    fn movie() -> EntityType {
        EntityType::new("Movie", "movies", &["id", "title", "year", "rating"])
    }

    fn admin_entry() -> AccessAnnotationEntry {
        AccessAnnotationEntry {
            annotation: "AdminDashboardAccess".to_string(),
            capabilities: vec!["admin".to_string()],
            services: vec!["ops".to_string()],
        }
    }

    fn movie_query() -> QueryDeclaration {
        QueryDeclaration {
            name: "MovieQuery".to_string(),
            entity: "Movie".to_string(),
            extends: vec!["Query".to_string()],
            methods: vec![
                MethodDeclaration::constraint("title", "title", Operator::Eq)
                    .param("title", ParamType::String),
                MethodDeclaration::constraint("rated", "rating", Operator::IsNotNull),
                MethodDeclaration::order("yearDesc", "year", false),
                MethodDeclaration::select(
                    "listAsTitles",
                    SelectAnnotation {
                        path: String::new(),
                        projection: Some(ProjectionDeclaration {
                            name: "TitleAndYear".to_string(),
                            properties: vec![
                                ProjectionProperty {
                                    name: "title".to_string(),
                                    path: "title".to_string(),
                                },
                                ProjectionProperty {
                                    name: "year".to_string(),
                                    path: "year".to_string(),
                                },
                            ],
                        }),
                    },
                )
                .param("session", ParamType::Session),
                MethodDeclaration {
                    name: "helper".to_string(),
                    parameters: Vec::new(),
                    constraint: None,
                    order: None,
                    select: None,
                },
            ],
        }
    }

    #[test]
    fn static_query_metadata() {
        let builder = MetadataBuilder::new(vec![admin_entry()]);
        let metadata = builder
            .build(&movie(), Some(&movie_query()), Some("AdminDashboardAccess"))
            .unwrap();

        assert_eq!(metadata.query_class, "MovieQuery");
        assert_eq!(metadata.entity_class, "Movie");
        assert_eq!(metadata.table, "movies");
        assert_eq!(metadata.query_web_action_path, QUERY_WEB_ACTION_PATH);
        assert!(metadata.allowed_capabilities.contains("admin"));
        assert!(metadata.allowed_services.contains("ops"));
        assert_eq!(
            metadata.access_annotation.as_deref(),
            Some("AdminDashboardAccess")
        );

        assert_eq!(metadata.constraints.len(), 2);
        assert_eq!(
            metadata.constraints[0].parameters_type_name,
            "Constraint/MovieQuery/title"
        );
        assert_eq!(metadata.orders[0].path, "year");
        assert!(!metadata.orders[0].ascending);
        assert_eq!(metadata.selects[0].paths, vec!["title", "year"]);
    }

    #[test]
    fn parameter_forms() {
        let builder = MetadataBuilder::default();
        let metadata = builder.build(&movie(), Some(&movie_query()), None).unwrap();

        assert_eq!(
            metadata.types["Constraint/MovieQuery/title"].fields,
            vec![Field::new("title", "String", false)]
        );
        assert_eq!(
            metadata.types["Constraint/MovieQuery/rated"].fields,
            vec![Field::new("Add Constraint", "Boolean", false)]
        );
        assert_eq!(
            metadata.types["Order/MovieQuery/yearDesc"].fields,
            vec![Field::new("Add Order (path=year, asc=false)", "Boolean", false)]
        );
        assert_eq!(
            metadata.types["Select/MovieQuery/listAsTitles"].fields,
            vec![Field::new("Add Select (paths=[title, year])", "Boolean", false)]
        );

        let root = &metadata.types[QUERY_TYPE_KEY];
        assert_eq!(root.fields.len(), 4);
        assert!(root.fields.iter().all(|f| f.name == f.type_name));
        assert!(!metadata.types.contains_key(DYNAMIC_ROOT_TYPE_NAME));
    }

    #[test]
    fn query_type_groups_fields_by_kind() {
        let mut query = movie_query();
        query.methods = vec![
            MethodDeclaration::order("yearDesc", "year", false),
            MethodDeclaration::select(
                "titles",
                SelectAnnotation {
                    path: "title".to_string(),
                    projection: None,
                },
            ),
            MethodDeclaration::constraint("rated", "rating", Operator::IsNotNull),
            MethodDeclaration::order("titleAsc", "title", true),
            MethodDeclaration::constraint("title", "title", Operator::Eq)
                .param("title", ParamType::String),
        ];
        let metadata = MetadataBuilder::default()
            .build(&movie(), Some(&query), None)
            .unwrap();

        let names: Vec<&str> = metadata.types[QUERY_TYPE_KEY]
            .fields
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "Constraint/MovieQuery/rated",
                "Constraint/MovieQuery/title",
                "Order/MovieQuery/yearDesc",
                "Order/MovieQuery/titleAsc",
                "Select/MovieQuery/titles",
            ]
        );
    }

    #[test]
    fn dynamic_only_metadata() {
        let metadata = MetadataBuilder::default()
            .build(&movie(), None, None)
            .unwrap();

        assert_eq!(metadata.query_class, "MovieDynamicQuery");
        assert!(metadata.is_dynamic());
        assert!(metadata.constraints.is_empty());
        assert!(metadata.allowed_capabilities.is_empty());
        for name in [
            DYNAMIC_CONSTRAINT_TYPE_NAME,
            DYNAMIC_ORDER_TYPE_NAME,
            DYNAMIC_ORDER_LIST_TYPE_NAME,
            DYNAMIC_SELECT_TYPE_NAME,
            DYNAMIC_ROOT_TYPE_NAME,
        ] {
            assert!(metadata.types.contains_key(name), "missing {name}");
        }
        assert_eq!(
            metadata.types[QUERY_TYPE_KEY],
            metadata.types[DYNAMIC_ROOT_TYPE_NAME]
        );

        let operator = &metadata.types[DYNAMIC_CONSTRAINT_TYPE_NAME].fields[1];
        assert!(operator.type_name.starts_with("Enum<Operator,LT,LE,EQ"));
    }

    #[test]
    fn more_than_one_parameter_fails() {
        let mut query = movie_query();
        query.methods.push(
            MethodDeclaration::constraint("between", "year", Operator::Ge)
                .param("from", ParamType::Int)
                .param("to", ParamType::Int),
        );

        let err = MetadataBuilder::default()
            .build(&movie(), Some(&query), None)
            .unwrap_err();
        assert!(matches!(
            err,
            CatalogError::TooManyParameters { ref method, count: 2, .. } if method == "between"
        ));
    }

    #[test]
    fn list_and_id_parameters() {
        let query = QueryDeclaration {
            name: "MovieQuery".to_string(),
            entity: "Movie".to_string(),
            extends: vec![],
            methods: vec![
                MethodDeclaration::constraint("ids", "id", Operator::In)
                    .param("ids", ParamType::List(Box::new(ParamType::Id))),
                MethodDeclaration::constraint("titles", "title", Operator::In)
                    .vararg("titles", ParamType::String),
            ],
        };
        let metadata = MetadataBuilder::default()
            .build(&movie(), Some(&query), None)
            .unwrap();

        assert_eq!(
            metadata.types["Constraint/MovieQuery/ids"].fields,
            vec![Field::new("ids", "Long", true)]
        );
        assert_eq!(
            metadata.types["Constraint/MovieQuery/titles"].fields,
            vec![Field::new("titles", "String", true)]
        );
    }

    #[test]
    fn nested_lists_fail() {
        let query = QueryDeclaration {
            name: "MovieQuery".to_string(),
            entity: "Movie".to_string(),
            extends: vec![],
            methods: vec![
                MethodDeclaration::constraint("ids", "id", Operator::In)
                    .vararg("ids", ParamType::List(Box::new(ParamType::Long))),
            ],
        };
        let err = MetadataBuilder::default()
            .build(&movie(), Some(&query), None)
            .unwrap_err();
        assert!(matches!(err, CatalogError::NestedList { .. }));
    }

    #[test]
    fn inherited_methods_are_included() {
        let base = QueryDeclaration {
            name: "Rateable".to_string(),
            entity: "Movie".to_string(),
            extends: vec!["Query".to_string()],
            methods: vec![
                MethodDeclaration::order("ratingDesc", "rating", false),
                MethodDeclaration::constraint("title", "title", Operator::Ne)
                    .param("title", ParamType::String),
            ],
        };
        let mut query = movie_query();
        query.extends = vec!["Rateable".to_string(), "Any".to_string()];

        let builder = MetadataBuilder::default().with_interface(base);
        let metadata = builder.build(&movie(), Some(&query), None).unwrap();

        let order_names: Vec<_> = metadata.orders.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(order_names, vec!["yearDesc", "ratingDesc"]);
        // The query's own `title` hides the inherited one.
        let title = metadata.constraints.iter().find(|c| c.name == "title").unwrap();
        assert_eq!(title.operator, Operator::Eq);
    }

    #[test]
    fn unknown_interface_fails() {
        let mut query = movie_query();
        query.extends = vec!["Missing".to_string()];
        let err = MetadataBuilder::default()
            .build(&movie(), Some(&query), None)
            .unwrap_err();
        assert!(matches!(err, CatalogError::UnknownInterface { .. }));
    }

    #[test]
    fn entity_mismatch_fails() {
        let actor = EntityType::new("Actor", "actors", &["id", "name"]);
        let err = MetadataBuilder::default()
            .build(&actor, Some(&movie_query()), None)
            .unwrap_err();
        assert!(matches!(err, CatalogError::EntityMismatch { .. }));
    }
}
