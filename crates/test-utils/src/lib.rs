//! querydeck test utilities.
//!
//! Helpers for integration testing: a small movie catalog declared in
//! code, an in-memory executor holding its rows, callers, and request
//! builders carrying forwarded identity headers.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, header};
use serde_json::{Value, json};

use querydeck_kernel::access::{AccessAnnotationEntry, Caller, DashboardAccess};
use querydeck_kernel::catalog::declaration::{
    ProjectionDeclaration, ProjectionProperty, SelectAnnotation,
};
use querydeck_kernel::catalog::{
    CatalogError, MethodDeclaration, ParamType, QueryDeclaration, QueryRegistry, RegistryBuilder,
};
use querydeck_kernel::dispatch::QueryDispatcher;
use querydeck_kernel::executor::{EntityMember, EntityType, MemoryTransacter, TransacterSet};
use querydeck_kernel::middleware::caller::{CAPABILITIES_HEADER, SERVICE_HEADER, USER_HEADER};
use querydeck_kernel::query::{Operator, QueryLimits};
use querydeck_kernel::routes;
use querydeck_kernel::state::AppState;

/// Capability granting both dashboard and movie query access.
pub const ADMIN_CAPABILITY: &str = "admin";

/// Service allowed to query movies.
pub const MOVIE_SERVICE: &str = "ops-dashboard";

/// The `Movie` entity.
pub fn movie() -> EntityType {
    EntityType {
        name: "Movie".to_string(),
        table: "movies".to_string(),
        members: vec![
            EntityMember::new("id"),
            EntityMember::new("title"),
            EntityMember::with_column("year", "release_year"),
            EntityMember::new("rating"),
        ],
    }
}

/// Rows backing the `Movie` entity.
pub fn movie_rows() -> Vec<Value> {
    vec![
        json!({"id": 1, "title": "Up", "year": 2009, "rating": 8.3}),
        json!({"id": 2, "title": "Jaws", "year": 1975, "rating": 8.1}),
        json!({"id": 3, "title": "Alien", "year": 1979, "rating": 8.5}),
        json!({"id": 4, "title": "Heat", "year": 1995, "rating": null}),
    ]
}

/// The `Actor` entity, registered but not managed by any executor.
pub fn actor() -> EntityType {
    EntityType::new("Actor", "actors", &["id", "name"])
}

/// `MovieQuery`: a title constraint, a rating order, and two selects.
pub fn movie_query() -> QueryDeclaration {
    QueryDeclaration {
        name: "MovieQuery".to_string(),
        entity: "Movie".to_string(),
        extends: vec!["Query".to_string()],
        methods: vec![
            MethodDeclaration::constraint("title", "title", Operator::Eq)
                .param("title", ParamType::String),
            MethodDeclaration::constraint("releasedBefore", "year", Operator::Lt)
                .param("year", ParamType::Int),
            MethodDeclaration::order("bestFirst", "rating", false),
            MethodDeclaration::select(
                "titles",
                SelectAnnotation {
                    path: "title".to_string(),
                    projection: None,
                },
            )
            .param("session", ParamType::Session),
            MethodDeclaration::select(
                "titleAndYear",
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
        ],
    }
}

/// Registry with `MovieQuery`, `MovieDynamicQuery` and `ActorDynamicQuery`.
pub fn movie_registry() -> Result<QueryRegistry, CatalogError> {
    RegistryBuilder::new()
        .entity(movie())
        .entity(actor())
        .query_interface(movie_query())
        .access_annotation(AccessAnnotationEntry {
            annotation: "AdminDashboardAccess".to_string(),
            capabilities: vec![ADMIN_CAPABILITY.to_string()],
            services: vec![MOVIE_SERVICE.to_string()],
        })
        .add_query("Movie", "MovieQuery", Some("AdminDashboardAccess"))
        .add_dynamic_only_query("Movie", Some("AdminDashboardAccess"))
        .add_dynamic_only_query("Actor", Some("AdminDashboardAccess"))
        .build()
}

/// In-memory executor managing `Movie` only.
pub fn movie_transacter() -> MemoryTransacter {
    MemoryTransacter::new("movies").with_entity(movie(), movie_rows())
}

/// Application state over the movie registry and executor.
pub fn test_state(limits: QueryLimits) -> Result<AppState, CatalogError> {
    let dispatcher = QueryDispatcher::new(
        Arc::new(movie_registry()?),
        TransacterSet::new().with(Arc::new(movie_transacter())),
        limits,
    );
    let dashboard = DashboardAccess::new(
        vec![ADMIN_CAPABILITY.to_string(), "viewer".to_string()],
        vec![MOVIE_SERVICE.to_string()],
    );
    Ok(AppState::from_parts(dispatcher, dashboard))
}

/// The full router over [`test_state`] with default limits.
pub fn test_app() -> Result<axum::Router, CatalogError> {
    Ok(routes::app(test_state(QueryLimits::default())?))
}

/// A user holding the admin capability.
pub fn admin() -> Caller {
    Caller::user("admin-user", [ADMIN_CAPABILITY])
}

/// A user allowed on the dashboard but not to query movies.
pub fn viewer() -> Caller {
    Caller::user("viewer-user", ["viewer"])
}

/// A request builder carrying the caller's forwarded identity headers.
pub fn request_as(caller: &Caller) -> axum::http::request::Builder {
    let mut builder = Request::builder();
    if let Some(user) = &caller.user {
        builder = builder.header(USER_HEADER, user);
        let mut capabilities: Vec<&str> = caller.capabilities.iter().map(String::as_str).collect();
        capabilities.sort_unstable();
        builder = builder.header(CAPABILITIES_HEADER, capabilities.join(","));
    }
    if let Some(service) = &caller.service {
        builder = builder.header(SERVICE_HEADER, service);
    }
    builder
}

/// A JSON POST request from `caller`.
pub fn post_json(caller: &Caller, uri: &str, body: &Value) -> axum::http::Result<Request<Body>> {
    request_as(caller)
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
}

/// A GET request from `caller`.
pub fn get(caller: &Caller, uri: &str) -> axum::http::Result<Request<Body>> {
    request_as(caller).method("GET").uri(uri).body(Body::empty())
}
