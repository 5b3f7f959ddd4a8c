//! Query registry.
//!
//! Entities, query interfaces and access annotations are registered on a
//! [`RegistryBuilder`] during startup. [`RegistryBuilder::build`] validates
//! everything and produces an immutable [`QueryRegistry`], which is then
//! shared through `Arc` and optionally installed process-wide.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, OnceLock};

use super::CatalogError;
use super::builder::MetadataBuilder;
use super::declaration::QueryDeclaration;
use super::types::QueryMetadata;
use crate::access::AccessAnnotationEntry;
use crate::executor::EntityType;

/// One entity/query pairing to catalogue.
#[derive(Debug, Clone)]
struct Registration {
    entity: String,
    query: Option<String>,
    access_annotation: Option<String>,
}

/// Collects registrations before the registry is frozen.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entities: BTreeMap<String, EntityType>,
    queries: BTreeMap<String, QueryDeclaration>,
    access_annotations: Vec<AccessAnnotationEntry>,
    registrations: Vec<Registration>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an entity.
    pub fn entity(mut self, entity: EntityType) -> Self {
        self.entities.insert(entity.name.clone(), entity);
        self
    }

    /// Declare a query interface. Declaring does not register it; an
    /// interface may exist only to be extended.
    pub fn query_interface(mut self, declaration: QueryDeclaration) -> Self {
        self.queries.insert(declaration.name.clone(), declaration);
        self
    }

    /// Declare an access annotation.
    pub fn access_annotation(mut self, entry: AccessAnnotationEntry) -> Self {
        self.access_annotations.push(entry);
        self
    }

    /// Register a declared query against its entity.
    pub fn add_query(
        mut self,
        entity: impl Into<String>,
        query: impl Into<String>,
        access_annotation: Option<&str>,
    ) -> Self {
        self.registrations.push(Registration {
            entity: entity.into(),
            query: Some(query.into()),
            access_annotation: access_annotation.map(str::to_string),
        });
        self
    }

    /// Register an entity for dynamic queries only.
    pub fn add_dynamic_only_query(
        mut self,
        entity: impl Into<String>,
        access_annotation: Option<&str>,
    ) -> Self {
        self.registrations.push(Registration {
            entity: entity.into(),
            query: None,
            access_annotation: access_annotation.map(str::to_string),
        });
        self
    }

    /// Build every metadata entry and freeze the registry.
    pub fn build(self) -> Result<QueryRegistry, CatalogError> {
        let metadata_builder = self
            .queries
            .values()
            .cloned()
            .fold(
                MetadataBuilder::new(self.access_annotations.clone()),
                MetadataBuilder::with_interface,
            );

        let mut metadata: BTreeMap<String, QueryMetadata> = BTreeMap::new();
        for registration in &self.registrations {
            let entity = self
                .entities
                .get(&registration.entity)
                .ok_or_else(|| CatalogError::UnknownEntity(registration.entity.clone()))?;
            let query = registration
                .query
                .as_ref()
                .map(|name| {
                    self.queries
                        .get(name)
                        .ok_or_else(|| CatalogError::UnknownQuery(name.clone()))
                })
                .transpose()?;

            let built = metadata_builder.build(
                entity,
                query,
                registration.access_annotation.as_deref(),
            )?;

            let mut seen = HashSet::new();
            for name in built.parameter_type_names() {
                if !seen.insert(name) {
                    return Err(CatalogError::DuplicateParameterType {
                        query: built.query_class.clone(),
                        name: name.to_string(),
                    });
                }
            }

            if metadata.contains_key(&built.query_class) {
                return Err(CatalogError::DuplicateQueryClass(built.query_class));
            }
            tracing::debug!(
                query_class = %built.query_class,
                entity = %built.entity_class,
                constraints = built.constraints.len(),
                orders = built.orders.len(),
                selects = built.selects.len(),
                "registered query"
            );
            metadata.insert(built.query_class.clone(), built);
        }

        Ok(QueryRegistry {
            metadata,
            queries: self.queries,
            entities: self.entities,
        })
    }
}

/// Immutable catalog of every registered query.
#[derive(Debug, Default)]
pub struct QueryRegistry {
    /// Query class -> metadata.
    metadata: BTreeMap<String, QueryMetadata>,
    queries: BTreeMap<String, QueryDeclaration>,
    entities: BTreeMap<String, EntityType>,
}

impl QueryRegistry {
    /// All metadata, sorted by query class.
    pub fn metadata(&self) -> impl Iterator<Item = &QueryMetadata> {
        self.metadata.values()
    }

    /// Metadata for a query class.
    pub fn find(&self, query_class: &str) -> Option<&QueryMetadata> {
        self.metadata.get(query_class)
    }

    /// A declared query interface.
    pub fn query(&self, name: &str) -> Option<&QueryDeclaration> {
        self.queries.get(name)
    }

    pub fn entity(&self, name: &str) -> Option<&EntityType> {
        self.entities.get(name)
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityType> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }
}

static INSTALLED: OnceLock<Arc<QueryRegistry>> = OnceLock::new();

/// Install the process-wide registry. Only the first call succeeds.
pub fn install(registry: Arc<QueryRegistry>) -> Result<(), CatalogError> {
    INSTALLED
        .set(registry)
        .map_err(|_| CatalogError::AlreadyInstalled)
}

/// The process-wide registry, if installed.
pub fn installed() -> Option<Arc<QueryRegistry>> {
    INSTALLED.get().cloned()
}
