//! YAML catalog files.
//!
//! A catalog file declares entities, query interfaces, access annotations
//! and the registrations tying them together. It may also carry fixture
//! rows, used to back an in-memory executor when no database is configured.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::declaration::QueryDeclaration;
use super::registry::{QueryRegistry, RegistryBuilder};
use super::CatalogError;
use crate::access::AccessAnnotationEntry;
use crate::executor::{EntityType, MemoryTransacter};

/// Maximum catalog file size (1 MB).
const MAX_CATALOG_FILE_SIZE: u64 = 1024 * 1024;

/// Demo catalog bundled with the binary.
const DEMO_CATALOG: &str = include_str!("../../catalog/movies.yml");

/// Ties an entity to a declared query, or to dynamic queries only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogRegistration {
    pub entity: String,

    /// Declared query interface; absent for dynamic-only registrations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_annotation: Option<String>,
}

/// Parsed catalog file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub entities: Vec<EntityType>,

    #[serde(default)]
    pub queries: Vec<QueryDeclaration>,

    #[serde(default)]
    pub access_annotations: Vec<AccessAnnotationEntry>,

    #[serde(default)]
    pub registrations: Vec<CatalogRegistration>,

    /// Entity name -> rows, keyed by member name.
    #[serde(default)]
    pub fixtures: BTreeMap<String, Vec<serde_json::Value>>,
}

impl CatalogFile {
    /// Parse a catalog from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yml::from_str(yaml).context("failed to parse catalog YAML")
    }

    /// Read and parse a catalog file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let metadata = std::fs::metadata(path)
            .with_context(|| format!("failed to stat catalog {}", path.display()))?;
        if metadata.len() > MAX_CATALOG_FILE_SIZE {
            anyhow::bail!(
                "catalog {} is {} bytes, larger than the {} byte limit",
                path.display(),
                metadata.len(),
                MAX_CATALOG_FILE_SIZE
            );
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog {}", path.display()))?;
        let catalog = Self::from_yaml_str(&contents)
            .with_context(|| format!("invalid catalog {}", path.display()))?;
        info!(
            path = %path.display(),
            entities = catalog.entities.len(),
            queries = catalog.queries.len(),
            registrations = catalog.registrations.len(),
            "loaded catalog"
        );
        Ok(catalog)
    }

    /// The bundled movie catalog.
    pub fn demo() -> Result<Self> {
        Self::from_yaml_str(DEMO_CATALOG).context("invalid bundled demo catalog")
    }

    /// Build the registry described by this file.
    pub fn to_registry(&self) -> Result<QueryRegistry, CatalogError> {
        let mut builder = RegistryBuilder::new();
        for entity in &self.entities {
            builder = builder.entity(entity.clone());
        }
        for query in &self.queries {
            builder = builder.query_interface(query.clone());
        }
        for entry in &self.access_annotations {
            builder = builder.access_annotation(entry.clone());
        }
        for registration in &self.registrations {
            let annotation = registration.access_annotation.as_deref();
            builder = match &registration.query {
                Some(query) => builder.add_query(&registration.entity, query, annotation),
                None => builder.add_dynamic_only_query(&registration.entity, annotation),
            };
        }
        builder.build()
    }

    /// An in-memory executor over every entity, seeded with the fixtures.
    pub fn memory_transacter(&self, name: &str) -> MemoryTransacter {
        self.entities
            .iter()
            .fold(MemoryTransacter::new(name), |transacter, entity| {
                let rows = self.fixtures.get(&entity.name).cloned().unwrap_or_default();
                transacter.with_entity(entity.clone(), rows)
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn demo_catalog_builds() {
        let catalog = CatalogFile::demo().unwrap();
        let registry = catalog.to_registry().unwrap();

        assert!(registry.find("MovieQuery").is_some());
        assert!(registry.find("MovieDynamicQuery").is_some());
        assert!(!catalog.fixtures["Movie"].is_empty());
    }

    #[test]
    fn minimal_catalog() {
        let yaml = r#"
entities:
  - name: Actor
    table: actors
    members:
      - name: id
      - name: fullName
        column: full_name
registrations:
  - entity: Actor
"#;
        let catalog = CatalogFile::from_yaml_str(yaml).unwrap();
        assert_eq!(catalog.entities[0].members[1].column(), "full_name");

        let registry = catalog.to_registry().unwrap();
        let metadata = registry.find("ActorDynamicQuery").unwrap();
        assert_eq!(metadata.table, "actors");

        let transacter = catalog.memory_transacter("actors");
        assert_eq!(transacter.row_count("Actor"), 0);
    }

    #[test]
    fn invalid_yaml_is_reported() {
        let err = CatalogFile::from_yaml_str("entities: [").unwrap_err();
        assert!(err.to_string().contains("catalog"));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = CatalogFile::from_path(Path::new("/nonexistent/catalog.yml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/catalog.yml"));
    }
}
