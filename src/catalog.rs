// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Type catalog.
//!
//! Bidirectional mapping between document type names and entity types,
//! built once at startup and read-only afterwards. Every component that needs
//! it holds an `Arc<Catalog>`; nothing mutates it after [`CatalogBuilder::build`].
//!
//! ```rust
//! # use entity_search::{Catalog, EntitySchema, PropertyType, Searchable};
//! # use serde::{Deserialize, Serialize};
//! # #[derive(Default, Serialize, Deserialize)]
//! # #[serde(default)]
//! # struct Article { id: u64 }
//! # impl Searchable for Article {
//! #     fn schema() -> EntitySchema { EntitySchema::new("Article").id("id", PropertyType::long()) }
//! #     fn search_id(&self) -> String { self.id.to_string() }
//! # }
//! let catalog = Catalog::builder().register::<Article>().unwrap().build();
//!
//! assert_eq!(catalog.type_name_for::<Article>(), Some("article"));
//! assert_eq!(catalog.entity_type_for("article").unwrap().index_name(), "index_article");
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;

use tracing::{debug, info};

use crate::entity::Searchable;
use crate::schema::{EntitySchema, SchemaError, SchemaMapper, SchemaMapping};

/// Prefix of every index name.
pub const INDEX_PREFIX: &str = "index_";

/// Index name of a document type: the prefix plus the lower-cased type name.
pub fn index_name_for(type_name: &str) -> String {
    format!("{}{}", INDEX_PREFIX, type_name.to_lowercase())
}

type DecodeFn = fn(serde_json::Value) -> Result<Box<dyn Any + Send + Sync>, serde_json::Error>;

fn decode_boxed<T: Searchable>(value: serde_json::Value) -> Result<Box<dyn Any + Send + Sync>, serde_json::Error> {
    let entity: T = serde_json::from_value(value)?;
    Ok(Box::new(entity))
}

/// One registered entity type.
pub struct RegisteredType {
    type_name: String,
    index_name: String,
    rust_name: &'static str,
    type_id: TypeId,
    schema: EntitySchema,
    mapping: SchemaMapping,
    decode: DecodeFn,
}

impl RegisteredType {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Rust type name, for logs
    pub fn rust_name(&self) -> &'static str {
        self.rust_name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    pub fn mapping(&self) -> &SchemaMapping {
        &self.mapping
    }

    /// Deserialize a document source into this entity type.
    pub fn decode(&self, source: serde_json::Value) -> Result<Box<dyn Any + Send + Sync>, serde_json::Error> {
        (self.decode)(source)
    }
}

impl std::fmt::Debug for RegisteredType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredType")
            .field("type_name", &self.type_name)
            .field("index_name", &self.index_name)
            .field("rust_name", &self.rust_name)
            .field("fields", &self.mapping.len())
            .finish()
    }
}

/// Immutable registry of searchable entity types.
#[derive(Debug, Default)]
pub struct Catalog {
    types: Vec<RegisteredType>,
    by_name: HashMap<String, usize>,
    by_type: HashMap<TypeId, usize>,
}

impl Catalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::new()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Registered types in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredType> {
        self.types.iter()
    }

    pub fn type_names(&self) -> Vec<String> {
        self.types.iter().map(|t| t.type_name.clone()).collect()
    }

    /// Entity type registered under a document type name.
    pub fn entity_type_for(&self, type_name: &str) -> Option<&RegisteredType> {
        self.by_name.get(type_name).map(|&i| &self.types[i])
    }

    pub fn type_name_for<T: Searchable>(&self) -> Option<&str> {
        self.type_name_of(TypeId::of::<T>())
    }

    pub fn type_name_of(&self, type_id: TypeId) -> Option<&str> {
        self.registered_by_id(type_id).map(|t| t.type_name.as_str())
    }

    pub fn registered<T: Searchable>(&self) -> Option<&RegisteredType> {
        self.registered_by_id(TypeId::of::<T>())
    }

    pub fn registered_by_id(&self, type_id: TypeId) -> Option<&RegisteredType> {
        self.by_type.get(&type_id).map(|&i| &self.types[i])
    }
}

/// Collects entity types and derives their mappings.
#[derive(Debug)]
pub struct CatalogBuilder {
    mapper: SchemaMapper,
    catalog: Catalog,
    by_index: HashMap<String, usize>,
}

impl Default for CatalogBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::with_mapper(SchemaMapper::default())
    }

    pub fn with_mapper(mapper: SchemaMapper) -> Self {
        Self {
            mapper,
            catalog: Catalog::default(),
            by_index: HashMap::new(),
        }
    }

    /// Register an entity type.
    ///
    /// Embedded-only and synthetic schemas are skipped. Duplicate types,
    /// colliding type names and invalid mappings are errors.
    pub fn register<T: Searchable>(mut self) -> Result<Self, SchemaError> {
        let schema = T::schema();
        let rust_name = std::any::type_name::<T>();

        if !schema.is_root() || schema.is_synthetic() {
            debug!(entity = %rust_name, name = %schema.simple_name(), "Skipping non-root entity type");
            return Ok(self);
        }

        let type_id = TypeId::of::<T>();
        if self.catalog.by_type.contains_key(&type_id) {
            return Err(SchemaError::DuplicateEntity(rust_name.to_string()));
        }

        let type_name = schema.document_type_name();
        if type_name.is_empty() || type_name.contains(char::is_whitespace) {
            return Err(SchemaError::InvalidTypeName(type_name));
        }

        let index_name = index_name_for(&type_name);
        let existing = self
            .catalog
            .by_name
            .get(&type_name)
            .or_else(|| self.by_index.get(&index_name));
        if let Some(&i) = existing {
            return Err(SchemaError::DuplicateTypeName {
                type_name,
                first: self.catalog.types[i].rust_name.to_string(),
                second: rust_name.to_string(),
            });
        }

        let mapping = self.mapper.derive(&schema)?;
        debug!(entity = %rust_name, r#type = %type_name, fields = mapping.len(), "Registered entity type");

        let position = self.catalog.types.len();
        self.catalog.by_name.insert(type_name.clone(), position);
        self.catalog.by_type.insert(type_id, position);
        self.by_index.insert(index_name.clone(), position);
        self.catalog.types.push(RegisteredType {
            type_name,
            index_name,
            rust_name,
            type_id,
            schema,
            mapping,
            decode: decode_boxed::<T>,
        });
        Ok(self)
    }

    pub fn build(self) -> Catalog {
        info!(types = self.catalog.len(), "Search catalog built");
        self.catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::PropertyType;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    #[serde(default)]
    struct Article {
        id: u64,
        title: String,
    }

    impl Searchable for Article {
        fn schema() -> EntitySchema {
            EntitySchema::new("Article").id("id", PropertyType::long()).text("title")
        }
        fn search_id(&self) -> String {
            self.id.to_string()
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct News;

    impl Searchable for News {
        fn schema() -> EntitySchema {
            EntitySchema::new("News").type_name("article")
        }
        fn search_id(&self) -> String {
            String::new()
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Shouting;

    impl Searchable for Shouting {
        fn schema() -> EntitySchema {
            EntitySchema::new("Shouting").type_name("ARTICLE")
        }
        fn search_id(&self) -> String {
            String::new()
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Address;

    impl Searchable for Address {
        fn schema() -> EntitySchema {
            EntitySchema::new("Address").embedded_only()
        }
        fn search_id(&self) -> String {
            String::new()
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Inner;

    impl Searchable for Inner {
        fn schema() -> EntitySchema {
            EntitySchema::new("Outer$Inner")
        }
        fn search_id(&self) -> String {
            String::new()
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Spaced;

    impl Searchable for Spaced {
        fn schema() -> EntitySchema {
            EntitySchema::new("Spaced").type_name("two words")
        }
        fn search_id(&self) -> String {
            String::new()
        }
    }

    #[test]
    fn test_index_name_for() {
        assert_eq!(index_name_for("article"), "index_article");
        assert_eq!(index_name_for("blogPost"), "index_blogpost");
        assert_eq!(index_name_for("blogPost"), index_name_for("blogPost"));
        assert_ne!(index_name_for("article"), index_name_for("articles"));
    }

    #[test]
    fn test_register_and_lookup() {
        let catalog = Catalog::builder().register::<Article>().unwrap().build();

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.type_name_for::<Article>(), Some("article"));
        let registered = catalog.entity_type_for("article").unwrap();
        assert_eq!(registered.index_name(), "index_article");
        assert_eq!(registered.type_id(), TypeId::of::<Article>());
        assert_eq!(registered.mapping().len(), 2);
        assert!(catalog.entity_type_for("unknown").is_none());
        assert!(catalog.type_name_for::<News>().is_none());
    }

    #[test]
    fn test_decode_dispatch() {
        let catalog = Catalog::builder().register::<Article>().unwrap().build();
        let registered = catalog.entity_type_for("article").unwrap();

        let decoded = registered
            .decode(serde_json::json!({"id": 3, "title": "hello"}))
            .unwrap();
        let article = decoded.downcast::<Article>().unwrap();
        assert_eq!(*article, Article { id: 3, title: "hello".into() });
    }

    #[test]
    fn test_duplicate_type_name_rejected() {
        let err = Catalog::builder()
            .register::<Article>()
            .unwrap()
            .register::<News>()
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateTypeName { ref type_name, .. } if type_name == "article"));
    }

    #[test]
    fn test_index_collision_rejected() {
        let err = Catalog::builder()
            .register::<Article>()
            .unwrap()
            .register::<Shouting>()
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateTypeName { .. }));
    }

    #[test]
    fn test_duplicate_entity_rejected() {
        let err = Catalog::builder()
            .register::<Article>()
            .unwrap()
            .register::<Article>()
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateEntity(_)));
    }

    #[test]
    fn test_skips_embedded_and_synthetic() {
        let catalog = Catalog::builder()
            .register::<Address>()
            .unwrap()
            .register::<Inner>()
            .unwrap()
            .build();
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_invalid_type_name() {
        let err = Catalog::builder().register::<Spaced>().unwrap_err();
        assert!(matches!(err, SchemaError::InvalidTypeName(_)));
    }

    #[test]
    fn test_type_name_case_kept_index_name_lowered() {
        let catalog = Catalog::builder()
            .register::<Shouting>()
            .unwrap()
            .build();
        assert_eq!(catalog.type_names(), vec!["ARTICLE".to_string()]);
        assert_eq!(catalog.entity_type_for("ARTICLE").unwrap().index_name(), "index_article");
    }
}
