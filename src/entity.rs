// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Searchable entities.
//!
//! Application types opt in by implementing [`Searchable`]. Serde drives the
//! document shape, so property names in the [`EntitySchema`] must match the
//! serialized field names. Because empty values are stripped before indexing,
//! entity types should deserialize with `#[serde(default)]`.
//!
//! ```rust
//! use entity_search::{EntitySchema, PropertyType, Searchable};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Default, Serialize, Deserialize)]
//! #[serde(default)]
//! struct Article {
//!     id: u64,
//!     title: String,
//!     tags: Vec<String>,
//! }
//!
//! impl Searchable for Article {
//!     fn schema() -> EntitySchema {
//!         EntitySchema::new("Article")
//!             .id("id", PropertyType::long())
//!             .text("title")
//!             .keywords("tags")
//!     }
//!
//!     fn search_id(&self) -> String {
//!         self.id.to_string()
//!     }
//! }
//! ```

use std::any::{Any, TypeId};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::schema::EntitySchema;

/// An application type stored as documents in the search cluster.
pub trait Searchable: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Searchable description of this type.
    fn schema() -> EntitySchema;

    /// Identifier used as the document id.
    fn search_id(&self) -> String;
}

/// Type-erased entity, as handed out by a primary store.
pub trait AnyEntity: Send + Sync {
    fn entity_id(&self) -> String;

    fn to_json(&self) -> Result<serde_json::Value, serde_json::Error>;

    fn entity_type_id(&self) -> TypeId;

    fn as_any(&self) -> &dyn Any;
}

impl<T: Searchable> AnyEntity for T {
    fn entity_id(&self) -> String {
        self.search_id()
    }

    fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    fn entity_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl std::fmt::Debug for dyn AnyEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyEntity")
            .field("id", &self.entity_id())
            .finish()
    }
}

/// An entity decoded from a search hit through the catalog dispatch table.
pub struct DecodedEntity {
    type_name: String,
    id: String,
    inner: Box<dyn Any + Send + Sync>,
}

impl DecodedEntity {
    pub(crate) fn new(type_name: String, id: String, inner: Box<dyn Any + Send + Sync>) -> Self {
        Self { type_name, id, inner }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is<T: Searchable>(&self) -> bool {
        self.inner.is::<T>()
    }

    pub fn downcast_ref<T: Searchable>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Take the concrete entity, or get `self` back if the type does not match.
    pub fn downcast<T: Searchable>(self) -> Result<T, Self> {
        let Self { type_name, id, inner } = self;
        match inner.downcast::<T>() {
            Ok(entity) => Ok(*entity),
            Err(inner) => Err(Self { type_name, id, inner }),
        }
    }
}

impl std::fmt::Debug for DecodedEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedEntity")
            .field("type_name", &self.type_name)
            .field("id", &self.id)
            .finish()
    }
}
