// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Document codec.
//!
//! Encoding keeps only marker-carrying properties and strips empty values:
//!
//! ```text
//! Article { id: 1, title: "hello world", tags: [], draft_notes: "x" }
//!     ↓ encode (draft_notes unmarked, tags empty)
//! { "id": 1, "title": "hello world" }
//! ```
//!
//! Decoding resolves the entity type from the document type tag through the
//! catalog's dispatch table. An unknown tag is [`SearchError::UnknownType`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, warn};

use crate::catalog::Catalog;
use crate::entity::{AnyEntity, DecodedEntity, Searchable};
use crate::error::SearchError;
use crate::schema::{EntitySchema, Marker};

/// Serialized, field-stripped form of one entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn to_json_string(&self) -> String {
        Value::Object(self.0.clone()).to_string()
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        doc.into_value()
    }
}

/// Whether a value is dropped before indexing: null, blank string or empty array.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Remove empty values from one level of a document.
pub fn strip_empty(map: &mut Map<String, Value>) {
    map.retain(|_, value| !is_empty_value(value));
}

/// Converts entities to documents and back.
#[derive(Debug, Clone)]
pub struct DocumentCodec {
    catalog: Arc<Catalog>,
}

impl DocumentCodec {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Encode an entity. `None` means "skip this record": the entity could
    /// not be serialized (already logged).
    pub fn encode<T: Searchable>(&self, entity: &T) -> Option<Document> {
        let schema = match self.catalog.registered::<T>() {
            Some(registered) => registered.schema().clone(),
            None => T::schema(),
        };
        encode_with(&schema, &entity.search_id(), serde_json::to_value(entity))
    }

    /// Encode a type-erased entity from a primary store page.
    pub fn encode_any(&self, entity: &dyn AnyEntity) -> Option<Document> {
        let id = entity.entity_id();
        let Some(registered) = self.catalog.registered_by_id(entity.entity_type_id()) else {
            error!(id = %id, "Cannot encode entity of unregistered type");
            return None;
        };
        encode_with(registered.schema(), &id, entity.to_json())
    }

    /// Decode a document source using its type tag.
    pub fn decode(&self, doc_type: &str, id: &str, source: Value) -> Result<DecodedEntity, SearchError> {
        let registered = self
            .catalog
            .entity_type_for(doc_type)
            .ok_or_else(|| SearchError::UnknownType(doc_type.to_string()))?;
        let inner = registered
            .decode(source)
            .map_err(|e| SearchError::decode(doc_type, id, e))?;
        Ok(DecodedEntity::new(doc_type.to_string(), id.to_string(), inner))
    }

    /// Decode into a known entity type. A tag naming another type is a decode error.
    pub fn decode_as<T: Searchable>(&self, doc_type: &str, id: &str, source: Value) -> Result<T, SearchError> {
        self.decode(doc_type, id, source)?.downcast::<T>().map_err(|decoded| {
            SearchError::decode(
                decoded.type_name(),
                decoded.id(),
                format!("not a {}", std::any::type_name::<T>()),
            )
        })
    }
}

fn encode_with(
    schema: &EntitySchema,
    id: &str,
    serialized: Result<Value, serde_json::Error>,
) -> Option<Document> {
    let value = match serialized {
        Ok(value) => value,
        Err(e) => {
            error!(entity = %schema.simple_name(), id = %id, error = %e, "Failed to serialize entity");
            return None;
        }
    };
    let Value::Object(map) = value else {
        error!(entity = %schema.simple_name(), id = %id, "Entity did not serialize to an object");
        return None;
    };

    let doc = Document(retain_marked(schema, map));
    if doc.is_empty() {
        warn!(entity = %schema.simple_name(), id = %id, "Encoded document is empty");
    }
    Some(doc)
}

/// Keep marker-carrying properties, recursing into components, then strip.
fn retain_marked(schema: &EntitySchema, mut source: Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for property in schema.properties() {
        let Some(marker) = property.marker() else {
            continue;
        };
        let Some(value) = source.remove(&property.name) else {
            continue;
        };
        let value = match (marker, value) {
            (Marker::Component(component), Value::Object(nested)) => {
                Value::Object(retain_marked(&(component.schema)(), nested))
            }
            (Marker::Component(component), Value::Array(items)) => {
                let nested = (component.schema)();
                Value::Array(
                    items
                        .into_iter()
                        .map(|item| match item {
                            Value::Object(m) => Value::Object(retain_marked(&nested, m)),
                            other => other,
                        })
                        .collect(),
                )
            }
            (_, value) => value,
        };
        out.insert(property.name.clone(), value);
    }
    strip_empty(&mut out);
    out
}
