// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Declarative entity schemas.
//!
//! Entities describe their searchable shape once, through a builder, instead
//! of being introspected at runtime. The description is evaluated at catalog
//! build time into a [`SchemaMapping`] that is pushed to the cluster.
//!
//! # Example
//!
//! ```rust
//! use entity_search::schema::{
//!     EntitySchema, PropertyDef, PropertyType, SearchableId, SearchableProperty,
//! };
//!
//! let schema = EntitySchema::new("Article")
//!     .property(PropertyDef::new("id", PropertyType::long()).id(SearchableId::new()))
//!     .property(PropertyDef::new("title", PropertyType::string()).searchable(SearchableProperty::new()))
//!     .property(
//!         PropertyDef::collection("tags", PropertyType::string())
//!             .searchable(SearchableProperty::new().not_analyzed()),
//!     );
//!
//! assert_eq!(schema.simple_name(), "Article");
//! assert_eq!(schema.properties().len(), 3);
//! ```
//!
//! # Marker precedence
//!
//! - **Accessor over field**: each marker kind set on the accessor replaces
//!   the same kind set on the field ([`PropertyDef::searchable`] vs
//!   [`PropertyDef::field_searchable`])
//! - **Kind order**: identifier, then scalar property, then component
//! - **Unmarked**: properties with no marker never reach the mapping

pub mod mapping;
mod markers;

use thiserror::Error;

pub use mapping::{FieldDescriptor, ScalarField, SchemaMapper, SchemaMapping, DEFAULT_TEXT_ANALYZER};
pub use markers::{
    IndexMode, Marker, MarkerOptions, Markers, SearchableComponent, SearchableId,
    SearchableProperty, Store,
};

/// Errors detected while deriving mappings or building the catalog.
///
/// These are configuration errors: they abort startup rather than leave a
/// half-built catalog behind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Duplicate field '{field}' in schema of '{entity}'")]
    DuplicateField { entity: String, field: String },
    #[error("Property '{property}' of '{entity}' has interface element type '{interface}' and cannot be mapped")]
    InterfaceElement {
        entity: String,
        property: String,
        interface: String,
    },
    #[error("Recursive component '{path}' in schema of '{entity}'")]
    RecursiveComponent { entity: String, path: String },
    #[error("Document type '{type_name}' is declared by both '{first}' and '{second}'")]
    DuplicateTypeName {
        type_name: String,
        first: String,
        second: String,
    },
    #[error("Entity type '{0}' is registered twice")]
    DuplicateEntity(String),
    #[error("Invalid document type name '{0}'")]
    InvalidTypeName(String),
}

/// Primitive value kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Char,
}

impl Primitive {
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Boolean => "boolean",
            Primitive::Byte => "byte",
            Primitive::Short => "short",
            Primitive::Int => "int",
            Primitive::Long => "long",
            Primitive::Float => "float",
            Primitive::Double => "double",
            Primitive::Char => "char",
        }
    }
}

/// Value type of a property (or of its elements, for arrays and collections).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyType {
    Primitive(Primitive),
    /// Enumeration, by simple name. Always maps to `keyword`.
    Enum(String),
    /// Concrete type, by simple name (`String`, `Date`, `BigDecimal`, ...).
    Class(String),
    /// Abstract type. Cannot be mapped unambiguously.
    Interface(String),
}

impl PropertyType {
    pub fn string() -> Self {
        Self::Class("String".into())
    }

    pub fn long() -> Self {
        Self::Primitive(Primitive::Long)
    }

    pub fn int() -> Self {
        Self::Primitive(Primitive::Int)
    }

    pub fn double() -> Self {
        Self::Primitive(Primitive::Double)
    }

    pub fn boolean() -> Self {
        Self::Primitive(Primitive::Boolean)
    }

    pub fn date() -> Self {
        Self::Class("Date".into())
    }

    pub fn decimal() -> Self {
        Self::Class("BigDecimal".into())
    }

    pub fn enumeration(name: impl Into<String>) -> Self {
        Self::Enum(name.into())
    }

    pub fn class(name: impl Into<String>) -> Self {
        Self::Class(name.into())
    }

    pub fn interface(name: impl Into<String>) -> Self {
        Self::Interface(name.into())
    }

    pub fn is_interface(&self) -> bool {
        matches!(self, Self::Interface(_))
    }

    /// Type name as derived from the value type, before translation.
    pub fn derived_name(&self) -> String {
        match self {
            Self::Primitive(p) => p.name().to_string(),
            Self::Enum(_) => "keyword".to_string(),
            Self::Class(name) | Self::Interface(name) => name.to_lowercase(),
        }
    }

    pub fn simple_name(&self) -> &str {
        match self {
            Self::Primitive(p) => p.name(),
            Self::Enum(name) | Self::Class(name) | Self::Interface(name) => name,
        }
    }
}

/// Cardinality of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Shape {
    #[default]
    Single,
    Array,
    Collection,
}

/// One readable property of an entity.
#[derive(Debug, Clone)]
pub struct PropertyDef {
    pub name: String,
    /// Value type, or element type for arrays and collections
    pub value_type: PropertyType,
    pub shape: Shape,
    /// Markers on the accessor (take precedence)
    pub accessor: Markers,
    /// Markers on the backing field
    pub field: Markers,
}

impl PropertyDef {
    /// Single-valued property
    pub fn new(name: impl Into<String>, value_type: PropertyType) -> Self {
        Self {
            name: name.into(),
            value_type,
            shape: Shape::Single,
            accessor: Markers::default(),
            field: Markers::default(),
        }
    }

    /// Array property with the given element type
    pub fn array(name: impl Into<String>, element: PropertyType) -> Self {
        Self {
            shape: Shape::Array,
            ..Self::new(name, element)
        }
    }

    /// Collection property with the given element type
    pub fn collection(name: impl Into<String>, element: PropertyType) -> Self {
        Self {
            shape: Shape::Collection,
            ..Self::new(name, element)
        }
    }

    pub fn id(mut self, marker: SearchableId) -> Self {
        self.accessor.id = Some(marker);
        self
    }

    pub fn searchable(mut self, marker: SearchableProperty) -> Self {
        self.accessor.property = Some(marker);
        self
    }

    pub fn component(mut self, schema: fn() -> EntitySchema) -> Self {
        self.accessor.component = Some(SearchableComponent::new(schema));
        self
    }

    pub fn field_id(mut self, marker: SearchableId) -> Self {
        self.field.id = Some(marker);
        self
    }

    pub fn field_searchable(mut self, marker: SearchableProperty) -> Self {
        self.field.property = Some(marker);
        self
    }

    pub fn field_component(mut self, schema: fn() -> EntitySchema) -> Self {
        self.field.component = Some(SearchableComponent::new(schema));
        self
    }

    /// The merged marker this property resolves to, if any.
    pub fn marker(&self) -> Option<Marker> {
        Markers::merge(&self.accessor, &self.field)
    }

    pub fn is_multi_valued(&self) -> bool {
        self.shape != Shape::Single
    }
}

/// Searchable description of an entity type.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    simple_name: String,
    type_override: Option<String>,
    root: bool,
    properties: Vec<PropertyDef>,
}

impl EntitySchema {
    pub fn new(simple_name: impl Into<String>) -> Self {
        Self {
            simple_name: simple_name.into(),
            type_override: None,
            root: true,
            properties: Vec::new(),
        }
    }

    /// Override the document type name (defaults to the simple name).
    pub fn type_name(mut self, name: impl Into<String>) -> Self {
        self.type_override = Some(name.into());
        self
    }

    /// Mark as embedded-only: usable as a component, never registered on its own.
    pub fn embedded_only(mut self) -> Self {
        self.root = false;
        self
    }

    pub fn property(mut self, property: PropertyDef) -> Self {
        self.properties.push(property);
        self
    }

    /// Identifier property
    pub fn id(self, name: impl Into<String>, value_type: PropertyType) -> Self {
        self.property(PropertyDef::new(name, value_type).id(SearchableId::new()))
    }

    /// Analyzed string property
    pub fn text(self, name: impl Into<String>) -> Self {
        self.property(PropertyDef::new(name, PropertyType::string()).searchable(SearchableProperty::new()))
    }

    /// Collection of exact-match strings
    pub fn keywords(self, name: impl Into<String>) -> Self {
        self.property(
            PropertyDef::collection(name, PropertyType::string())
                .searchable(SearchableProperty::new().not_analyzed()),
        )
    }

    /// Nested component property
    pub fn embedded(self, name: impl Into<String>, schema: fn() -> EntitySchema) -> Self {
        self.property(PropertyDef::new(name, PropertyType::class("Object")).component(schema))
    }

    pub fn simple_name(&self) -> &str {
        &self.simple_name
    }

    pub fn type_override(&self) -> Option<&str> {
        self.type_override.as_deref()
    }

    pub fn is_root(&self) -> bool {
        self.root
    }

    pub fn properties(&self) -> &[PropertyDef] {
        &self.properties
    }

    /// Default document type name: the simple name with its first letter lower-cased.
    pub fn document_type_name(&self) -> String {
        if let Some(name) = self.type_override.as_deref().filter(|s| !s.trim().is_empty()) {
            return name.to_string();
        }
        let mut chars = self.simple_name.chars();
        match chars.next() {
            Some(first) => first.to_lowercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    /// Synthetic or generic names that must never be registered.
    pub fn is_synthetic(&self) -> bool {
        self.simple_name.is_empty()
            || self.simple_name.contains('$')
            || self.simple_name.contains('<')
            || self.simple_name.contains("::")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn author() -> EntitySchema {
        EntitySchema::new("Author").embedded_only().text("name")
    }

    #[test]
    fn test_document_type_name_defaults_to_uncapitalized() {
        assert_eq!(EntitySchema::new("Article").document_type_name(), "article");
        assert_eq!(EntitySchema::new("BlogPost").document_type_name(), "blogPost");
    }

    #[test]
    fn test_document_type_name_override() {
        let schema = EntitySchema::new("Article").type_name("news");
        assert_eq!(schema.document_type_name(), "news");
        assert_eq!(schema.type_override(), Some("news"));

        // Blank override is ignored
        let schema = EntitySchema::new("Article").type_name("  ");
        assert_eq!(schema.document_type_name(), "article");
    }

    #[test]
    fn test_synthetic_names() {
        assert!(EntitySchema::new("Outer$Inner").is_synthetic());
        assert!(EntitySchema::new("Wrapper<T>").is_synthetic());
        assert!(EntitySchema::new("").is_synthetic());
        assert!(!EntitySchema::new("Article").is_synthetic());
    }

    #[test]
    fn test_shortcuts_build_markers() {
        let schema = EntitySchema::new("Article")
            .id("id", PropertyType::long())
            .text("title")
            .keywords("tags")
            .embedded("author", author);

        let props = schema.properties();
        assert!(matches!(props[0].marker(), Some(Marker::Id(_))));
        assert!(matches!(props[1].marker(), Some(Marker::Property(_))));
        assert_eq!(props[2].shape, Shape::Collection);
        assert!(props[2].is_multi_valued());
        assert!(matches!(props[3].marker(), Some(Marker::Component(_))));
        assert_eq!(props[3].value_type, PropertyType::class("Object"));
    }

    #[test]
    fn test_derived_names() {
        assert_eq!(PropertyType::int().derived_name(), "int");
        assert_eq!(PropertyType::enumeration("Status").derived_name(), "keyword");
        assert_eq!(PropertyType::decimal().derived_name(), "bigdecimal");
        assert_eq!(PropertyType::string().derived_name(), "string");
        assert!(PropertyType::interface("Named").is_interface());
    }

    #[test]
    fn test_embedded_only() {
        assert!(!author().is_root());
        assert!(EntitySchema::new("Article").is_root());
    }
}
