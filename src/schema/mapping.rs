// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Mapping derivation.
//!
//! Turns an [`EntitySchema`] into the engine-native [`SchemaMapping`]:
//!
//! ```text
//! Article { id @id, title @property, tags @property(not_analyzed)[] }
//!     ↓
//! {
//!   "article": {
//!     "properties": {
//!       "id":    { "type": "keyword" },
//!       "tags":  { "type": "keyword" },
//!       "title": { "type": "text", "analyzer": "mmseg_maxword" }
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tracing::debug;

use super::{EntitySchema, IndexMode, Marker, MarkerOptions, PropertyType, SchemaError, SearchableId, SearchableProperty, Store};

/// Word-segmentation analyzer applied to text fields without an explicit analyzer.
pub const DEFAULT_TEXT_ANALYZER: &str = "mmseg_maxword";

/// Engine type of identifiers and not-analyzed values.
pub const KEYWORD: &str = "keyword";
/// Engine type of analyzed values.
pub const TEXT: &str = "text";
const DATE: &str = "date";

/// Field name → descriptor, for one nesting level.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchemaMapping {
    /// Nested component (rendered with `"type": "object"`)
    pub embedded: bool,
    pub properties: BTreeMap<String, FieldDescriptor>,
}

/// Descriptor of one mapped field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldDescriptor {
    Scalar(ScalarField),
    Object(SchemaMapping),
}

/// Scalar field options. `None` values are left to engine defaults.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalarField {
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boost: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyzer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_analyzer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_in_all: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub null_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term_vector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub omit_norms: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub omit_term_freq_and_positions: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_malformed: Option<bool>,
    /// Array or collection values. Not part of the engine mapping.
    #[serde(skip)]
    pub multi_valued: bool,
}

impl ScalarField {
    fn of_type(field_type: impl Into<String>) -> Self {
        Self {
            field_type: field_type.into(),
            index_name: None,
            format: None,
            boost: None,
            index: None,
            store: None,
            analyzer: None,
            search_analyzer: None,
            include_in_all: None,
            null_value: None,
            term_vector: None,
            omit_norms: None,
            omit_term_freq_and_positions: None,
            ignore_malformed: None,
            multi_valued: false,
        }
    }

    pub fn is_text(&self) -> bool {
        self.field_type == TEXT
    }

    pub fn is_indexed(&self) -> bool {
        self.index != Some(false)
    }
}

impl Serialize for SchemaMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if self.embedded {
            map.serialize_entry("type", "object")?;
        }
        map.serialize_entry("properties", &self.properties)?;
        map.end()
    }
}

impl SchemaMapping {
    /// Number of top-level fields
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.properties.get(name)
    }

    /// Scalar field at a dotted path (`"author.name"`).
    pub fn scalar(&self, path: &str) -> Option<&ScalarField> {
        let mut level = self;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            match (level.properties.get(segment)?, segments.peek()) {
                (FieldDescriptor::Scalar(field), None) => return Some(field),
                (FieldDescriptor::Object(nested), Some(_)) => level = nested,
                _ => return None,
            }
        }
        None
    }

    /// All scalar fields with their dotted paths, depth first.
    pub fn flatten(&self) -> Vec<(String, &ScalarField)> {
        let mut out = Vec::new();
        self.flatten_into("", &mut out);
        out
    }

    fn flatten_into<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a ScalarField)>) {
        for (name, descriptor) in &self.properties {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}.{}", prefix, name)
            };
            match descriptor {
                FieldDescriptor::Scalar(field) => out.push((path, field)),
                FieldDescriptor::Object(nested) => nested.flatten_into(&path, out),
            }
        }
    }

    /// Total descriptors across all levels (scalars and objects).
    pub fn descriptor_count(&self) -> usize {
        self.properties
            .values()
            .map(|d| match d {
                FieldDescriptor::Scalar(_) => 1,
                FieldDescriptor::Object(nested) => 1 + nested.descriptor_count(),
            })
            .sum()
    }

    /// Render the put-mapping body: `{ "<type>": { "properties": ... } }`.
    pub fn to_mapping_json(&self, type_name: &str) -> serde_json::Value {
        let mut body = serde_json::Map::new();
        body.insert(
            type_name.to_string(),
            serde_json::to_value(self).unwrap_or(serde_json::Value::Null),
        );
        serde_json::Value::Object(body)
    }
}

/// Derives mappings from entity schemas.
#[derive(Debug, Clone)]
pub struct SchemaMapper {
    default_analyzer: String,
}

impl Default for SchemaMapper {
    fn default() -> Self {
        Self::new(DEFAULT_TEXT_ANALYZER)
    }
}

impl SchemaMapper {
    pub fn new(default_analyzer: impl Into<String>) -> Self {
        Self {
            default_analyzer: default_analyzer.into(),
        }
    }

    pub fn default_analyzer(&self) -> &str {
        &self.default_analyzer
    }

    /// Derive the mapping of a root entity.
    pub fn derive(&self, schema: &EntitySchema) -> Result<SchemaMapping, SchemaError> {
        let mut path = vec![schema.simple_name().to_string()];
        self.derive_level(schema, false, &mut path)
    }

    fn derive_level(
        &self,
        schema: &EntitySchema,
        embedded: bool,
        path: &mut Vec<String>,
    ) -> Result<SchemaMapping, SchemaError> {
        let mut mapping = SchemaMapping {
            embedded,
            properties: BTreeMap::new(),
        };

        for property in schema.properties() {
            let Some(marker) = property.marker() else {
                continue;
            };

            // Components name their schema, so only scalar markers are ambiguous
            if property.value_type.is_interface() && !matches!(marker, Marker::Component(_)) {
                return Err(SchemaError::InterfaceElement {
                    entity: schema.simple_name().to_string(),
                    property: property.name.clone(),
                    interface: property.value_type.simple_name().to_string(),
                });
            }

            let descriptor = match marker {
                Marker::Id(_) if embedded => {
                    debug!(
                        entity = %schema.simple_name(),
                        property = %property.name,
                        "Ignoring identifier marker inside component"
                    );
                    continue;
                }
                Marker::Id(id) => {
                    let mut field = Self::id_field(&id);
                    field.multi_valued = property.is_multi_valued();
                    FieldDescriptor::Scalar(field)
                }
                Marker::Property(prop) => {
                    let mut field = self.property_field(&property.value_type, &prop);
                    field.multi_valued = property.is_multi_valued();
                    FieldDescriptor::Scalar(field)
                }
                Marker::Component(component) => {
                    let nested = (component.schema)();
                    if path.iter().any(|p| p == nested.simple_name()) {
                        return Err(SchemaError::RecursiveComponent {
                            entity: path[0].clone(),
                            path: format!("{}.{}", path.join("."), nested.simple_name()),
                        });
                    }
                    path.push(nested.simple_name().to_string());
                    let derived = self.derive_level(&nested, true, path);
                    path.pop();
                    FieldDescriptor::Object(derived?)
                }
            };

            if mapping.properties.insert(property.name.clone(), descriptor).is_some() {
                return Err(SchemaError::DuplicateField {
                    entity: schema.simple_name().to_string(),
                    field: property.name.clone(),
                });
            }
        }

        Ok(mapping)
    }

    fn id_field(marker: &SearchableId) -> ScalarField {
        let opts = &marker.options;
        let mut field = ScalarField::of_type(KEYWORD);
        field.index_name = non_blank(&opts.index_name);
        field.format = non_blank(&opts.format);
        if opts.index == IndexMode::No {
            field.index = Some(false);
        }
        field.boost = boost_for(&field.field_type, opts);
        field.store = store_for(opts.store);
        field.analyzer = non_blank(&opts.analyzer);
        field.search_analyzer = non_blank(&opts.search_analyzer);
        Self::apply_common(&mut field, opts);
        field
    }

    fn property_field(&self, value_type: &PropertyType, marker: &SearchableProperty) -> ScalarField {
        let opts = &marker.options;
        let base = non_blank(&marker.type_name).unwrap_or_else(|| value_type.derived_name());
        let mut field = ScalarField::of_type(translate_type(&base));
        field.index_name = non_blank(&opts.index_name);
        field.format = non_blank(&opts.format);
        match opts.index {
            IndexMode::No => field.index = Some(false),
            IndexMode::Analyzed => field.field_type = TEXT.to_string(),
            IndexMode::NotAnalyzed => field.field_type = KEYWORD.to_string(),
            IndexMode::Na => {}
        }
        field.boost = boost_for(&field.field_type, opts);
        field.store = store_for(opts.store);
        if field.is_text() {
            field.analyzer = non_blank(&opts.analyzer).or_else(|| Some(self.default_analyzer.clone()));
            field.search_analyzer = non_blank(&opts.search_analyzer);
        }
        Self::apply_common(&mut field, opts);
        field
    }

    fn apply_common(field: &mut ScalarField, opts: &MarkerOptions) {
        if !opts.include_in_all {
            field.include_in_all = Some(false);
        }
        field.null_value = non_blank(&opts.null_value);
        field.term_vector = non_blank(&opts.term_vector);
        if opts.omit_norms {
            field.omit_norms = Some(true);
        }
        if opts.omit_term_freq_and_positions {
            field.omit_term_freq_and_positions = Some(true);
        }
        if field.field_type == DATE || field.format.is_some() {
            field.ignore_malformed = Some(opts.ignore_malformed);
        }
    }
}

/// Translate derived type names to engine type names.
pub fn translate_type(input: &str) -> String {
    match input {
        "int" => "integer".to_string(),
        "bigdecimal" => "double".to_string(),
        "string" => TEXT.to_string(),
        other => other.to_string(),
    }
}

fn boost_for(field_type: &str, opts: &MarkerOptions) -> Option<f32> {
    let boostable = field_type == TEXT || field_type == KEYWORD;
    let indexed = opts.index != IndexMode::NotAnalyzed && opts.index != IndexMode::No;
    if boostable && indexed && !opts.omit_norms && opts.boost != 1.0 {
        Some(opts.boost)
    } else {
        None
    }
}

fn store_for(store: Store) -> Option<bool> {
    match store {
        Store::Na => None,
        Store::Yes => Some(true),
        Store::No => Some(false),
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|s| !s.trim().is_empty()).cloned()
}
