// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Searchable markers.
//!
//! A property joins the search mapping only when it carries one of three
//! markers: an identifier marker ([`SearchableId`]), a scalar property marker
//! ([`SearchableProperty`]) or a nested component marker
//! ([`SearchableComponent`]). Markers can sit on the accessor or on the
//! backing field; see [`Markers::merge`] for how the two levels combine.

use super::EntitySchema;

/// Indexing directive carried by a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexMode {
    /// No directive; the derived type stands.
    #[default]
    Na,
    /// Force full-text analysis (`text`).
    Analyzed,
    /// Force exact-match indexing (`keyword`).
    NotAnalyzed,
    /// Keep the value in the source but do not index it.
    No,
}

/// Explicit store directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Store {
    #[default]
    Na,
    Yes,
    No,
}

/// Options shared by identifier and property markers.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerOptions {
    pub index_name: Option<String>,
    pub format: Option<String>,
    pub index: IndexMode,
    pub boost: f32,
    pub store: Store,
    pub analyzer: Option<String>,
    pub search_analyzer: Option<String>,
    pub include_in_all: bool,
    pub null_value: Option<String>,
    pub term_vector: Option<String>,
    pub omit_norms: bool,
    pub omit_term_freq_and_positions: bool,
    pub ignore_malformed: bool,
}

impl Default for MarkerOptions {
    fn default() -> Self {
        Self {
            index_name: None,
            format: None,
            index: IndexMode::Na,
            boost: 1.0,
            store: Store::Na,
            analyzer: None,
            search_analyzer: None,
            include_in_all: true,
            null_value: None,
            term_vector: None,
            omit_norms: false,
            omit_term_freq_and_positions: false,
            ignore_malformed: false,
        }
    }
}

macro_rules! marker_setters {
    ($ty:ty) => {
        impl $ty {
            /// Store the field under a different name in the engine.
            pub fn index_name(mut self, name: impl Into<String>) -> Self {
                self.options.index_name = Some(name.into());
                self
            }

            /// Value format (dates, numbers).
            pub fn format(mut self, format: impl Into<String>) -> Self {
                self.options.format = Some(format.into());
                self
            }

            pub fn index(mut self, mode: IndexMode) -> Self {
                self.options.index = mode;
                self
            }

            pub fn analyzed(self) -> Self {
                self.index(IndexMode::Analyzed)
            }

            pub fn not_analyzed(self) -> Self {
                self.index(IndexMode::NotAnalyzed)
            }

            pub fn no_index(self) -> Self {
                self.index(IndexMode::No)
            }

            pub fn boost(mut self, boost: f32) -> Self {
                self.options.boost = boost;
                self
            }

            pub fn store(mut self, store: Store) -> Self {
                self.options.store = store;
                self
            }

            pub fn analyzer(mut self, analyzer: impl Into<String>) -> Self {
                self.options.analyzer = Some(analyzer.into());
                self
            }

            pub fn search_analyzer(mut self, analyzer: impl Into<String>) -> Self {
                self.options.search_analyzer = Some(analyzer.into());
                self
            }

            /// Exclude the field from the catch-all field.
            pub fn exclude_from_all(mut self) -> Self {
                self.options.include_in_all = false;
                self
            }

            /// Value indexed in place of an explicit null.
            pub fn null_value(mut self, value: impl Into<String>) -> Self {
                self.options.null_value = Some(value.into());
                self
            }

            pub fn term_vector(mut self, term_vector: impl Into<String>) -> Self {
                self.options.term_vector = Some(term_vector.into());
                self
            }

            pub fn omit_norms(mut self) -> Self {
                self.options.omit_norms = true;
                self
            }

            pub fn omit_term_freq_and_positions(mut self) -> Self {
                self.options.omit_term_freq_and_positions = true;
                self
            }

            /// Tolerate malformed values (dates or formatted fields only).
            pub fn ignore_malformed(mut self) -> Self {
                self.options.ignore_malformed = true;
                self
            }
        }
    };
}

/// Identifier marker. The mapped type is always `keyword`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchableId {
    pub options: MarkerOptions,
}

impl SearchableId {
    pub fn new() -> Self {
        Self::default()
    }
}

marker_setters!(SearchableId);

/// Scalar property marker.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchableProperty {
    /// Explicit engine type; derived from the property type when absent.
    pub type_name: Option<String>,
    pub options: MarkerOptions,
}

impl SearchableProperty {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force the engine type name (e.g. `"date"`, `"long"`).
    pub fn of_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }
}

marker_setters!(SearchableProperty);

/// Nested component marker. Points at the component type's schema.
#[derive(Clone, Copy)]
pub struct SearchableComponent {
    pub schema: fn() -> EntitySchema,
}

impl SearchableComponent {
    pub fn new(schema: fn() -> EntitySchema) -> Self {
        Self { schema }
    }
}

impl std::fmt::Debug for SearchableComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchableComponent")
            .field("schema", &(self.schema)().simple_name())
            .finish()
    }
}

/// Markers found at one level (accessor or field) of a property.
#[derive(Debug, Clone, Default)]
pub struct Markers {
    pub id: Option<SearchableId>,
    pub property: Option<SearchableProperty>,
    pub component: Option<SearchableComponent>,
}

/// The single marker a property resolves to after merging.
#[derive(Debug, Clone)]
pub enum Marker {
    Id(SearchableId),
    Property(SearchableProperty),
    Component(SearchableComponent),
}

impl Markers {
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.property.is_none() && self.component.is_none()
    }

    /// Merge accessor-level markers over field-level markers.
    ///
    /// Each marker kind is resolved independently: the accessor's marker of a
    /// kind wins, otherwise the field's marker of that kind is used. The
    /// merged set is then classified id, then property, then component.
    pub fn merge(accessor: &Markers, field: &Markers) -> Option<Marker> {
        let id = accessor.id.clone().or_else(|| field.id.clone());
        let property = accessor.property.clone().or_else(|| field.property.clone());
        let component = accessor.component.or(field.component);

        if let Some(id) = id {
            Some(Marker::Id(id))
        } else if let Some(property) = property {
            Some(Marker::Property(property))
        } else {
            component.map(Marker::Component)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> EntitySchema {
        EntitySchema::new("Address")
    }

    #[test]
    fn test_marker_defaults() {
        let opts = MarkerOptions::default();
        assert_eq!(opts.boost, 1.0);
        assert!(opts.include_in_all);
        assert_eq!(opts.index, IndexMode::Na);
        assert_eq!(opts.store, Store::Na);
    }

    #[test]
    fn test_builder_setters() {
        let p = SearchableProperty::new()
            .of_type("date")
            .format("yyyy-MM-dd")
            .boost(2.5)
            .store(Store::Yes)
            .exclude_from_all()
            .ignore_malformed();

        assert_eq!(p.type_name.as_deref(), Some("date"));
        assert_eq!(p.options.format.as_deref(), Some("yyyy-MM-dd"));
        assert_eq!(p.options.boost, 2.5);
        assert_eq!(p.options.store, Store::Yes);
        assert!(!p.options.include_in_all);
        assert!(p.options.ignore_malformed);
    }

    #[test]
    fn test_merge_accessor_overrides_field() {
        let accessor = Markers {
            property: Some(SearchableProperty::new().analyzer("standard")),
            ..Default::default()
        };
        let field = Markers {
            property: Some(SearchableProperty::new().analyzer("whitespace")),
            ..Default::default()
        };

        match Markers::merge(&accessor, &field) {
            Some(Marker::Property(p)) => assert_eq!(p.options.analyzer.as_deref(), Some("standard")),
            other => panic!("unexpected marker: {:?}", other),
        }
    }

    #[test]
    fn test_merge_falls_back_to_field() {
        let field = Markers {
            id: Some(SearchableId::new()),
            ..Default::default()
        };

        assert!(matches!(Markers::merge(&Markers::default(), &field), Some(Marker::Id(_))));
    }

    #[test]
    fn test_merge_id_beats_property_across_levels() {
        // Property on the accessor, id on the field: the id kind still wins
        let accessor = Markers {
            property: Some(SearchableProperty::new()),
            ..Default::default()
        };
        let field = Markers {
            id: Some(SearchableId::new()),
            ..Default::default()
        };

        assert!(matches!(Markers::merge(&accessor, &field), Some(Marker::Id(_))));
    }

    #[test]
    fn test_merge_component_and_empty() {
        let accessor = Markers {
            component: Some(SearchableComponent::new(address)),
            ..Default::default()
        };
        assert!(matches!(
            Markers::merge(&accessor, &Markers::default()),
            Some(Marker::Component(_))
        ));
        assert!(Markers::merge(&Markers::default(), &Markers::default()).is_none());
        assert!(Markers::default().is_empty());
    }
}
