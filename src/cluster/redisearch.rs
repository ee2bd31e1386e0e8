// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! RediSearch schema and query translation.
//!
//! Documents are stored as RedisJSON with the entity under `$.payload`, so a
//! mapping becomes:
//!
//! ```text
//! FT.CREATE es:idx:index_article
//!   ON JSON
//!   PREFIX 1 es:doc:index_article:
//!   SCHEMA
//!     $.payload.id AS id TAG SORTABLE
//!     $.payload.tags[*] AS tags TAG
//!     $.payload.title AS title TEXT SORTABLE
//! ```
//!
//! Query translation needs the field kinds because TAG and NUMERIC fields use
//! their own syntax (`@tags:{rust}`, `@rank:[1 1]`):
//!
//! ```text
//! hello world           → hello world
//! title:hel*            → @title:(w'hel*')
//! tags:rust             → @tags:{rust}
//! @name:Alice | ...     ← Field / Or nodes as usual
//! ```

use std::collections::HashMap;

use crate::schema::{SchemaMapping, ScalarField};
use crate::search::{FieldOperator, FieldQuery, Operator, Query, QueryNode, QueryValue};

/// Search field types used for mapped fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchFieldType {
    /// Full-text searchable field
    Text,
    /// Numeric field (supports range queries)
    Numeric,
    /// Tag field (exact match, supports OR)
    Tag,
}

impl SearchFieldType {
    fn for_field(field: &ScalarField) -> Self {
        match field.field_type.as_str() {
            "text" => SearchFieldType::Text,
            "integer" | "long" | "short" | "byte" | "double" | "float" => SearchFieldType::Numeric,
            _ => SearchFieldType::Tag,
        }
    }
}

impl std::fmt::Display for SearchFieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchFieldType::Text => write!(f, "TEXT"),
            SearchFieldType::Numeric => write!(f, "NUMERIC"),
            SearchFieldType::Tag => write!(f, "TAG"),
        }
    }
}

/// Search field definition
#[derive(Debug, Clone, PartialEq)]
pub struct SearchField {
    /// Attribute name used in queries
    pub name: String,
    pub json_path: String,
    pub field_type: SearchFieldType,
    pub sortable: bool,
    /// TEXT weight from the mapping boost
    pub weight: Option<f32>,
}

impl SearchField {
    fn to_schema_args(&self) -> Vec<String> {
        let mut args = vec![
            self.json_path.clone(),
            "AS".to_string(),
            self.name.clone(),
            self.field_type.to_string(),
        ];
        if let (SearchFieldType::Text, Some(weight)) = (self.field_type, self.weight) {
            args.push("WEIGHT".to_string());
            args.push(weight.to_string());
        }
        if self.sortable {
            args.push("SORTABLE".to_string());
        }
        args
    }
}

/// Attribute name of a dotted mapping path
pub fn field_alias(path: &str) -> String {
    path.replace('.', "_")
}

/// RediSearch index definition derived from a schema mapping
#[derive(Debug, Clone, PartialEq)]
pub struct SearchIndex {
    pub name: String,
    /// Key prefix of this index's documents
    pub prefix: String,
    pub fields: Vec<SearchField>,
}

impl SearchIndex {
    pub fn from_mapping(name: impl Into<String>, prefix: impl Into<String>, mapping: &SchemaMapping) -> Self {
        let fields = mapping
            .flatten()
            .into_iter()
            .filter(|(_, field)| field.is_indexed())
            .map(|(path, field)| {
                let field_type = SearchFieldType::for_field(field);
                let json_path = if field.multi_valued && field_type != SearchFieldType::Text {
                    format!("$.payload.{}[*]", path)
                } else {
                    format!("$.payload.{}", path)
                };
                SearchField {
                    name: field_alias(&path),
                    json_path,
                    field_type,
                    // Arrays cannot be SORTABLE
                    sortable: !field.multi_valued,
                    weight: field.boost,
                }
            })
            .collect();

        Self {
            name: name.into(),
            prefix: prefix.into(),
            fields,
        }
    }

    /// Arguments of FT.CREATE (without the command name)
    pub fn to_ft_create_args(&self) -> Vec<String> {
        let mut args = vec![
            self.name.clone(),
            "ON".to_string(),
            "JSON".to_string(),
            "PREFIX".to_string(),
            "1".to_string(),
            self.prefix.clone(),
            "SCHEMA".to_string(),
        ];
        for field in &self.fields {
            args.extend(field.to_schema_args());
        }
        args
    }

    pub fn translator(&self) -> RediSearchTranslator {
        RediSearchTranslator {
            kinds: self
                .fields
                .iter()
                .map(|f| (f.name.clone(), f.field_type))
                .collect(),
        }
    }
}

/// Translates the query AST into FT.SEARCH syntax.
#[derive(Debug, Clone, Default)]
pub struct RediSearchTranslator {
    /// Attribute name → kind. Unknown attributes are treated as TEXT.
    kinds: HashMap<String, SearchFieldType>,
}

impl RediSearchTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn translate(&self, query: &Query) -> String {
        self.translate_node(&query.root)
    }

    fn kind(&self, attribute: &str) -> SearchFieldType {
        self.kinds.get(attribute).copied().unwrap_or(SearchFieldType::Text)
    }

    fn translate_node(&self, node: &QueryNode) -> String {
        match node {
            QueryNode::MatchAll => "*".to_string(),
            QueryNode::QueryString { query, default_operator } => self.translate_query_string(query, *default_operator),
            QueryNode::Wildcard { field, pattern } => self.wildcard(field, pattern),
            QueryNode::Field(field_query) => self.translate_field(field_query),
            QueryNode::And(nodes) => Self::group(nodes.iter().map(|n| self.translate_node(n)).collect(), " "),
            QueryNode::Or(nodes) => Self::group(nodes.iter().map(|n| self.translate_node(n)).collect(), " | "),
            QueryNode::Not(inner) => format!("-({})", self.translate_node(inner)),
        }
    }

    fn group(parts: Vec<String>, separator: &str) -> String {
        if parts.len() == 1 {
            parts.into_iter().collect()
        } else {
            format!("({})", parts.join(separator))
        }
    }

    fn translate_query_string(&self, query: &str, operator: Operator) -> String {
        let parts: Vec<String> = query
            .split_whitespace()
            .filter(|t| !matches!(*t, "AND" | "OR" | "&&" | "||" | "*"))
            .map(|term| match term.split_once(':') {
                Some((field, value)) if Self::is_field_name(field) && !value.is_empty() => {
                    self.field_term(field, value)
                }
                _ if term.contains(['*', '?']) => format!("w'{}'", Self::quote(term)),
                _ => Self::escape_value(term),
            })
            .collect();

        if parts.is_empty() {
            return "*".to_string();
        }
        match operator {
            Operator::And => parts.join(" "),
            Operator::Or => parts.join(" | "),
        }
    }

    fn is_field_name(field: &str) -> bool {
        !field.is_empty() && field.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.')
    }

    fn field_term(&self, field: &str, value: &str) -> String {
        if value.contains(['*', '?']) {
            return self.wildcard(field, value);
        }
        let alias = field_alias(field);
        match self.kind(&alias) {
            SearchFieldType::Tag => format!("@{}:{{{}}}", alias, Self::escape_value(value)),
            SearchFieldType::Numeric => match value.parse::<f64>() {
                Ok(n) => format!("@{}:[{} {}]", alias, n, n),
                Err(_) => format!("@{}:{}", alias, Self::escape_value(value)),
            },
            SearchFieldType::Text => format!("@{}:{}", alias, Self::escape_value(value)),
        }
    }

    fn wildcard(&self, field: &str, pattern: &str) -> String {
        let alias = field_alias(field);
        match self.kind(&alias) {
            SearchFieldType::Tag => format!("@{}:{{w'{}'}}", alias, Self::quote(pattern)),
            _ => format!("@{}:(w'{}')", alias, Self::quote(pattern)),
        }
    }

    fn translate_field(&self, field: &FieldQuery) -> String {
        let alias = field_alias(&field.field);
        let kind = self.kind(&alias);

        match (&field.operator, &field.value) {
            (FieldOperator::Equals, QueryValue::Text(text)) if kind == SearchFieldType::Tag => {
                format!("@{}:{{{}}}", alias, Self::escape_value(text))
            }
            (FieldOperator::Equals, QueryValue::Text(text)) => {
                // Multi-word text requires all terms
                let escaped = Self::escape_special_chars(text);
                if text.contains(' ') {
                    format!("@{}:({})", alias, escaped)
                } else {
                    format!("@{}:{}", alias, escaped)
                }
            }
            (FieldOperator::Equals, QueryValue::Numeric(num)) => format!("@{}:[{} {}]", alias, num, num),
            (FieldOperator::Equals, QueryValue::Boolean(b)) => format!("@{}:{{{}}}", alias, b),
            (FieldOperator::Contains, QueryValue::Text(text)) => {
                format!("@{}:*{}*", alias, Self::escape_special_chars(text))
            }
            (FieldOperator::Range, QueryValue::NumericRange { min, max }) => {
                let min_str = min.map(|v| v.to_string()).unwrap_or_else(|| "-inf".to_string());
                let max_str = max.map(|v| v.to_string()).unwrap_or_else(|| "+inf".to_string());
                format!("@{}:[{} {}]", alias, min_str, max_str)
            }
            (FieldOperator::In, QueryValue::Tags(tags)) => {
                let tag_str = tags.iter().map(|t| Self::escape_value(t)).collect::<Vec<_>>().join("|");
                format!("@{}:{{{}}}", alias, tag_str)
            }
            (FieldOperator::Prefix, QueryValue::Text(text)) => format!("@{}:{}*", alias, Self::escape_value(text)),
            (FieldOperator::Fuzzy, QueryValue::Text(text)) => format!("@{}:%{}%", alias, Self::escape_value(text)),
            // Unsupported combinations match nothing rather than everything
            _ => format!("-(*) @{}:__unsupported__", alias),
        }
    }

    fn quote(pattern: &str) -> String {
        pattern.replace('\'', "\\'")
    }

    /// Escape special chars but keep spaces (phrases).
    fn escape_special_chars(value: &str) -> String {
        let mut escaped = String::new();
        for c in value.chars() {
            match c {
                '@' | ':' | '|' | '(' | ')' | '[' | ']' | '{' | '}' | '*' | '%' | '-' | '+' | '.' | ',' | '<'
                | '>' | '"' | '\'' | '~' | '&' | '$' | '^' | '!' | '/' | ';' | '=' => {
                    escaped.push('\\');
                    escaped.push(c);
                }
                _ => escaped.push(c),
            }
        }
        escaped
    }

    /// Escape special chars including spaces (single term).
    fn escape_value(value: &str) -> String {
        let mut escaped = Self::escape_special_chars(value);
        if escaped.contains(' ') {
            escaped = escaped.replace(' ', "\\ ");
        }
        escaped
    }
}
