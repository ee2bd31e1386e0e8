// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Query Builder - AST for engine queries
//!
//! Explicit queries placed on [`SearchCriteria`](super::SearchCriteria) and
//! the queries the translator derives from free text share one AST. Cluster
//! adapters evaluate or translate it; [`Query::to_json`] renders the
//! Elasticsearch-style DSL used in logs and request bodies.
//!
//! # Example
//!
//! ```rust
//! use entity_search::search::{Query, QueryBuilder};
//!
//! // Free text with implicit AND
//! let query = Query::query_string("hello world");
//!
//! // Literal wildcard on one field
//! let query = Query::wildcard("title", "hel*");
//!
//! // Structured
//! let query = QueryBuilder::new()
//!     .field_eq("title", "hello")
//!     .tags("tags", vec!["rust".into()])
//!     .build_and();
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Search query AST
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub root: QueryNode,
}

/// Default combination of free-text terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Operator {
    #[default]
    And,
    Or,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::And => "AND",
            Operator::Or => "OR",
        }
    }
}

impl Query {
    pub fn new(root: QueryNode) -> Self {
        Self { root }
    }

    pub fn match_all() -> Self {
        Self::new(QueryNode::MatchAll)
    }

    /// Query-string expression; terms combine with AND.
    pub fn query_string(query: impl Into<String>) -> Self {
        Self::query_string_with(query, Operator::And)
    }

    pub fn query_string_with(query: impl Into<String>, default_operator: Operator) -> Self {
        Self::new(QueryNode::QueryString {
            query: query.into(),
            default_operator,
        })
    }

    /// Wildcard pattern on one field (`?` one char, `*` any run).
    pub fn wildcard(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(QueryNode::Wildcard {
            field: field.into(),
            pattern: pattern.into(),
        })
    }

    /// Field match
    pub fn field_eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::field(field, FieldOperator::Equals, QueryValue::Text(value.into()))
    }

    pub fn numeric_eq(field: impl Into<String>, value: f64) -> Self {
        Self::field(field, FieldOperator::Equals, QueryValue::Numeric(value))
    }

    pub fn bool_eq(field: impl Into<String>, value: bool) -> Self {
        Self::field(field, FieldOperator::Equals, QueryValue::Boolean(value))
    }

    /// Any of the given exact values
    pub fn tags(field: impl Into<String>, values: Vec<String>) -> Self {
        Self::field(field, FieldOperator::In, QueryValue::Tags(values))
    }

    pub fn numeric_range(field: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        Self::field(field, FieldOperator::Range, QueryValue::NumericRange { min, max })
    }

    /// Substring match
    pub fn text_search(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self::field(field, FieldOperator::Contains, QueryValue::Text(text.into()))
    }

    pub fn prefix(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::field(field, FieldOperator::Prefix, QueryValue::Text(prefix.into()))
    }

    /// Edit distance 1
    pub fn fuzzy(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self::field(field, FieldOperator::Fuzzy, QueryValue::Text(text.into()))
    }

    fn field(field: impl Into<String>, operator: FieldOperator, value: QueryValue) -> Self {
        Self::new(QueryNode::Field(FieldQuery {
            field: field.into(),
            operator,
            value,
        }))
    }

    pub fn and(self, other: Query) -> Self {
        Self::new(QueryNode::And(vec![self.root, other.root]))
    }

    pub fn or(self, other: Query) -> Self {
        Self::new(QueryNode::Or(vec![self.root, other.root]))
    }

    pub fn negate(self) -> Self {
        Self::new(QueryNode::Not(Box::new(self.root)))
    }

    /// Elasticsearch-style query DSL.
    pub fn to_json(&self) -> Value {
        self.root.to_json()
    }
}

/// Query AST node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryNode {
    MatchAll,
    QueryString {
        query: String,
        default_operator: Operator,
    },
    Wildcard {
        field: String,
        pattern: String,
    },
    Field(FieldQuery),
    And(Vec<QueryNode>),
    Or(Vec<QueryNode>),
    Not(Box<QueryNode>),
}

impl QueryNode {
    fn to_json(&self) -> Value {
        match self {
            QueryNode::MatchAll => json!({ "match_all": {} }),
            QueryNode::QueryString { query, default_operator } => json!({
                "query_string": { "query": query, "default_operator": default_operator.as_str() }
            }),
            QueryNode::Wildcard { field, pattern } => json!({ "wildcard": { field.as_str(): pattern } }),
            QueryNode::Field(field) => field.to_json(),
            QueryNode::And(nodes) => json!({
                "bool": { "must": nodes.iter().map(QueryNode::to_json).collect::<Vec<_>>() }
            }),
            QueryNode::Or(nodes) => json!({
                "bool": {
                    "should": nodes.iter().map(QueryNode::to_json).collect::<Vec<_>>(),
                    "minimum_should_match": 1
                }
            }),
            QueryNode::Not(inner) => json!({ "bool": { "must_not": [inner.to_json()] } }),
        }
    }
}

/// Field query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldQuery {
    /// Field name or dotted path (`author.name`)
    pub field: String,
    pub operator: FieldOperator,
    pub value: QueryValue,
}

impl FieldQuery {
    fn to_json(&self) -> Value {
        let field = self.field.as_str();
        match (&self.operator, &self.value) {
            (FieldOperator::Equals, QueryValue::Text(text)) => {
                json!({ "match": { field: { "query": text, "operator": "AND" } } })
            }
            (FieldOperator::Equals, QueryValue::Numeric(n)) => json!({ "term": { field: n } }),
            (FieldOperator::Equals, QueryValue::Boolean(b)) => json!({ "term": { field: b } }),
            (FieldOperator::Contains, QueryValue::Text(text)) => {
                json!({ "wildcard": { field: format!("*{}*", text) } })
            }
            (FieldOperator::Range, QueryValue::NumericRange { min, max }) => {
                let mut bounds = serde_json::Map::new();
                if let Some(min) = min {
                    bounds.insert("gte".into(), json!(min));
                }
                if let Some(max) = max {
                    bounds.insert("lte".into(), json!(max));
                }
                json!({ "range": { field: bounds } })
            }
            (FieldOperator::In, QueryValue::Tags(tags)) => json!({ "terms": { field: tags } }),
            (FieldOperator::Prefix, QueryValue::Text(text)) => json!({ "prefix": { field: text } }),
            (FieldOperator::Fuzzy, QueryValue::Text(text)) => {
                json!({ "fuzzy": { field: { "value": text, "fuzziness": 1 } } })
            }
            (operator, value) => json!({ "unsupported": { field: format!("{:?} {:?}", operator, value) } }),
        }
    }
}

/// Field comparison operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldOperator {
    /// Term match (all words for text)
    Equals,
    /// Substring
    Contains,
    /// Numeric range
    Range,
    /// Any of the given values
    In,
    Prefix,
    Fuzzy,
}

/// Query value type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryValue {
    Text(String),
    Numeric(f64),
    NumericRange { min: Option<f64>, max: Option<f64> },
    /// Exact values (OR semantics)
    Tags(Vec<String>),
    Boolean(bool),
}

/// Builder for complex queries
#[derive(Default)]
pub struct QueryBuilder {
    nodes: Vec<QueryNode>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn field_eq(self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(Query::field_eq(field, value))
    }

    pub fn numeric_eq(self, field: impl Into<String>, value: f64) -> Self {
        self.push(Query::numeric_eq(field, value))
    }

    pub fn numeric_range(self, field: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        self.push(Query::numeric_range(field, min, max))
    }

    pub fn tags(self, field: impl Into<String>, values: Vec<String>) -> Self {
        self.push(Query::tags(field, values))
    }

    pub fn contains(self, field: impl Into<String>, text: impl Into<String>) -> Self {
        self.push(Query::text_search(field, text))
    }

    pub fn prefix(self, field: impl Into<String>, prefix: impl Into<String>) -> Self {
        self.push(Query::prefix(field, prefix))
    }

    pub fn wildcard(self, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.push(Query::wildcard(field, pattern))
    }

    pub fn query_string(self, query: impl Into<String>) -> Self {
        self.push(Query::query_string(query))
    }

    fn push(mut self, query: Query) -> Self {
        self.nodes.push(query.root);
        self
    }

    /// All constraints must match. Empty builder matches everything.
    pub fn build_and(self) -> Query {
        Self::combine(self.nodes, QueryNode::And)
    }

    /// Any constraint may match. Empty builder matches everything.
    pub fn build_or(self) -> Query {
        Self::combine(self.nodes, QueryNode::Or)
    }

    fn combine(mut nodes: Vec<QueryNode>, group: fn(Vec<QueryNode>) -> QueryNode) -> Query {
        match nodes.len() {
            0 => Query::match_all(),
            1 => Query::new(nodes.remove(0)),
            _ => Query::new(group(nodes)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_field_query() {
        let query = Query::field_eq("name", "Alice");
        assert_eq!(
            query.root,
            QueryNode::Field(FieldQuery {
                field: "name".to_string(),
                operator: FieldOperator::Equals,
                value: QueryValue::Text("Alice".to_string()),
            })
        );
    }

    #[test]
    fn test_query_string_defaults_to_and() {
        let query = Query::query_string("hello world");
        assert_eq!(
            query.root,
            QueryNode::QueryString {
                query: "hello world".into(),
                default_operator: Operator::And
            }
        );
        assert_eq!(
            query.to_json(),
            json!({"query_string": {"query": "hello world", "default_operator": "AND"}})
        );
    }

    #[test]
    fn test_wildcard_json() {
        assert_eq!(
            Query::wildcard("title", "a?c").to_json(),
            json!({"wildcard": {"title": "a?c"}})
        );
    }

    #[test]
    fn test_boolean_json() {
        let query = Query::field_eq("title", "hello")
            .and(Query::numeric_range("age", Some(1.0), None))
            .or(Query::tags("tags", vec!["x".into()]).negate());

        let json = query.to_json();
        let should = json["bool"]["should"].as_array().unwrap();
        assert_eq!(should.len(), 2);
        assert_eq!(should[0]["bool"]["must"][1], json!({"range": {"age": {"gte": 1.0}}}));
        assert_eq!(should[1]["bool"]["must_not"][0], json!({"terms": {"tags": ["x"]}}));
    }

    #[test]
    fn test_field_operators_json() {
        assert_eq!(Query::prefix("email", "admin").to_json(), json!({"prefix": {"email": "admin"}}));
        assert_eq!(Query::text_search("body", "ell").to_json(), json!({"wildcard": {"body": "*ell*"}}));
        assert_eq!(Query::bool_eq("paid", true).to_json(), json!({"term": {"paid": true}}));
        assert_eq!(
            Query::fuzzy("name", "alice").to_json()["fuzzy"]["name"]["fuzziness"],
            json!(1)
        );
    }

    #[test]
    fn test_query_builder_and() {
        let query = QueryBuilder::new()
            .field_eq("name", "Alice")
            .numeric_range("age", Some(25.0), Some(40.0))
            .tags("tags", vec!["rust".to_string()])
            .build_and();

        match query.root {
            QueryNode::And(nodes) => assert_eq!(nodes.len(), 3),
            _ => panic!("Expected And node"),
        }
    }

    #[test]
    fn test_query_builder_or_single() {
        let query = QueryBuilder::new().field_eq("status", "active").build_or();
        assert!(matches!(query.root, QueryNode::Field(_)));
    }

    #[test]
    fn test_empty_builder_matches_all() {
        assert_eq!(QueryBuilder::new().build_and(), Query::match_all());
        assert_eq!(Query::match_all().to_json(), json!({"match_all": {}}));
    }
}
