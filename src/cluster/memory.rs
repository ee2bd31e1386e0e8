// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process search cluster.
//!
//! Local, ephemeral storage: everything lives in this process and is gone on
//! restart, so it reports [`StorageMode::Ephemeral`] and the service rebuilds
//! from the primary store at startup. Queries are evaluated directly against
//! the stored JSON sources:
//!
//! - query strings split on whitespace, `field:term` scopes a term, terms combine
//!   with the default operator, `*` matches everything
//! - terms match case-insensitively on word tokens; `?` and `*` glob
//! - missing sort values sort last
//!
//! Failure injection hooks ([`MemoryCluster::reject_id`],
//! [`MemoryCluster::fail_index`]) exist for exercising partial-failure paths.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde_json::Value;
use tracing::debug;

use super::traits::{
    BulkItemFailure, BulkOperation, BulkRequest, BulkResponse, ClusterError, SearchCluster, SearchHit,
    SearchRequest, SearchResponse, SortSpec, StorageMode, TermsBucket, WriteOutcome, WriteResult,
};
use crate::codec::Document;
use crate::schema::SchemaMapping;
use crate::search::{FieldOperator, FieldQuery, Operator, QueryNode, QueryValue};

#[derive(Debug, Clone)]
struct StoredDocument {
    doc_type: String,
    source: Value,
}

#[derive(Debug, Default)]
struct MemoryIndex {
    mapping: Option<(String, SchemaMapping)>,
    docs: BTreeMap<String, StoredDocument>,
}

pub struct MemoryCluster {
    indices: DashMap<String, MemoryIndex>,
    rejected: DashMap<String, String>,
    failing: DashSet<String>,
    creations: AtomicUsize,
    deletions: AtomicUsize,
    latency: Option<Duration>,
    mode: StorageMode,
}

impl MemoryCluster {
    #[must_use]
    pub fn new() -> Self {
        Self {
            indices: DashMap::new(),
            rejected: DashMap::new(),
            failing: DashSet::new(),
            creations: AtomicUsize::new(0),
            deletions: AtomicUsize::new(0),
            latency: None,
            mode: StorageMode::Ephemeral,
        }
    }

    /// Report persistent storage (no auto-rebuild at startup).
    #[must_use]
    pub fn persistent(mut self) -> Self {
        self.mode = StorageMode::Persistent;
        self
    }

    /// Sleep this long in every index-level operation, bulk and search.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Bulk upserts of this id fail with `reason` in the failure manifest.
    pub fn reject_id(&self, id: impl Into<String>, reason: impl Into<String>) {
        self.rejected.insert(id.into(), reason.into());
    }

    /// Every operation touching `index` fails until [`restore_index`](Self::restore_index).
    pub fn fail_index(&self, index: impl Into<String>) {
        self.failing.insert(index.into());
    }

    pub fn restore_index(&self, index: &str) {
        self.failing.remove(index);
    }

    pub fn index_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indices.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn document_count(&self, index: &str) -> Option<usize> {
        self.indices.get(index).map(|i| i.docs.len())
    }

    /// Stored source of a document
    pub fn document(&self, index: &str, id: &str) -> Option<Value> {
        self.indices
            .get(index)
            .and_then(|i| i.docs.get(id).map(|d| d.source.clone()))
    }

    /// Mapping last pushed to an index
    pub fn mapping(&self, index: &str) -> Option<SchemaMapping> {
        self.indices
            .get(index)
            .and_then(|i| i.mapping.as_ref().map(|(_, m)| m.clone()))
    }

    pub fn index_creations(&self) -> usize {
        self.creations.load(AtomicOrdering::SeqCst)
    }

    pub fn index_deletions(&self) -> usize {
        self.deletions.load(AtomicOrdering::SeqCst)
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_available(&self, index: &str) -> Result<(), ClusterError> {
        if self.failing.contains(index) {
            return Err(ClusterError::Backend(format!("index '{}' unavailable", index)));
        }
        Ok(())
    }
}

impl Default for MemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchCluster for MemoryCluster {
    fn storage_mode(&self) -> StorageMode {
        self.mode
    }

    async fn index_exists(&self, index: &str) -> Result<bool, ClusterError> {
        self.check_available(index)?;
        Ok(self.indices.contains_key(index))
    }

    async fn create_index(&self, index: &str) -> Result<(), ClusterError> {
        self.delay().await;
        self.check_available(index)?;
        match self.indices.entry(index.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(ClusterError::IndexAlreadyExists(index.to_string())),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(MemoryIndex::default());
                self.creations.fetch_add(1, AtomicOrdering::SeqCst);
                Ok(())
            }
        }
    }

    async fn delete_index(&self, index: &str) -> Result<(), ClusterError> {
        self.delay().await;
        self.check_available(index)?;
        match self.indices.remove(index) {
            Some(_) => {
                self.deletions.fetch_add(1, AtomicOrdering::SeqCst);
                Ok(())
            }
            None => Err(ClusterError::IndexNotFound(index.to_string())),
        }
    }

    async fn put_mapping(&self, index: &str, type_name: &str, mapping: &SchemaMapping) -> Result<(), ClusterError> {
        self.check_available(index)?;
        let mut entry = self
            .indices
            .get_mut(index)
            .ok_or_else(|| ClusterError::IndexNotFound(index.to_string()))?;
        entry.mapping = Some((type_name.to_string(), mapping.clone()));
        Ok(())
    }

    async fn index_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        document: &Document,
    ) -> Result<WriteResult, ClusterError> {
        self.check_available(index)?;
        let stored = StoredDocument {
            doc_type: doc_type.to_string(),
            source: document.clone().into_value(),
        };
        let previous = self
            .indices
            .entry(index.to_string())
            .or_default()
            .docs
            .insert(id.to_string(), stored);
        let outcome = if previous.is_some() {
            WriteOutcome::Updated
        } else {
            WriteOutcome::Created
        };
        Ok(WriteResult::new(index, id, outcome))
    }

    async fn delete_document(&self, index: &str, _doc_type: &str, id: &str) -> Result<WriteResult, ClusterError> {
        self.check_available(index)?;
        let mut entry = self
            .indices
            .get_mut(index)
            .ok_or_else(|| ClusterError::IndexNotFound(index.to_string()))?;
        let outcome = match entry.docs.remove(id) {
            Some(_) => WriteOutcome::Deleted,
            None => WriteOutcome::NotFound,
        };
        Ok(WriteResult::new(index, id, outcome))
    }

    async fn bulk(&self, request: BulkRequest) -> Result<BulkResponse, ClusterError> {
        let start = Instant::now();
        self.delay().await;
        if self.failing.contains(request.index()) {
            return Err(ClusterError::Connection(format!(
                "bulk request to '{}' failed",
                request.index()
            )));
        }

        let mut failures = Vec::new();
        let items = request.len();
        let mut index = self.indices.entry(request.index().to_string()).or_default();
        for op in request.operations() {
            if let Some(reason) = self.rejected.get(op.id()) {
                failures.push(BulkItemFailure {
                    id: op.id().to_string(),
                    reason: reason.value().clone(),
                });
                continue;
            }
            match op {
                BulkOperation::Upsert { id, doc_type, document } => {
                    index.docs.insert(
                        id.clone(),
                        StoredDocument {
                            doc_type: doc_type.clone(),
                            source: document.clone().into_value(),
                        },
                    );
                }
                BulkOperation::Delete { id } => {
                    index.docs.remove(id);
                }
            }
        }
        drop(index);

        Ok(BulkResponse {
            items,
            failures,
            took: start.elapsed(),
        })
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, ClusterError> {
        let start = Instant::now();
        self.delay().await;

        let mut hits = Vec::new();
        for name in &request.indices {
            self.check_available(name)?;
            let Some(index) = self.indices.get(name) else {
                if request.ignore_unavailable {
                    debug!(index = %name, "Skipping missing index");
                    continue;
                }
                return Err(ClusterError::IndexNotFound(name.clone()));
            };
            for (id, doc) in &index.docs {
                if matches(&request.query.root, &doc.source) {
                    hits.push(SearchHit {
                        index: name.clone(),
                        doc_type: doc.doc_type.clone(),
                        id: id.clone(),
                        score: None,
                        source: doc.source.clone(),
                    });
                }
            }
        }

        let total = hits.len() as u64;
        let buckets = match &request.aggregation {
            Some(agg) => terms_buckets(&hits, &agg.field, agg.size),
            None => Vec::new(),
        };

        if !request.sorts.is_empty() {
            hits.sort_by(|a, b| compare_hits(a, b, &request.sorts));
        }
        let hits = hits.into_iter().skip(request.from).take(request.size).collect();

        Ok(SearchResponse {
            total,
            took: start.elapsed(),
            hits,
            buckets,
        })
    }
}

fn matches(node: &QueryNode, source: &Value) -> bool {
    match node {
        QueryNode::MatchAll => true,
        QueryNode::QueryString { query, default_operator } => query_string_matches(query, *default_operator, source),
        QueryNode::Wildcard { field, pattern } => {
            let lowered = pattern.to_lowercase();
            leaf_strings(&values_at(source, field))
                .iter()
                .any(|s| glob_match(pattern, s) || tokenize(s).iter().any(|t| glob_match(&lowered, t)))
        }
        QueryNode::Field(field) => field_matches(field, source),
        QueryNode::And(nodes) => nodes.iter().all(|n| matches(n, source)),
        QueryNode::Or(nodes) => nodes.iter().any(|n| matches(n, source)),
        QueryNode::Not(inner) => !matches(inner, source),
    }
}

fn query_string_matches(query: &str, operator: Operator, source: &Value) -> bool {
    let clauses: Vec<&str> = query
        .split_whitespace()
        .filter(|t| !matches!(*t, "AND" | "OR" | "&&" | "||"))
        .collect();
    if clauses.is_empty() {
        return true;
    }
    let clause_matches = |clause: &&str| -> bool {
        if *clause == "*" {
            return true;
        }
        match clause.split_once(':') {
            Some((field, term)) if !field.is_empty() && is_field_name(field) => {
                term_matches(term, &leaf_strings(&values_at(source, field)))
            }
            _ => term_matches(clause, &leaf_strings(&[source])),
        }
    };
    match operator {
        Operator::And => clauses.iter().all(clause_matches),
        Operator::Or => clauses.iter().any(clause_matches),
    }
}

fn is_field_name(field: &str) -> bool {
    field.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.')
}

fn term_matches(term: &str, values: &[String]) -> bool {
    let term = term.trim_matches('"').to_lowercase();
    if term.is_empty() {
        return false;
    }
    let tokens: Vec<String> = values.iter().flat_map(|v| tokenize(v)).collect();
    if term.contains(['*', '?']) {
        return tokens.iter().any(|t| glob_match(&term, t))
            || values.iter().any(|v| glob_match(&term, &v.to_lowercase()));
    }
    tokenize(&term).iter().all(|t| tokens.contains(t))
}

fn field_matches(query: &FieldQuery, source: &Value) -> bool {
    let values = values_at(source, &query.field);
    match (&query.operator, &query.value) {
        (FieldOperator::Equals, QueryValue::Text(text)) => {
            let tokens: Vec<String> = leaf_strings(&values).iter().flat_map(|v| tokenize(v)).collect();
            let wanted = tokenize(text);
            !wanted.is_empty() && wanted.iter().all(|t| tokens.contains(t))
        }
        (FieldOperator::Equals, QueryValue::Numeric(n)) => leaf_numbers(&values).iter().any(|v| v == n),
        (FieldOperator::Equals, QueryValue::Boolean(b)) => {
            flatten_leaves(&values).iter().any(|v| v.as_bool() == Some(*b))
        }
        (FieldOperator::Contains, QueryValue::Text(text)) => {
            let needle = text.to_lowercase();
            leaf_strings(&values).iter().any(|v| v.to_lowercase().contains(&needle))
        }
        (FieldOperator::Range, QueryValue::NumericRange { min, max }) => leaf_numbers(&values)
            .iter()
            .any(|v| min.map_or(true, |m| *v >= m) && max.map_or(true, |m| *v <= m)),
        (FieldOperator::In, QueryValue::Tags(tags)) => leaf_strings(&values).iter().any(|v| tags.contains(v)),
        (FieldOperator::Prefix, QueryValue::Text(prefix)) => {
            let prefix = prefix.to_lowercase();
            leaf_strings(&values)
                .iter()
                .any(|v| v.to_lowercase().starts_with(&prefix) || tokenize(v).iter().any(|t| t.starts_with(&prefix)))
        }
        (FieldOperator::Fuzzy, QueryValue::Text(text)) => {
            let text = text.to_lowercase();
            leaf_strings(&values)
                .iter()
                .flat_map(|v| tokenize(v))
                .any(|t| edit_distance(&t, &text) <= 1)
        }
        _ => false,
    }
}

/// Values at a dotted path; arrays are flattened at every level.
fn values_at<'a>(source: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![source];
    for segment in path.split('.') {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(map) => {
                    if let Some(v) = map.get(segment) {
                        next.push(v);
                    }
                }
                Value::Array(items) => {
                    for item in items {
                        if let Some(v) = item.get(segment) {
                            next.push(v);
                        }
                    }
                }
                _ => {}
            }
        }
        current = next;
    }
    current
}

fn flatten_leaves<'a>(values: &[&'a Value]) -> Vec<&'a Value> {
    let mut out = Vec::new();
    let mut stack: Vec<&Value> = values.iter().rev().copied().collect();
    while let Some(value) = stack.pop() {
        match value {
            Value::Array(items) => stack.extend(items.iter().rev()),
            Value::Object(map) => stack.extend(map.values().rev()),
            Value::Null => {}
            leaf => out.push(leaf),
        }
    }
    out
}

fn leaf_strings(values: &[&Value]) -> Vec<String> {
    flatten_leaves(values)
        .into_iter()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect()
}

fn leaf_numbers(values: &[&Value]) -> Vec<f64> {
    flatten_leaves(values).into_iter().filter_map(Value::as_f64).collect()
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// `?` matches one char, `*` any run.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '*')
}

fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for i in 1..=a.len() {
        let mut row = vec![i; b.len() + 1];
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            row[j] = (prev[j] + 1).min(row[j - 1] + 1).min(prev[j - 1] + cost);
        }
        prev = row;
    }
    prev[b.len()]
}

fn compare_hits(a: &SearchHit, b: &SearchHit, sorts: &[SortSpec]) -> Ordering {
    for sort in sorts {
        let left = values_at(&a.source, &sort.field).into_iter().next();
        let right = values_at(&b.source, &sort.field).into_iter().next();
        let ordering = match (left, right) {
            (None, None) => Ordering::Equal,
            // Missing values sort last in either direction
            (None, Some(_)) => return Ordering::Greater,
            (Some(_), None) => return Ordering::Less,
            (Some(l), Some(r)) => {
                let ord = compare_values(l, r);
                if sort.descending {
                    ord.reverse()
                } else {
                    ord
                }
            }
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (x, y) => x.to_string().cmp(&y.to_string()),
    }
}

/// Document counts per distinct value, count descending then key ascending.
fn terms_buckets(hits: &[SearchHit], field: &str, size: usize) -> Vec<TermsBucket> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for hit in hits {
        let mut seen = leaf_strings(&values_at(&hit.source, field));
        seen.sort();
        seen.dedup();
        for key in seen {
            *counts.entry(key).or_insert(0) += 1;
        }
    }
    let mut buckets: Vec<TermsBucket> = counts
        .into_iter()
        .map(|(key, doc_count)| TermsBucket { key, doc_count })
        .collect();
    buckets.sort_by(|a, b| b.doc_count.cmp(&a.doc_count).then_with(|| a.key.cmp(&b.key)));
    buckets.truncate(size);
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::Query;
    use crate::cluster::TermsAggregation;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => Document::from(map),
            _ => panic!("not an object"),
        }
    }

    fn request(indices: &[&str], query: Query) -> SearchRequest {
        SearchRequest {
            indices: indices.iter().map(|s| s.to_string()).collect(),
            query,
            sorts: Vec::new(),
            from: 0,
            size: 100,
            timeout: Duration::from_secs(10),
            aggregation: None,
            ignore_unavailable: true,
        }
    }

    async fn seeded() -> MemoryCluster {
        let cluster = MemoryCluster::new();
        cluster.create_index("index_article").await.unwrap();
        let docs = [
            ("1", json!({"id": 1, "title": "hello world", "tags": ["rust", "search"], "rank": 3})),
            ("2", json!({"id": 2, "title": "Hello there", "tags": ["rust"], "rank": 1})),
            ("3", json!({"id": 3, "title": "goodbye", "author": {"name": "Ann"}})),
        ];
        for (id, source) in docs {
            cluster
                .index_document("index_article", "article", id, &doc(source))
                .await
                .unwrap();
        }
        cluster
    }

    async fn ids(cluster: &MemoryCluster, req: SearchRequest) -> Vec<String> {
        cluster.search(&req).await.unwrap().hits.into_iter().map(|h| h.id).collect()
    }

    #[tokio::test]
    async fn test_index_lifecycle() {
        let cluster = MemoryCluster::new();
        assert!(!cluster.index_exists("index_a").await.unwrap());

        cluster.create_index("index_a").await.unwrap();
        assert!(cluster.index_exists("index_a").await.unwrap());
        assert_eq!(
            cluster.create_index("index_a").await.unwrap_err(),
            ClusterError::IndexAlreadyExists("index_a".into())
        );

        cluster.delete_index("index_a").await.unwrap();
        assert_eq!(
            cluster.delete_index("index_a").await.unwrap_err(),
            ClusterError::IndexNotFound("index_a".into())
        );
        assert_eq!(cluster.index_creations(), 1);
        assert_eq!(cluster.index_deletions(), 1);
    }

    #[tokio::test]
    async fn test_put_mapping_requires_index() {
        let cluster = MemoryCluster::new();
        let mapping = SchemaMapping::default();
        assert!(matches!(
            cluster.put_mapping("index_a", "a", &mapping).await,
            Err(ClusterError::IndexNotFound(_))
        ));

        cluster.create_index("index_a").await.unwrap();
        cluster.put_mapping("index_a", "a", &mapping).await.unwrap();
        assert_eq!(cluster.mapping("index_a"), Some(mapping));
    }

    #[tokio::test]
    async fn test_write_outcomes() {
        let cluster = MemoryCluster::new();
        let d = doc(json!({"title": "x"}));

        let first = cluster.index_document("index_a", "a", "1", &d).await.unwrap();
        assert_eq!(first.outcome, WriteOutcome::Created);
        let second = cluster.index_document("index_a", "a", "1", &d).await.unwrap();
        assert_eq!(second.outcome, WriteOutcome::Updated);

        let deleted = cluster.delete_document("index_a", "a", "1").await.unwrap();
        assert_eq!(deleted.outcome, WriteOutcome::Deleted);
        let missing = cluster.delete_document("index_a", "a", "1").await.unwrap();
        assert_eq!(missing.outcome, WriteOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_query_string_and_semantics() {
        let cluster = seeded().await;

        assert_eq!(ids(&cluster, request(&["index_article"], Query::query_string("hello"))).await, vec!["1", "2"]);
        assert_eq!(ids(&cluster, request(&["index_article"], Query::query_string("hello world"))).await, vec!["1"]);
        assert_eq!(
            ids(&cluster, request(&["index_article"], Query::query_string_with("world goodbye", Operator::Or))).await,
            vec!["1", "3"]
        );
        assert_eq!(ids(&cluster, request(&["index_article"], Query::query_string("tags:search"))).await, vec!["1"]);
        assert_eq!(ids(&cluster, request(&["index_article"], Query::query_string("author.name:ann"))).await, vec!["3"]);
        assert_eq!(ids(&cluster, request(&["index_article"], Query::query_string("*"))).await.len(), 3);
    }

    #[tokio::test]
    async fn test_wildcard_query() {
        let cluster = seeded().await;
        assert_eq!(ids(&cluster, request(&["index_article"], Query::wildcard("title", "hel*"))).await, vec!["1", "2"]);
        assert_eq!(ids(&cluster, request(&["index_article"], Query::wildcard("title", "wor?d"))).await, vec!["1"]);
        assert!(ids(&cluster, request(&["index_article"], Query::wildcard("title", "x*"))).await.is_empty());
    }

    #[tokio::test]
    async fn test_field_queries() {
        let cluster = seeded().await;
        let idx = ["index_article"];

        assert_eq!(ids(&cluster, request(&idx, Query::tags("tags", vec!["search".into()]))).await, vec!["1"]);
        assert_eq!(ids(&cluster, request(&idx, Query::numeric_range("rank", Some(2.0), None))).await, vec!["1"]);
        assert_eq!(ids(&cluster, request(&idx, Query::numeric_eq("id", 2.0))).await, vec!["2"]);
        assert_eq!(ids(&cluster, request(&idx, Query::prefix("title", "good"))).await, vec!["3"]);
        assert_eq!(ids(&cluster, request(&idx, Query::fuzzy("title", "wrld"))).await, vec!["1"]);
        assert_eq!(ids(&cluster, request(&idx, Query::text_search("title", "LLO T"))).await, vec!["2"]);
        assert_eq!(
            ids(&cluster, request(&idx, Query::query_string("hello").and(Query::field_eq("title", "there").negate()))).await,
            vec!["1"]
        );
    }

    #[tokio::test]
    async fn test_sort_and_paging() {
        let cluster = seeded().await;
        let mut req = request(&["index_article"], Query::match_all());
        req.sorts = vec![SortSpec { field: "rank".into(), descending: true }];

        // Doc 3 has no rank and sorts last
        assert_eq!(ids(&cluster, req.clone()).await, vec!["1", "2", "3"]);

        req.sorts[0].descending = false;
        assert_eq!(ids(&cluster, req.clone()).await, vec!["2", "1", "3"]);

        req.from = 1;
        req.size = 1;
        let resp = cluster.search(&req).await.unwrap();
        assert_eq!(resp.total, 3);
        assert_eq!(resp.hits.len(), 1);
        assert_eq!(resp.hits[0].id, "1");
        assert_eq!(resp.hits[0].doc_type, "article");
    }

    #[tokio::test]
    async fn test_terms_aggregation() {
        let cluster = seeded().await;
        let mut req = request(&["index_article"], Query::match_all());
        req.size = 0;
        req.aggregation = Some(TermsAggregation { name: "tags".into(), field: "tags".into(), size: 10 });

        let resp = cluster.search(&req).await.unwrap();
        assert!(resp.hits.is_empty());
        assert_eq!(
            resp.buckets,
            vec![
                TermsBucket { key: "rust".into(), doc_count: 2 },
                TermsBucket { key: "search".into(), doc_count: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_index_handling() {
        let cluster = seeded().await;
        let req = request(&["index_missing", "index_article"], Query::query_string("goodbye"));
        assert_eq!(ids(&cluster, req.clone()).await, vec!["3"]);

        let strict = SearchRequest { ignore_unavailable: false, ..req };
        assert!(matches!(cluster.search(&strict).await, Err(ClusterError::IndexNotFound(_))));
    }

    #[tokio::test]
    async fn test_bulk_with_rejections() {
        let cluster = MemoryCluster::new();
        cluster.reject_id("2", "mapper_parsing_exception");

        let mut req = BulkRequest::new("index_a");
        for id in ["1", "2", "3"] {
            req.upsert(id, "a", doc(json!({"title": id})));
        }
        let resp = cluster.bulk(req).await.unwrap();

        assert_eq!(resp.items, 3);
        assert_eq!(resp.failures.len(), 1);
        assert_eq!(resp.failures[0].id, "2");
        assert_eq!(cluster.document_count("index_a"), Some(2));
    }

    #[tokio::test]
    async fn test_failing_index() {
        let cluster = MemoryCluster::new();
        cluster.fail_index("index_a");

        assert!(matches!(cluster.bulk(BulkRequest::new("index_a")).await, Err(ClusterError::Connection(_))));
        assert!(cluster.create_index("index_a").await.is_err());

        cluster.restore_index("index_a");
        assert!(cluster.create_index("index_a").await.is_ok());
    }

    #[test]
    fn test_storage_modes() {
        assert_eq!(MemoryCluster::new().storage_mode(), StorageMode::Ephemeral);
        assert_eq!(MemoryCluster::new().persistent().storage_mode(), StorageMode::Persistent);
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("a?c", "abc"));
        assert!(glob_match("a*c", "abbbc"));
        assert!(glob_match("a*c", "ac"));
        assert!(glob_match("*", ""));
        assert!(!glob_match("a?c", "ac"));
        assert!(!glob_match("abc", "abd"));
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("world", "world"), 0);
        assert_eq!(edit_distance("world", "wrld"), 1);
        assert_eq!(edit_distance("world", "word"), 1);
        assert_eq!(edit_distance("kitten", "sitting"), 3);
    }
}
