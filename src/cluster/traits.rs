// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

use crate::codec::Document;
use crate::schema::SchemaMapping;
use crate::search::Query;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClusterError {
    #[error("Cluster connection error: {0}")]
    Connection(String),
    #[error("Index '{0}' already exists")]
    IndexAlreadyExists(String),
    #[error("Index '{0}' not found")]
    IndexNotFound(String),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Cluster backend error: {0}")]
    Backend(String),
    #[error("Result window of {requested} exceeds the cluster limit of {limit}")]
    ResultWindowExceeded { requested: usize, limit: usize },
}

/// How the cluster keeps index data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageMode {
    /// Index data survives a process restart
    #[default]
    Persistent,
    /// Index data is local to this process and lost on restart
    Ephemeral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Updated,
    Deleted,
    NotFound,
}

/// Result of a single-document write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResult {
    pub index: String,
    pub id: String,
    pub outcome: WriteOutcome,
}

impl WriteResult {
    pub fn new(index: impl Into<String>, id: impl Into<String>, outcome: WriteOutcome) -> Self {
        Self {
            index: index.into(),
            id: id.into(),
            outcome,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BulkOperation {
    /// Create or replace
    Upsert {
        id: String,
        doc_type: String,
        document: Document,
    },
    Delete {
        id: String,
    },
}

impl BulkOperation {
    pub fn id(&self) -> &str {
        match self {
            BulkOperation::Upsert { id, .. } | BulkOperation::Delete { id } => id,
        }
    }
}

/// A batch of write operations against one index.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkRequest {
    index: String,
    operations: Vec<BulkOperation>,
}

impl BulkRequest {
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            operations: Vec::new(),
        }
    }

    pub fn upsert(&mut self, id: impl Into<String>, doc_type: impl Into<String>, document: Document) {
        self.operations.push(BulkOperation::Upsert {
            id: id.into(),
            doc_type: doc_type.into(),
            document,
        });
    }

    pub fn delete(&mut self, id: impl Into<String>) {
        self.operations.push(BulkOperation::Delete { id: id.into() });
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn operations(&self) -> &[BulkOperation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItemFailure {
    pub id: String,
    pub reason: String,
}

/// Batch response; item failures form the failure manifest.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BulkResponse {
    pub items: usize,
    pub failures: Vec<BulkItemFailure>,
    pub took: Duration,
}

impl BulkResponse {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.items.saturating_sub(self.failures.len())
    }

    /// One line per failed item
    pub fn failure_message(&self) -> String {
        self.failures
            .iter()
            .map(|f| format!("[{}]: {}", f.id, f.reason))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub descending: bool,
}

/// Term-frequency aggregation over one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermsAggregation {
    pub name: String,
    pub field: String,
    pub size: usize,
}

/// Engine-native search request.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub indices: Vec<String>,
    pub query: Query,
    pub sorts: Vec<SortSpec>,
    pub from: usize,
    pub size: usize,
    pub timeout: Duration,
    pub aggregation: Option<TermsAggregation>,
    /// Treat missing indices as empty instead of failing
    pub ignore_unavailable: bool,
}

impl SearchRequest {
    /// Request body in Elasticsearch form.
    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "query": self.query.to_json(),
            "from": self.from,
            "size": self.size,
            "timeout": format!("{}ms", self.timeout.as_millis()),
        });
        if !self.sorts.is_empty() {
            body["sort"] = Value::Array(
                self.sorts
                    .iter()
                    .map(|s| json!({ s.field.as_str(): { "order": if s.descending { "desc" } else { "asc" } } }))
                    .collect(),
            );
        }
        if let Some(agg) = &self.aggregation {
            body["aggs"] = json!({ agg.name.as_str(): { "terms": { "field": agg.field, "size": agg.size } } });
        }
        body
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub index: String,
    /// Document type tag
    pub doc_type: String,
    pub id: String,
    pub score: Option<f32>,
    pub source: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermsBucket {
    pub key: String,
    pub doc_count: u64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchResponse {
    /// Total matches, not just the returned page
    pub total: u64,
    pub took: Duration,
    pub hits: Vec<SearchHit>,
    /// Buckets of the terms aggregation, count descending
    pub buckets: Vec<TermsBucket>,
}

/// A remote search cluster.
///
/// Indices are addressed by name; documents by index and id. Implementations
/// must tolerate concurrent calls.
#[async_trait]
pub trait SearchCluster: Send + Sync {
    fn storage_mode(&self) -> StorageMode {
        StorageMode::Persistent
    }

    async fn index_exists(&self, index: &str) -> Result<bool, ClusterError>;

    /// Fails with [`ClusterError::IndexAlreadyExists`] if present.
    async fn create_index(&self, index: &str) -> Result<(), ClusterError>;

    /// Drops the index and its documents. Fails with [`ClusterError::IndexNotFound`] if absent.
    async fn delete_index(&self, index: &str) -> Result<(), ClusterError>;

    async fn put_mapping(&self, index: &str, type_name: &str, mapping: &SchemaMapping) -> Result<(), ClusterError>;

    async fn index_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        document: &Document,
    ) -> Result<WriteResult, ClusterError>;

    async fn delete_document(&self, index: &str, doc_type: &str, id: &str) -> Result<WriteResult, ClusterError>;

    /// Transport failure is an `Err`; item failures go in the response.
    async fn bulk(&self, request: BulkRequest) -> Result<BulkResponse, ClusterError>;

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, ClusterError>;
}
