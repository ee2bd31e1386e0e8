// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis Stack cluster backend.
//!
//! Each logical index is a RediSearch index over RedisJSON documents:
//!
//! ```text
//! {prefix}meta:{index}          HASH   created, mapping:{type}
//! {prefix}idx:{index}           FT     ON JSON PREFIX 1 {prefix}doc:{index}:
//! {prefix}doc:{index}:{id}      JSON   {"doc_type": "article", "payload": {...}}
//! ```
//!
//! The meta hash is the source of truth for existence, so an index without a
//! mapping yet still "exists" and searches it as empty.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use redis::{cmd, pipe, Client};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::redisearch::{field_alias, RediSearchTranslator, SearchIndex};
use super::traits::{
    BulkItemFailure, BulkOperation, BulkRequest, BulkResponse, ClusterError, SearchCluster, SearchHit,
    SearchRequest, SearchResponse, SortSpec, TermsBucket, WriteOutcome, WriteResult,
};
use crate::codec::Document;
use crate::resilience::retry::{is_transient_redis, retry, retry_if, RetryConfig};
use crate::schema::SchemaMapping;

const SCAN_COUNT: usize = 500;

/// RediSearch's default `MAXSEARCHRESULTS`; `LIMIT offset num` may not reach past it.
pub const MAX_RESULT_WINDOW: usize = 10_000;

/// How one index's hits get into the requested order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortPlan<'a> {
    /// Relevance, which FT.SEARCH already orders by
    Score,
    /// A single sortable key, sent as SORTBY
    Server(&'a SortSpec),
    /// Secondary keys or unsortable fields: every match is fetched and sorted here
    Client,
}

impl SortPlan<'_> {
    /// `LIMIT 0 n` for one index. Server-ordered plans only need the top
    /// `from + size`; client-side sorts need every match.
    fn fetch_window(&self, request: &SearchRequest) -> usize {
        match self {
            SortPlan::Score | SortPlan::Server(_) => request.from.saturating_add(request.size),
            SortPlan::Client => MAX_RESULT_WINDOW,
        }
    }
}

fn plan_sort<'a>(schema: Option<&SearchIndex>, sorts: &'a [SortSpec]) -> SortPlan<'a> {
    match sorts {
        [] => SortPlan::Score,
        [only] => {
            let alias = field_alias(&only.field);
            let sortable = schema.is_some_and(|idx| idx.fields.iter().any(|f| f.name == alias && f.sortable));
            if sortable {
                SortPlan::Server(only)
            } else {
                SortPlan::Client
            }
        }
        _ => SortPlan::Client,
    }
}

fn check_window(request: &SearchRequest) -> Result<(), ClusterError> {
    let requested = request.from.saturating_add(request.size);
    if requested > MAX_RESULT_WINDOW {
        return Err(ClusterError::ResultWindowExceeded {
            requested,
            limit: MAX_RESULT_WINDOW,
        });
    }
    Ok(())
}

fn is_unknown_index(e: &redis::RedisError) -> bool {
    let msg = e.to_string().to_lowercase();
    msg.contains("unknown index") || msg.contains("no such index") || msg.contains("unknown: index")
}

fn cluster_error(e: redis::RedisError) -> ClusterError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
        ClusterError::Connection(e.to_string())
    } else {
        ClusterError::Backend(e.to_string())
    }
}

pub struct RedisCluster {
    connection: ConnectionManager,
    prefix: String,
    /// Schemas of indices mapped by this process, for query translation
    schemas: DashMap<String, SearchIndex>,
    retry_config: RetryConfig,
}

impl RedisCluster {
    pub async fn new(connection_string: &str) -> Result<Self, ClusterError> {
        Self::with_prefix(connection_string, None).await
    }

    /// Connect with a key prefix (e.g. `"es:"`) for sharing a Redis instance.
    pub async fn with_prefix(connection_string: &str, prefix: Option<&str>) -> Result<Self, ClusterError> {
        let client = Client::open(connection_string).map_err(|e| ClusterError::Connection(e.to_string()))?;

        let connection = retry("redis_connect", &RetryConfig::startup(), || async {
            ConnectionManager::new(client.clone()).await
        })
        .await
        .map_err(|e: redis::RedisError| ClusterError::Connection(e.to_string()))?;

        info!(prefix = prefix.unwrap_or(""), "Connected to search cluster");
        Ok(Self {
            connection,
            prefix: prefix.unwrap_or("").to_string(),
            schemas: DashMap::new(),
            retry_config: RetryConfig::query(),
        })
    }

    #[must_use]
    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn meta_key(&self, index: &str) -> String {
        format!("{}meta:{}", self.prefix, index)
    }

    fn ft_name(&self, index: &str) -> String {
        format!("{}idx:{}", self.prefix, index)
    }

    fn doc_prefix(&self, index: &str) -> String {
        format!("{}doc:{}:", self.prefix, index)
    }

    fn doc_key(&self, index: &str, id: &str) -> String {
        format!("{}{}", self.doc_prefix(index), id)
    }

    fn translator(&self, index: &str) -> RediSearchTranslator {
        self.schemas
            .get(index)
            .map(|s| s.translator())
            .unwrap_or_default()
    }

    fn stored_json(doc_type: &str, document: &Document) -> String {
        json!({ "doc_type": doc_type, "payload": document.fields() }).to_string()
    }

    /// Create the meta hash if missing. Returns true when this call created it.
    async fn touch_meta(&self, index: &str) -> Result<bool, ClusterError> {
        let key = self.meta_key(index);
        let created: i64 = retry_if("redis_meta_create", &self.retry_config, is_transient_redis, || {
            let mut conn = self.connection.clone();
            let key = key.clone();
            async move {
                cmd("HSETNX")
                    .arg(&key)
                    .arg("created")
                    .arg(now_millis())
                    .query_async(&mut conn)
                    .await
            }
        })
        .await
        .map_err(cluster_error)?;
        Ok(created == 1)
    }

    async fn drop_ft_index(&self, index: &str, with_documents: bool) -> Result<(), ClusterError> {
        let name = self.ft_name(index);
        let result: Result<(), redis::RedisError> =
            retry_if("redis_ft_dropindex", &self.retry_config, is_transient_redis, || {
                let mut conn = self.connection.clone();
                let name = name.clone();
                async move {
                    let mut c = cmd("FT.DROPINDEX");
                    c.arg(&name);
                    if with_documents {
                        c.arg("DD");
                    }
                    c.query_async::<()>(&mut conn).await
                }
            })
            .await;
        match result {
            Ok(()) => Ok(()),
            Err(e) if is_unknown_index(&e) => Ok(()),
            Err(e) => Err(cluster_error(e)),
        }
    }

    /// Delete leftover document keys (documents written before a mapping existed).
    async fn delete_documents(&self, index: &str) -> Result<usize, ClusterError> {
        let pattern = format!("{}*", self.doc_prefix(index));
        let mut cursor: u64 = 0;
        let mut deleted = 0;
        loop {
            let (next, keys): (u64, Vec<String>) =
                retry_if("redis_scan", &self.retry_config, is_transient_redis, || {
                    let mut conn = self.connection.clone();
                    let pattern = pattern.clone();
                    async move {
                        cmd("SCAN")
                            .arg(cursor)
                            .arg("MATCH")
                            .arg(&pattern)
                            .arg("COUNT")
                            .arg(SCAN_COUNT)
                            .query_async(&mut conn)
                            .await
                    }
                })
                .await
                .map_err(cluster_error)?;

            if !keys.is_empty() {
                let mut conn = self.connection.clone();
                let n: usize = cmd("DEL").arg(&keys).query_async(&mut conn).await.map_err(cluster_error)?;
                deleted += n;
            }
            if next == 0 {
                return Ok(deleted);
            }
            cursor = next;
        }
    }

    async fn write_one(&self, index: &str, op: &BulkOperation) -> Result<(), redis::RedisError> {
        let mut conn = self.connection.clone();
        match op {
            BulkOperation::Upsert { id, doc_type, document } => {
                cmd("JSON.SET")
                    .arg(self.doc_key(index, id))
                    .arg("$")
                    .arg(Self::stored_json(doc_type, document))
                    .query_async::<()>(&mut conn)
                    .await
            }
            BulkOperation::Delete { id } => {
                cmd("DEL").arg(self.doc_key(index, id)).query_async::<()>(&mut conn).await
            }
        }
    }

    async fn search_index(
        &self,
        index: &str,
        query: &str,
        request: &SearchRequest,
    ) -> Result<Option<(u64, Vec<SearchHit>)>, ClusterError> {
        let name = self.ft_name(index);
        let plan = plan_sort(self.schemas.get(index).as_deref(), &request.sorts);

        let mut c = cmd("FT.SEARCH");
        c.arg(&name).arg(query).arg("WITHSCORES");
        if let SortPlan::Server(sort) = plan {
            c.arg("SORTBY")
                .arg(field_alias(&sort.field))
                .arg(if sort.descending { "DESC" } else { "ASC" });
        }
        c.arg("LIMIT")
            .arg(0)
            .arg(plan.fetch_window(request))
            .arg("TIMEOUT")
            .arg(request.timeout.as_millis() as u64)
            .arg("DIALECT")
            .arg(2);

        let reply: Result<redis::Value, redis::RedisError> =
            retry_if("redis_ft_search", &self.retry_config, is_transient_redis, || {
                let mut conn = self.connection.clone();
                let c = c.clone();
                async move { c.query_async(&mut conn).await }
            })
            .await;

        let reply = match reply {
            Ok(v) => v,
            Err(e) if is_unknown_index(&e) => return Ok(None),
            Err(e) if e.is_timeout() => return Err(ClusterError::Timeout(request.timeout)),
            Err(e) => return Err(cluster_error(e)),
        };
        let (total, hits) = self.parse_search_reply(index, &reply)?;
        if plan == SortPlan::Client && total > MAX_RESULT_WINDOW as u64 {
            // A partial fetch would sort the wrong subset
            return Err(ClusterError::ResultWindowExceeded {
                requested: total as usize,
                limit: MAX_RESULT_WINDOW,
            });
        }
        Ok(Some((total, hits)))
    }

    /// `[total, key, score, [field, value, ...], key, score, ...]`
    fn parse_search_reply(&self, index: &str, reply: &redis::Value) -> Result<(u64, Vec<SearchHit>), ClusterError> {
        let malformed = |what: &str| ClusterError::Backend(format!("Malformed FT.SEARCH reply: {}", what));
        let items: Vec<redis::Value> = redis::from_redis_value(reply).map_err(|_| malformed("not an array"))?;
        let mut iter = items.iter();
        let total: u64 = iter
            .next()
            .and_then(|v| redis::from_redis_value(v).ok())
            .ok_or_else(|| malformed("missing total"))?;

        let prefix = self.doc_prefix(index);
        let mut hits = Vec::new();
        while let Some(key) = iter.next() {
            let key: String = redis::from_redis_value(key).map_err(|_| malformed("key"))?;
            let score: Option<f64> = iter.next().and_then(|v| redis::from_redis_value(v).ok());
            let fields: Vec<String> = iter
                .next()
                .and_then(|v| redis::from_redis_value(v).ok())
                .unwrap_or_default();

            let Some(raw) = fields.chunks(2).find(|pair| pair[0] == "$").and_then(|pair| pair.get(1)) else {
                warn!(key = %key, "Search hit without document body");
                continue;
            };
            let stored: Value = match serde_json::from_str(raw) {
                Ok(v) => v,
                Err(e) => {
                    warn!(key = %key, error = %e, "Unparseable document in search hit");
                    continue;
                }
            };
            hits.push(SearchHit {
                index: index.to_string(),
                doc_type: stored.get("doc_type").and_then(Value::as_str).unwrap_or_default().to_string(),
                id: key.strip_prefix(&prefix).unwrap_or(&key).to_string(),
                score: score.map(|s| s as f32),
                source: stored.get("payload").cloned().unwrap_or(Value::Null),
            });
        }
        Ok((total, hits))
    }

    async fn aggregate_index(
        &self,
        index: &str,
        query: &str,
        field: &str,
        size: usize,
    ) -> Result<Vec<(String, u64)>, ClusterError> {
        let mut c = cmd("FT.AGGREGATE");
        c.arg(self.ft_name(index))
            .arg(query)
            .arg("GROUPBY")
            .arg(1)
            .arg(format!("@{}", field_alias(field)))
            .arg("REDUCE")
            .arg("COUNT")
            .arg(0)
            .arg("AS")
            .arg("count")
            .arg("SORTBY")
            .arg(2)
            .arg("@count")
            .arg("DESC")
            .arg("MAX")
            .arg(size.max(1))
            .arg("DIALECT")
            .arg(2);

        let reply: Result<redis::Value, redis::RedisError> =
            retry_if("redis_ft_aggregate", &self.retry_config, is_transient_redis, || {
                let mut conn = self.connection.clone();
                let c = c.clone();
                async move { c.query_async(&mut conn).await }
            })
            .await;
        let reply = match reply {
            Ok(v) => v,
            Err(e) if is_unknown_index(&e) => return Ok(Vec::new()),
            Err(e) => return Err(cluster_error(e)),
        };

        let rows: Vec<redis::Value> = redis::from_redis_value(&reply).unwrap_or_default();
        let alias = field_alias(field);
        Ok(rows
            .iter()
            .skip(1)
            .filter_map(|row| redis::from_redis_value::<Vec<String>>(row).ok())
            .filter_map(|row| {
                let mut key = None;
                let mut count = None;
                for pair in row.chunks(2) {
                    match (pair[0].as_str(), pair.get(1)) {
                        (name, Some(value)) if name == alias => key = Some(value.clone()),
                        ("count", Some(value)) => count = value.parse::<u64>().ok(),
                        _ => {}
                    }
                }
                Some((key?, count?))
            })
            .collect())
    }
}

/// Milliseconds since the epoch, for the meta hash.
fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

fn compare_hits(a: &SearchHit, b: &SearchHit, sorts: &[SortSpec]) -> Ordering {
    if sorts.is_empty() {
        let (sa, sb) = (a.score.unwrap_or(0.0), b.score.unwrap_or(0.0));
        return sb.partial_cmp(&sa).unwrap_or(Ordering::Equal);
    }
    for sort in sorts {
        let va = lookup(&a.source, &sort.field);
        let vb = lookup(&b.source, &sort.field);
        let ord = match (va, vb) {
            (None, None) => Ordering::Equal,
            // Missing values last regardless of direction
            (None, Some(_)) => return Ordering::Greater,
            (Some(_), None) => return Ordering::Less,
            (Some(x), Some(y)) => {
                let ord = compare_values(x, y);
                if sort.descending {
                    ord.reverse()
                } else {
                    ord
                }
            }
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn lookup<'a>(source: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(source, |v, segment| v.get(segment))
        .filter(|v| !v.is_null())
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => value_text(a).cmp(&value_text(b)),
    }
}

fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl SearchCluster for RedisCluster {
    async fn index_exists(&self, index: &str) -> Result<bool, ClusterError> {
        let key = self.meta_key(index);
        retry_if("redis_exists", &self.retry_config, is_transient_redis, || {
            let mut conn = self.connection.clone();
            let key = key.clone();
            async move { cmd("EXISTS").arg(&key).query_async::<bool>(&mut conn).await }
        })
        .await
        .map_err(cluster_error)
    }

    async fn create_index(&self, index: &str) -> Result<(), ClusterError> {
        if self.touch_meta(index).await? {
            info!(index = %index, "Index created");
            Ok(())
        } else {
            Err(ClusterError::IndexAlreadyExists(index.to_string()))
        }
    }

    async fn delete_index(&self, index: &str) -> Result<(), ClusterError> {
        if !self.index_exists(index).await? {
            return Err(ClusterError::IndexNotFound(index.to_string()));
        }
        self.drop_ft_index(index, true).await?;
        let leftovers = self.delete_documents(index).await?;

        let key = self.meta_key(index);
        let mut conn = self.connection.clone();
        cmd("DEL").arg(&key).query_async::<()>(&mut conn).await.map_err(cluster_error)?;
        self.schemas.remove(index);

        info!(index = %index, leftovers, "Index deleted");
        Ok(())
    }

    async fn put_mapping(&self, index: &str, type_name: &str, mapping: &SchemaMapping) -> Result<(), ClusterError> {
        if !self.index_exists(index).await? {
            return Err(ClusterError::IndexNotFound(index.to_string()));
        }

        let schema = SearchIndex::from_mapping(self.ft_name(index), self.doc_prefix(index), mapping);
        let mapping_json = mapping.to_mapping_json(type_name).to_string();
        let key = self.meta_key(index);
        {
            let mut conn = self.connection.clone();
            cmd("HSET")
                .arg(&key)
                .arg(format!("mapping:{}", type_name))
                .arg(&mapping_json)
                .query_async::<()>(&mut conn)
                .await
                .map_err(cluster_error)?;
        }

        // Redefine in place; documents stay and get re-indexed
        self.drop_ft_index(index, false).await?;
        if !schema.fields.is_empty() {
            let args = schema.to_ft_create_args();
            debug!(index = %index, args = ?args, "FT.CREATE");
            retry_if("redis_ft_create", &self.retry_config, is_transient_redis, || {
                let mut conn = self.connection.clone();
                let args = args.clone();
                async move { cmd("FT.CREATE").arg(&args).query_async::<()>(&mut conn).await }
            })
            .await
            .map_err(cluster_error)?;
        }
        self.schemas.insert(index.to_string(), schema);

        debug!(index = %index, type_name = %type_name, "Mapping applied");
        Ok(())
    }

    async fn index_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        document: &Document,
    ) -> Result<WriteResult, ClusterError> {
        self.touch_meta(index).await?;
        let key = self.doc_key(index, id);
        let body = Self::stored_json(doc_type, document);

        let (existed, ()): (bool, ()) = retry_if("redis_json_set", &self.retry_config, is_transient_redis, || {
            let mut conn = self.connection.clone();
            let key = key.clone();
            let body = body.clone();
            async move {
                pipe()
                    .cmd("EXISTS")
                    .arg(&key)
                    .cmd("JSON.SET")
                    .arg(&key)
                    .arg("$")
                    .arg(&body)
                    .query_async(&mut conn)
                    .await
            }
        })
        .await
        .map_err(cluster_error)?;

        let outcome = if existed { WriteOutcome::Updated } else { WriteOutcome::Created };
        Ok(WriteResult::new(index, id, outcome))
    }

    async fn delete_document(&self, index: &str, _doc_type: &str, id: &str) -> Result<WriteResult, ClusterError> {
        let key = self.doc_key(index, id);
        let removed: i64 = retry_if("redis_delete", &self.retry_config, is_transient_redis, || {
            let mut conn = self.connection.clone();
            let key = key.clone();
            async move { cmd("DEL").arg(&key).query_async(&mut conn).await }
        })
        .await
        .map_err(cluster_error)?;

        let outcome = if removed > 0 { WriteOutcome::Deleted } else { WriteOutcome::NotFound };
        Ok(WriteResult::new(index, id, outcome))
    }

    async fn bulk(&self, request: BulkRequest) -> Result<BulkResponse, ClusterError> {
        let start = Instant::now();
        let index = request.index().to_string();
        if request.is_empty() {
            return Ok(BulkResponse::default());
        }
        self.touch_meta(&index).await?;

        let mut pipeline = pipe();
        for op in request.operations() {
            match op {
                BulkOperation::Upsert { id, doc_type, document } => {
                    pipeline
                        .cmd("JSON.SET")
                        .arg(self.doc_key(&index, id))
                        .arg("$")
                        .arg(Self::stored_json(doc_type, document))
                        .ignore();
                }
                BulkOperation::Delete { id } => {
                    pipeline.cmd("DEL").arg(self.doc_key(&index, id)).ignore();
                }
            }
        }

        let result: Result<(), redis::RedisError> =
            retry_if("redis_bulk", &self.retry_config, is_transient_redis, || {
                let mut conn = self.connection.clone();
                let pipeline = pipeline.clone();
                async move { pipeline.query_async(&mut conn).await }
            })
            .await;

        let mut failures = Vec::new();
        match result {
            Ok(()) => {}
            Err(e) if is_transient_redis(&e) => return Err(ClusterError::Connection(e.to_string())),
            Err(e) => {
                // Some item was refused; replay one by one to find which
                debug!(index = %index, error = %e, "Bulk pipeline rejected, replaying per item");
                for op in request.operations() {
                    if let Err(e) = self.write_one(&index, op).await {
                        if is_transient_redis(&e) {
                            return Err(ClusterError::Connection(e.to_string()));
                        }
                        failures.push(BulkItemFailure {
                            id: op.id().to_string(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        Ok(BulkResponse {
            items: request.len(),
            failures,
            took: start.elapsed(),
        })
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, ClusterError> {
        let start = Instant::now();
        check_window(request)?;
        let mut total = 0;
        let mut hits = Vec::new();
        let mut counts: HashMap<String, u64> = HashMap::new();

        for index in &request.indices {
            if !self.index_exists(index).await? {
                if request.ignore_unavailable {
                    continue;
                }
                return Err(ClusterError::IndexNotFound(index.clone()));
            }
            let query = self.translator(index).translate(&request.query);
            debug!(index = %index, query = %query, "FT.SEARCH");

            if let Some((n, mut found)) = self.search_index(index, &query, request).await? {
                total += n;
                hits.append(&mut found);
            }

            if let Some(agg) = &request.aggregation {
                for (key, count) in self.aggregate_index(index, &query, &agg.field, agg.size).await? {
                    *counts.entry(key).or_default() += count;
                }
            }
        }

        hits.sort_by(|a, b| compare_hits(a, b, &request.sorts));
        let hits: Vec<SearchHit> = hits.into_iter().skip(request.from).take(request.size).collect();

        let mut buckets: Vec<TermsBucket> = counts
            .into_iter()
            .map(|(key, doc_count)| TermsBucket { key, doc_count })
            .collect();
        buckets.sort_by(|a, b| b.doc_count.cmp(&a.doc_count).then_with(|| a.key.cmp(&b.key)));
        if let Some(agg) = &request.aggregation {
            buckets.truncate(agg.size);
        }

        let took = start.elapsed();
        if took > request.timeout {
            warn!(took_ms = took.as_millis() as u64, "Search exceeded its timeout");
        }
        Ok(SearchResponse {
            total,
            took,
            hits,
            buckets,
        })
    }
}
