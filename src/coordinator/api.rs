// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Entity-facing API: index, delete, search and term counts.
//!
//! - `index()` / `delete()` - single-document writes
//! - `search()` - typed, paged search
//! - `search_entities()` / `search_with()` - mixed-type search with a limit
//! - `count_terms_by_field()` - term frequencies over matching documents
//! - `index_all()` - bulk reindex one type from the primary store

use tracing::{debug, warn};

use super::types::ReindexReport;
use super::SearchService;
use crate::cluster::{SearchHit, SearchRequest, SearchResponse, TermsAggregation, WriteResult};
use crate::entity::{DecodedEntity, Searchable};
use crate::error::SearchError;
use crate::metrics::LatencyTimer;
use crate::search::{ResultPage, SearchCriteria};

/// Buckets returned by [`SearchService::count_terms_by_field`].
pub const DEFAULT_TERMS_SIZE: usize = 10;

impl SearchService {
    // ═══════════════════════════════════════════════════════════════════════════
    // API: Writes
    // ═══════════════════════════════════════════════════════════════════════════

    /// Index (create or replace) one entity under its id.
    ///
    /// # Errors
    ///
    /// [`SearchError::UnknownType`] for an unregistered type,
    /// [`SearchError::Encode`] if the entity does not serialize to an object.
    pub async fn index<T: Searchable>(&self, entity: &T) -> Result<WriteResult, SearchError> {
        let registered = self.registered::<T>()?;
        let _timer = LatencyTimer::new("index");

        let document = self
            .codec
            .encode(entity)
            .ok_or_else(|| SearchError::Encode(registered.type_name().to_string()))?;
        let id = entity.search_id();
        let index = registered.index_name();

        let result = self
            .cluster
            .index_document(index, registered.type_name(), &id, &document)
            .await;
        crate::metrics::record_operation("index", index, result.is_ok());
        let written = result?;
        debug!(index = %index, id = %id, outcome = ?written.outcome, "Indexed document");
        Ok(written)
    }

    /// Remove one entity's document. A missing document is reported, not an error.
    pub async fn delete<T: Searchable>(&self, entity: &T) -> Result<WriteResult, SearchError> {
        let registered = self.registered::<T>()?;
        let _timer = LatencyTimer::new("delete");

        let id = entity.search_id();
        let index = registered.index_name();
        let result = self
            .cluster
            .delete_document(index, registered.type_name(), &id)
            .await;
        crate::metrics::record_operation("delete", index, result.is_ok());
        let written = result?;
        debug!(index = %index, id = %id, outcome = ?written.outcome, "Deleted document");
        Ok(written)
    }

    /// Reindex every record of one type from the primary store.
    pub async fn index_all(&self, type_name: &str) -> Result<ReindexReport, SearchError> {
        self.reindexer.reindex(type_name).await
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // API: Search
    // ═══════════════════════════════════════════════════════════════════════════

    /// Typed search; criteria without types search `T`'s index.
    ///
    /// Hits that do not decode into `T` are logged and left out of the page,
    /// while `total_results` still counts them.
    pub async fn search<T: Searchable>(&self, criteria: &SearchCriteria) -> Result<ResultPage<T>, SearchError> {
        let registered = self.registered::<T>()?;
        let request = if criteria.type_names().is_empty() {
            self.translator
                .build(&criteria.clone().with_type(registered.type_name()))?
        } else {
            self.translator.build(criteria)?
        };

        let response = self.execute(&request).await?;
        let result = response
            .hits
            .into_iter()
            .filter_map(|hit| {
                let SearchHit { doc_type, id, source, .. } = hit;
                self.codec
                    .decode_as::<T>(&doc_type, &id, source)
                    .map_err(|e| self.skip_undecodable(&doc_type, &e))
                    .ok()
            })
            .collect();

        Ok(ResultPage {
            page: criteria.page(),
            total_results: response.total,
            took: response.took,
            result,
        })
    }

    /// Search any registered types and decode hits by their type tag.
    /// Criteria naming no types search every registered index.
    ///
    /// `limit` caps the hit count; `None`, zero, or anything above the max
    /// page size falls back to the max page size. Paging on the criteria is
    /// ignored here.
    pub async fn search_entities(
        &self,
        criteria: &SearchCriteria,
        limit: Option<usize>,
    ) -> Result<Vec<DecodedEntity>, SearchError> {
        self.search_with(criteria, limit, Some).await
    }

    /// Like [`search_entities`](Self::search_entities), mapping each decoded
    /// entity; `None` from the mapper drops it.
    pub async fn search_with<U, F>(
        &self,
        criteria: &SearchCriteria,
        limit: Option<usize>,
        mut mapper: F,
    ) -> Result<Vec<U>, SearchError>
    where
        F: FnMut(DecodedEntity) -> Option<U>,
    {
        let mut request = self.translator.build(criteria)?;
        let max = self.translator.max_page_size();
        request.from = 0;
        request.size = match limit {
            Some(limit) if limit > 0 && limit < max => limit,
            _ => max,
        };

        let response = self.execute(&request).await?;
        let mut results = Vec::with_capacity(response.hits.len());
        for SearchHit { doc_type, id, source, .. } in response.hits {
            match self.codec.decode(&doc_type, &id, source) {
                Ok(entity) => results.extend(mapper(entity)),
                Err(e) => self.skip_undecodable(&doc_type, &e),
            }
        }
        Ok(results)
    }

    /// Most frequent values of `field` among matching documents, by count
    /// descending then value ascending.
    pub async fn count_terms_by_field(
        &self,
        criteria: &SearchCriteria,
        field: &str,
    ) -> Result<Vec<(String, u64)>, SearchError> {
        self.count_terms_by_field_sized(criteria, field, DEFAULT_TERMS_SIZE).await
    }

    /// [`count_terms_by_field`](Self::count_terms_by_field) with an explicit bucket count.
    pub async fn count_terms_by_field_sized(
        &self,
        criteria: &SearchCriteria,
        field: &str,
        size: usize,
    ) -> Result<Vec<(String, u64)>, SearchError> {
        if field.trim().is_empty() {
            return Err(SearchError::InvalidArgument("terms field is blank".into()));
        }
        let mut request = self.translator.build(criteria)?;
        request.from = 0;
        request.size = 0;
        request.aggregation = Some(TermsAggregation {
            name: field.to_string(),
            field: field.to_string(),
            size,
        });

        let response = self.execute(&request).await?;
        Ok(response
            .buckets
            .into_iter()
            .map(|b| (b.key, b.doc_count))
            .collect())
    }

    async fn execute(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        let _timer = LatencyTimer::new("search");
        match self.cluster.search(request).await {
            Ok(response) => {
                crate::metrics::record_search(true, response.hits.len());
                debug!(
                    indices = ?request.indices,
                    total = response.total,
                    hits = response.hits.len(),
                    took_ms = response.took.as_millis() as u64,
                    "Search executed"
                );
                Ok(response)
            }
            Err(e) => {
                crate::metrics::record_search(false, 0);
                warn!(indices = ?request.indices, error = %e, "Search failed");
                Err(e.into())
            }
        }
    }

    fn skip_undecodable(&self, doc_type: &str, err: &SearchError) {
        crate::metrics::record_decode_failure(doc_type);
        warn!(doc_type = %doc_type, error = %err, "Skipping undecodable hit");
    }
}
