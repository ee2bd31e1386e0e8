// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bulk reindex from the primary store.
//!
//! ```text
//! PrimaryStore::iterate(type, batch_size)
//!     │ page of records
//!     ▼
//! encode each (skip None) → BulkRequest → spawn on JoinSet ─┐
//!                                                           ▼
//!                                  BatchListener logs manifests / transport errors
//! ```
//!
//! Batches run concurrently and a failing batch never stops the next one.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::types::ReindexReport;
use crate::catalog::Catalog;
use crate::cluster::{BulkRequest, BulkResponse, ClusterError, SearchCluster};
use crate::codec::DocumentCodec;
use crate::entity::AnyEntity;
use crate::error::SearchError;
use crate::storage::PrimaryStore;

/// Logs batch outcomes for one type.
#[derive(Debug, Clone)]
struct BatchListener {
    type_name: String,
    index: String,
}

impl BatchListener {
    /// Returns the number of failed items.
    fn on_response(&self, response: &BulkResponse) -> usize {
        crate::metrics::record_bulk_batch(&self.index, response.items, response.failures.len());
        if response.has_failures() {
            error!(
                type_name = %self.type_name,
                index = %self.index,
                failed = response.failures.len(),
                items = response.items,
                "Bulk batch partially failed:\n{}",
                response.failure_message()
            );
        } else {
            debug!(index = %self.index, items = response.items, took_ms = response.took.as_millis() as u64, "Bulk batch indexed");
        }
        response.failures.len()
    }

    fn on_failure(&self, items: usize, err: &str) {
        crate::metrics::record_bulk_transport_failure(&self.index);
        error!(type_name = %self.type_name, index = %self.index, items, error = %err, "Bulk batch failed");
    }
}

type BatchResult = (usize, Result<BulkResponse, ClusterError>);

pub struct BulkReindexer {
    catalog: Arc<Catalog>,
    codec: DocumentCodec,
    cluster: Arc<dyn SearchCluster>,
    store: Arc<dyn PrimaryStore>,
    batch_size: usize,
}

impl BulkReindexer {
    pub fn new(
        catalog: Arc<Catalog>,
        cluster: Arc<dyn SearchCluster>,
        store: Arc<dyn PrimaryStore>,
        batch_size: usize,
    ) -> Self {
        Self {
            codec: DocumentCodec::new(Arc::clone(&catalog)),
            catalog,
            cluster,
            store,
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Push every record of `type_name` into its index.
    ///
    /// Batch failures are logged and counted in the report; only an unknown
    /// type or a failing primary store is an error.
    #[tracing::instrument(skip(self), fields(batch_size = self.batch_size))]
    pub async fn reindex(&self, type_name: &str) -> Result<ReindexReport, SearchError> {
        let registered = self
            .catalog
            .entity_type_for(type_name)
            .ok_or_else(|| SearchError::UnknownType(type_name.to_string()))?;
        let index = registered.index_name().to_string();
        let listener = BatchListener {
            type_name: type_name.to_string(),
            index: index.clone(),
        };

        let mut report = ReindexReport::new(type_name);
        let mut tasks: JoinSet<BatchResult> = JoinSet::new();

        let iterated = {
            let codec = &self.codec;
            let cluster = &self.cluster;
            let report = &mut report;
            let tasks = &mut tasks;
            let mut on_page = |page: &[Arc<dyn AnyEntity>]| {
                report.records += page.len();
                let mut request = BulkRequest::new(index.clone());
                for record in page {
                    match codec.encode_any(record.as_ref()) {
                        Some(document) => request.upsert(record.entity_id(), type_name, document),
                        None => report.skipped += 1,
                    }
                }
                if request.is_empty() {
                    return;
                }
                report.batches += 1;
                let cluster = Arc::clone(cluster);
                tasks.spawn(async move {
                    let items = request.len();
                    (items, cluster.bulk(request).await)
                });
            };
            self.store.iterate(type_name, self.batch_size, &mut on_page).await
        };

        // Let submitted batches finish even if iteration broke off
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(response))) => report.failed_items += listener.on_response(&response),
                Ok((items, Err(e))) => {
                    report.failed_batches += 1;
                    listener.on_failure(items, &e.to_string());
                }
                Err(e) => {
                    report.failed_batches += 1;
                    listener.on_failure(0, &e.to_string());
                }
            }
        }

        crate::metrics::record_skipped_records(type_name, report.skipped);
        match iterated {
            Ok(_) => {
                if report.skipped > 0 {
                    warn!(type_name = %type_name, skipped = report.skipped, "Records skipped during reindex");
                }
                info!(
                    type_name = %type_name,
                    index = %index,
                    records = report.records,
                    batches = report.batches,
                    failed_items = report.failed_items,
                    failed_batches = report.failed_batches,
                    "Indexed {} records for {}",
                    report.records,
                    type_name
                );
                Ok(report)
            }
            Err(e) => {
                error!(type_name = %type_name, records = report.records, error = %e, "Primary store iteration failed");
                Err(e.into())
            }
        }
    }
}
