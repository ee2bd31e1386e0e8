// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Search service coordinator.
//!
//! The [`SearchService`] ties the components together:
//! - the immutable [`Catalog`] of searchable types
//! - the [`DocumentCodec`] turning entities into documents and back
//! - a [`SearchCluster`] holding one index per type
//! - a [`PrimaryStore`] to rebuild indices from
//! - a [`LockService`] making rebuild a cluster-wide singleton
//!
//! # Lifecycle
//!
//! ```text
//! start() → initialize(): ensure every type (exists? → create → put mapping)
//!         → ephemeral storage? spawn rebuild() in the background
//!
//! rebuild(): try_lock → drop indices → ensure all → reindex all → unlock
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use entity_search::{
//!     CatalogBuilder, LocalLockService, MemoryCluster, MemoryPrimaryStore, SearchConfig, SearchService,
//! };
//! # use entity_search::{EntitySchema, PropertyType, Searchable};
//! # #[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
//! # struct Article { id: u64 }
//! # impl Searchable for Article {
//! #     fn schema() -> EntitySchema { EntitySchema::new("Article").id("id", PropertyType::long()) }
//! #     fn search_id(&self) -> String { self.id.to_string() }
//! # }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SearchConfig::default();
//! let catalog = CatalogBuilder::with_mapper(config.schema_mapper())
//!     .register::<Article>()?
//!     .build();
//!
//! let service = Arc::new(SearchService::new(
//!     config,
//!     Arc::new(catalog),
//!     Arc::new(MemoryCluster::new()),
//!     Arc::new(MemoryPrimaryStore::new()),
//!     Arc::new(LocalLockService::new()),
//! ));
//! let startup = service.start().await;
//! assert!(startup.init.is_complete());
//! # Ok(())
//! # }
//! ```

mod api;
mod lifecycle;
mod reindex;
mod types;

pub use api::DEFAULT_TERMS_SIZE;
pub use lifecycle::Startup;
pub use reindex::BulkReindexer;
pub use types::{IndexState, InitReport, RebuildOutcome, RebuildReport, ReindexReport};

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::info;

use crate::catalog::{Catalog, RegisteredType};
use crate::cluster::{RedisCluster, SearchCluster, StorageMode};
use crate::codec::DocumentCodec;
use crate::config::SearchConfig;
use crate::coordination::{LockService, RedisLockService};
use crate::entity::Searchable;
use crate::error::SearchError;
use crate::search::QueryTranslator;
use crate::storage::PrimaryStore;

/// Entry point for indexing and searching entities.
///
/// # Thread Safety
///
/// `Send + Sync`; share it behind an `Arc`. Index state lives in a `DashMap`
/// and the catalog is immutable, so concurrent writers never contend on a
/// service-wide lock. Only rebuild is serialized, through the [`LockService`].
pub struct SearchService {
    pub(super) config: SearchConfig,
    pub(super) catalog: Arc<Catalog>,
    pub(super) codec: DocumentCodec,
    pub(super) cluster: Arc<dyn SearchCluster>,
    pub(super) locks: Arc<dyn LockService>,
    pub(super) translator: QueryTranslator,
    pub(super) reindexer: BulkReindexer,
    /// Document type name → index state
    pub(super) states: DashMap<String, IndexState>,
}

impl SearchService {
    pub fn new(
        config: SearchConfig,
        catalog: Arc<Catalog>,
        cluster: Arc<dyn SearchCluster>,
        store: Arc<dyn PrimaryStore>,
        locks: Arc<dyn LockService>,
    ) -> Self {
        let translator = QueryTranslator::new(Arc::clone(&catalog))
            .with_max_page_size(config.max_page_size)
            .with_timeout(config.search_timeout());
        let reindexer = BulkReindexer::new(
            Arc::clone(&catalog),
            Arc::clone(&cluster),
            store,
            config.reindex_batch_size,
        );

        Self {
            codec: DocumentCodec::new(Arc::clone(&catalog)),
            states: catalog
                .type_names()
                .into_iter()
                .map(|t| (t, IndexState::Absent))
                .collect(),
            config,
            catalog,
            cluster,
            locks,
            translator,
            reindexer,
        }
    }

    /// Service backed by Redis Stack for both indices and the rebuild lock.
    pub async fn connect_redis(
        config: SearchConfig,
        catalog: Arc<Catalog>,
        store: Arc<dyn PrimaryStore>,
    ) -> Result<Self, SearchError> {
        let url = config
            .redis_url
            .clone()
            .ok_or_else(|| SearchError::InvalidArgument("redis_url is not configured".into()))?;

        let cluster = RedisCluster::with_prefix(&url, Some(&config.key_prefix)).await?;
        let locks = RedisLockService::new(&url, &config.key_prefix, config.lock_ttl()).await?;
        info!(url = %url, prefix = %config.key_prefix, "Search service connected to Redis");

        Ok(Self::new(config, catalog, Arc::new(cluster), store, Arc::new(locks)))
    }

    #[must_use]
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    #[must_use]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    #[must_use]
    pub fn codec(&self) -> &DocumentCodec {
        &self.codec
    }

    #[must_use]
    pub fn translator(&self) -> &QueryTranslator {
        &self.translator
    }

    /// Index data is lost on restart, by configuration or by cluster kind.
    #[must_use]
    pub fn is_ephemeral(&self) -> bool {
        self.config.ephemeral_storage || self.cluster.storage_mode() == StorageMode::Ephemeral
    }

    /// What this process last observed about a type's index.
    #[must_use]
    pub fn index_state(&self, type_name: &str) -> IndexState {
        self.states.get(type_name).map(|s| *s).unwrap_or_default()
    }

    #[must_use]
    pub fn search_timeout(&self) -> Duration {
        self.config.search_timeout()
    }

    pub(super) fn registered_type(&self, type_name: &str) -> Result<&RegisteredType, SearchError> {
        self.catalog
            .entity_type_for(type_name)
            .ok_or_else(|| SearchError::UnknownType(type_name.to_string()))
    }

    pub(super) fn registered<T: Searchable>(&self) -> Result<&RegisteredType, SearchError> {
        self.catalog
            .registered::<T>()
            .ok_or_else(|| SearchError::UnknownType(std::any::type_name::<T>().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MemoryCluster;
    use crate::coordination::LocalLockService;
    use crate::search::SearchCriteria;
    use crate::storage::MemoryPrimaryStore;

    #[test]
    fn test_config_flows_into_requests() {
        let config = SearchConfig {
            search_timeout_ms: 2_500,
            max_page_size: 50,
            ..Default::default()
        };
        let service = SearchService::new(
            config,
            Arc::new(Catalog::default()),
            Arc::new(MemoryCluster::new()),
            Arc::new(MemoryPrimaryStore::new()),
            Arc::new(LocalLockService::new()),
        );

        let request = service
            .translator()
            .build(&SearchCriteria::query_string_for(["article"], "x"))
            .unwrap();
        assert_eq!(request.timeout, Duration::from_millis(2_500));
        assert_eq!(request.size, 50);
        assert_eq!(service.search_timeout(), Duration::from_millis(2_500));
        assert!(service.is_ephemeral());
    }
}
