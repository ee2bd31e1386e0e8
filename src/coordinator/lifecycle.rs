// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Index lifecycle: startup, per-type ensure and cluster-wide rebuild.

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::types::{IndexState, InitReport, RebuildOutcome, RebuildReport};
use super::SearchService;
use crate::cluster::ClusterError;
use crate::coordination::LockService;
use crate::error::SearchError;
use crate::metrics::LatencyTimer;

/// What [`SearchService::start`] did.
#[derive(Debug)]
pub struct Startup {
    pub init: InitReport,
    /// Background rebuild, spawned when index storage is ephemeral
    pub rebuild: Option<JoinHandle<Result<RebuildOutcome, SearchError>>>,
}

/// Holds the rebuild lock until released.
///
/// Call [`release`](Self::release) on the normal path; if the guard is dropped
/// instead (panic, cancelled future) an unlock is spawned on the current runtime.
struct RebuildGuard {
    locks: Arc<dyn LockService>,
    name: String,
    released: bool,
}

impl RebuildGuard {
    async fn release(mut self) {
        self.released = true;
        if let Err(e) = self.locks.unlock(&self.name).await {
            warn!(lock = %self.name, error = %e, "Failed to release rebuild lock");
        }
    }
}

impl Drop for RebuildGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let locks = Arc::clone(&self.locks);
        let name = std::mem::take(&mut self.name);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = locks.unlock(&name).await {
                        warn!(lock = %name, error = %e, "Failed to release abandoned rebuild lock");
                    }
                });
            }
            Err(_) => warn!(lock = %name, "No runtime to release abandoned rebuild lock"),
        }
    }
}

impl SearchService {
    /// Ensure every index, then kick off a background rebuild if index
    /// storage does not survive restarts. Never blocks on the rebuild.
    pub async fn start(self: &Arc<Self>) -> Startup {
        let init = self.initialize().await;

        let rebuild = if self.is_ephemeral() {
            info!("Ephemeral index storage, rebuilding in background");
            let service = Arc::clone(self);
            Some(tokio::spawn(async move { service.rebuild().await }))
        } else {
            None
        };

        Startup { init, rebuild }
    }

    /// Run [`ensure`](Self::ensure) for every registered type.
    ///
    /// A failing type is logged and reported; the others still get their index.
    pub async fn initialize(&self) -> InitReport {
        let mut report = InitReport::default();
        for type_name in self.catalog.type_names() {
            match self.ensure(&type_name).await {
                Ok(()) => report.ready.push(type_name),
                Err(e) => {
                    error!(type_name = %type_name, error = %e, "Failed to initialize index");
                    report.failed.push((type_name, e.to_string()));
                }
            }
        }
        info!(
            ready = report.ready.len(),
            failed = report.failed.len(),
            "Search indices initialized"
        );
        report
    }

    /// Make sure the type's index exists and carries the current mapping.
    ///
    /// A no-op once the type is `Mapped`. An index created concurrently by
    /// another process counts as success.
    pub async fn ensure(&self, type_name: &str) -> Result<(), SearchError> {
        let registered = self.registered_type(type_name)?;
        if self.index_state(type_name) == IndexState::Mapped {
            return Ok(());
        }

        let _timer = LatencyTimer::new("ensure");
        let index = registered.index_name();

        let result = async {
            if !self.cluster.index_exists(index).await? {
                match self.cluster.create_index(index).await {
                    Ok(()) => info!(index = %index, "Created index"),
                    Err(ClusterError::IndexAlreadyExists(_)) => {
                        debug!(index = %index, "Index created concurrently")
                    }
                    Err(e) => return Err(e),
                }
            }
            self.states.insert(type_name.to_string(), IndexState::Created);

            self.cluster
                .put_mapping(index, registered.type_name(), registered.mapping())
                .await?;
            self.states.insert(type_name.to_string(), IndexState::Mapped);
            debug!(index = %index, type_name = %type_name, "Mapping applied");
            Ok::<(), ClusterError>(())
        }
        .await;

        crate::metrics::record_operation("ensure", index, result.is_ok());
        result.map_err(SearchError::from)
    }

    /// Drop, recreate and repopulate every index from the primary store.
    ///
    /// Only one rebuild runs across all processes sharing the lock service; a
    /// contender returns [`RebuildOutcome::AlreadyRunning`] at once. Per-type
    /// failures are logged and collected in the report, never aborting the rest.
    #[tracing::instrument(skip(self), fields(lock = %self.config.rebuild_lock_name))]
    pub async fn rebuild(&self) -> Result<RebuildOutcome, SearchError> {
        let name = self.config.rebuild_lock_name.clone();
        if !self.locks.try_lock(&name).await? {
            info!(lock = %name, "Rebuild already running elsewhere, skipping");
            crate::metrics::record_rebuild("skipped", std::time::Duration::ZERO);
            return Ok(RebuildOutcome::AlreadyRunning);
        }
        let guard = RebuildGuard {
            locks: Arc::clone(&self.locks),
            name,
            released: false,
        };

        let report = self.rebuild_locked().await;
        guard.release().await;

        let outcome = if report.is_complete() { "completed" } else { "partial" };
        crate::metrics::record_rebuild(outcome, report.took);
        info!(
            dropped = report.dropped.len(),
            types = report.reindexed.len(),
            records = report.total_records(),
            failures = report.failures.len(),
            took_ms = report.took.as_millis() as u64,
            "Rebuild completed"
        );
        Ok(RebuildOutcome::Completed(report))
    }

    async fn rebuild_locked(&self) -> RebuildReport {
        let start = Instant::now();
        let mut report = RebuildReport::default();
        let types: Vec<(String, String)> = self
            .catalog
            .iter()
            .map(|t| (t.type_name().to_string(), t.index_name().to_string()))
            .collect();

        for (type_name, index) in &types {
            self.states.insert(type_name.clone(), IndexState::Absent);
            match self.drop_if_exists(index).await {
                Ok(true) => report.dropped.push(index.clone()),
                Ok(false) => {}
                Err(e) => {
                    error!(index = %index, error = %e, "Failed to drop index");
                    report.failures.push((type_name.clone(), e.to_string()));
                }
            }
        }

        for (type_name, _) in &types {
            if let Err(e) = self.ensure(type_name).await {
                error!(type_name = %type_name, error = %e, "Failed to recreate index");
                report.failures.push((type_name.clone(), e.to_string()));
            }
        }

        for (type_name, _) in &types {
            match self.reindexer.reindex(type_name).await {
                Ok(reindexed) => report.reindexed.push(reindexed),
                Err(e) => {
                    error!(type_name = %type_name, error = %e, "Failed to reindex");
                    report.failures.push((type_name.clone(), e.to_string()));
                }
            }
        }

        report.took = start.elapsed();
        report
    }

    /// Returns whether an index was dropped.
    async fn drop_if_exists(&self, index: &str) -> Result<bool, ClusterError> {
        if !self.cluster.index_exists(index).await? {
            return Ok(false);
        }
        match self.cluster.delete_index(index).await {
            Ok(()) => {
                info!(index = %index, "Dropped index");
                Ok(true)
            }
            Err(ClusterError::IndexNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogBuilder;
    use crate::cluster::{MemoryCluster, SearchCluster};
    use crate::coordination::LocalLockService;
    use crate::config::SearchConfig;
    use crate::schema::{EntitySchema, PropertyType};
    use crate::storage::MemoryPrimaryStore;
    use crate::Searchable;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Article {
        id: u32,
        title: String,
    }

    impl Searchable for Article {
        fn schema() -> EntitySchema {
            EntitySchema::new("Article").id("id", PropertyType::int()).text("title")
        }

        fn search_id(&self) -> String {
            self.id.to_string()
        }
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Comment {
        id: u32,
        body: String,
    }

    impl Searchable for Comment {
        fn schema() -> EntitySchema {
            EntitySchema::new("Comment").id("id", PropertyType::int()).text("body")
        }

        fn search_id(&self) -> String {
            self.id.to_string()
        }
    }

    struct Fixture {
        service: Arc<SearchService>,
        cluster: Arc<MemoryCluster>,
        store: Arc<MemoryPrimaryStore>,
        locks: Arc<LocalLockService>,
    }

    fn fixture(cluster: MemoryCluster) -> Fixture {
        let catalog = CatalogBuilder::new()
            .register::<Article>()
            .unwrap()
            .register::<Comment>()
            .unwrap()
            .build();
        let cluster = Arc::new(cluster);
        let store = Arc::new(MemoryPrimaryStore::new());
        let locks = Arc::new(LocalLockService::new());
        let service = Arc::new(SearchService::new(
            SearchConfig::default(),
            Arc::new(catalog),
            cluster.clone(),
            store.clone(),
            locks.clone(),
        ));
        Fixture { service, cluster, store, locks }
    }

    #[tokio::test]
    async fn test_ensure_creates_and_maps_once() {
        let f = fixture(MemoryCluster::new().persistent());
        assert_eq!(f.service.index_state("article"), IndexState::Absent);

        f.service.ensure("article").await.unwrap();
        f.service.ensure("article").await.unwrap();

        assert_eq!(f.service.index_state("article"), IndexState::Mapped);
        assert_eq!(f.cluster.index_creations(), 1);
        assert!(f.cluster.mapping("index_article").is_some());
    }

    #[tokio::test]
    async fn test_ensure_existing_index_only_maps() {
        let f = fixture(MemoryCluster::new().persistent());
        f.cluster.create_index("index_article").await.unwrap();

        f.service.ensure("article").await.unwrap();
        assert_eq!(f.cluster.index_creations(), 1);
        assert_eq!(f.service.index_state("article"), IndexState::Mapped);
    }

    #[tokio::test]
    async fn test_ensure_unknown_type() {
        let f = fixture(MemoryCluster::new());
        assert!(matches!(f.service.ensure("tag").await, Err(SearchError::UnknownType(_))));
    }

    #[tokio::test]
    async fn test_initialize_continues_past_failures() {
        let f = fixture(MemoryCluster::new().persistent());
        f.cluster.fail_index("index_article");

        let report = f.service.initialize().await;
        assert_eq!(report.ready, vec!["comment"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "article");
        assert_eq!(f.service.index_state("article"), IndexState::Absent);
    }

    #[tokio::test]
    async fn test_rebuild_drops_and_repopulates() {
        let f = fixture(MemoryCluster::new().persistent());
        f.service.initialize().await;
        f.store.insert(Article { id: 1, title: "fresh".into() });
        f.store.insert(Comment { id: 7, body: "hi".into() });
        // Stale document that no longer exists in the store
        let stale = crate::codec::Document::from(serde_json::Map::new());
        f.cluster.index_document("index_article", "article", "99", &stale).await.unwrap();

        let outcome = f.service.rebuild().await.unwrap();
        let report = outcome.report().unwrap();

        assert_eq!(report.dropped, vec!["index_article", "index_comment"]);
        assert_eq!(report.total_records(), 2);
        assert!(report.is_complete());
        assert_eq!(f.cluster.document_count("index_article"), Some(1));
        assert!(f.cluster.document("index_article", "99").is_none());
        assert_eq!(f.service.index_state("comment"), IndexState::Mapped);
        assert!(!f.locks.is_locked(&f.service.config().rebuild_lock_name));
    }

    #[tokio::test]
    async fn test_rebuild_when_lock_held() {
        let f = fixture(MemoryCluster::new());
        let name = f.service.config().rebuild_lock_name.clone();
        assert!(f.locks.try_lock(&name).await.unwrap());

        let outcome = f.service.rebuild().await.unwrap();
        assert_eq!(outcome, RebuildOutcome::AlreadyRunning);
        assert_eq!(f.cluster.index_creations(), 0);
        // Still held by the other holder
        assert!(f.locks.is_locked(&name));
    }

    #[tokio::test]
    async fn test_rebuild_records_failures_and_continues() {
        let f = fixture(MemoryCluster::new().persistent());
        f.store.insert(Comment { id: 1, body: "ok".into() });
        f.store.fail_type("article");

        let outcome = f.service.rebuild().await.unwrap();
        let report = outcome.report().unwrap();
        assert!(!report.is_complete());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "article");
        assert_eq!(f.cluster.document_count("index_comment"), Some(1));
    }

    #[tokio::test]
    async fn test_start_rebuilds_ephemeral_storage() {
        let f = fixture(MemoryCluster::new());
        f.store.insert(Article { id: 1, title: "a".into() });

        let startup = f.service.start().await;
        assert!(startup.init.is_complete());
        let outcome = startup.rebuild.expect("rebuild spawned").await.unwrap().unwrap();
        assert_eq!(outcome.report().unwrap().total_records(), 1);
        assert_eq!(f.cluster.document_count("index_article"), Some(1));
    }

    #[tokio::test]
    async fn test_start_persistent_skips_rebuild() {
        let f = fixture(MemoryCluster::new().persistent());
        let startup = f.service.start().await;
        assert!(startup.rebuild.is_none());
        assert_eq!(startup.init.ready.len(), 2);
    }

    #[tokio::test]
    async fn test_abandoned_guard_releases_lock() {
        let locks = Arc::new(LocalLockService::new());
        assert!(locks.try_lock("rebuild").await.unwrap());
        drop(RebuildGuard {
            locks: locks.clone(),
            name: "rebuild".into(),
            released: false,
        });

        for _ in 0..10 {
            if !locks.is_locked("rebuild") {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(!locks.is_locked("rebuild"));
    }
}
