// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Entity Search
//!
//! Full-text search over application entities, backed by a search cluster.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Searchable entities                     │
//! │  • EntitySchema describes ids, properties and components    │
//! │  • Catalog registers types, derives mappings (fail fast)    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       SearchService                         │
//! │  • index() / delete() single documents                      │
//! │  • search() / search_entities() / count_terms_by_field()    │
//! │  • ensure() per type, rebuild() under a cluster-wide lock   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!              (DocumentCodec, QueryTranslator, BulkReindexer)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       SearchCluster                         │
//! │  • RedisCluster: Redis Stack (RediSearch + RedisJSON)       │
//! │  • MemoryCluster: in-process, ephemeral                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The primary store stays the source of truth: [`SearchService::rebuild`]
//! drops every index and repopulates it through [`PrimaryStore::iterate`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use entity_search::{
//!     CatalogBuilder, EntitySchema, LocalLockService, MemoryCluster, MemoryPrimaryStore, PropertyType,
//!     SearchConfig, SearchCriteria, SearchService, Searchable,
//! };
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Default, Serialize, Deserialize)]
//! struct Article {
//!     id: u64,
//!     title: String,
//! }
//!
//! impl Searchable for Article {
//!     fn schema() -> EntitySchema {
//!         EntitySchema::new("Article").id("id", PropertyType::long()).text("title")
//!     }
//!
//!     fn search_id(&self) -> String {
//!         self.id.to_string()
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SearchConfig::default();
//!     let catalog = CatalogBuilder::with_mapper(config.schema_mapper())
//!         .register::<Article>()?
//!         .build();
//!     let service = Arc::new(SearchService::new(
//!         config,
//!         Arc::new(catalog),
//!         Arc::new(MemoryCluster::new()),
//!         Arc::new(MemoryPrimaryStore::new()),
//!         Arc::new(LocalLockService::new()),
//!     ));
//!     service.start().await;
//!
//!     service.index(&Article { id: 1, title: "Hello search".into() }).await?;
//!     let page = service
//!         .search::<Article>(&SearchCriteria::query_string_for(["article"], "hello"))
//!         .await?;
//!     println!("{} hits", page.total_results);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`schema`]: entity schemas, searchable markers and mapping derivation
//! - [`catalog`]: registry of searchable types
//! - [`codec`]: entity ↔ document conversion
//! - [`search`]: criteria, query model and translation
//! - [`cluster`]: search cluster trait and adapters
//! - [`coordinator`]: the [`SearchService`] and index lifecycle
//! - [`coordination`]: rebuild lock services
//! - [`storage`]: primary store trait
//! - [`resilience`]: retry policies

pub mod catalog;
pub mod cluster;
pub mod codec;
pub mod config;
pub mod coordination;
pub mod coordinator;
pub mod entity;
pub mod error;
pub mod metrics;
pub mod resilience;
pub mod schema;
pub mod search;
pub mod storage;

pub use catalog::{index_name_for, Catalog, CatalogBuilder, RegisteredType};
pub use cluster::{
    ClusterError, MemoryCluster, RedisCluster, SearchCluster, StorageMode, WriteOutcome, WriteResult,
};
pub use codec::{Document, DocumentCodec};
pub use config::SearchConfig;
pub use coordination::{LocalLockService, LockError, LockService, RedisLockService};
pub use coordinator::{
    IndexState, InitReport, RebuildOutcome, RebuildReport, ReindexReport, SearchService, Startup,
};
pub use entity::{AnyEntity, DecodedEntity, Searchable};
pub use error::SearchError;
pub use metrics::LatencyTimer;
pub use resilience::RetryConfig;
pub use schema::{EntitySchema, PropertyDef, PropertyType, SchemaError, SearchableProperty};
pub use search::{Page, Query, ResultPage, SearchCriteria};
pub use storage::{MemoryPrimaryStore, PrimaryStore, StorageError};
