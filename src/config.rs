// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the search service.
//!
//! # Example
//!
//! ```
//! use entity_search::SearchConfig;
//!
//! // Minimal config (uses defaults)
//! let config = SearchConfig::default();
//! assert_eq!(config.reindex_batch_size, 20);
//! assert_eq!(config.max_page_size, 10_000);
//!
//! // Local cluster that must be rebuilt at startup
//! let config = SearchConfig {
//!     ephemeral_storage: true,
//!     reindex_batch_size: 200,
//!     ..Default::default()
//! };
//! assert!(config.ephemeral_storage);
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::schema::{SchemaMapper, DEFAULT_TEXT_ANALYZER};

/// Lock name guarding rebuild across processes.
pub const REBUILD_LOCK_NAME: &str = "entity_search.rebuild";

/// Configuration for the search service.
///
/// All fields have defaults; `redis_url` is only read by the Redis adapters.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    /// Redis Stack connection string (e.g., "redis://localhost:6379")
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Key prefix for everything written to Redis
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Index data does not survive restarts; rebuild at startup
    #[serde(default)]
    pub ephemeral_storage: bool,

    /// Analyzer for text fields without an explicit one
    #[serde(default = "default_analyzer")]
    pub default_analyzer: String,

    /// Records per bulk request during reindex
    #[serde(default = "default_reindex_batch_size")]
    pub reindex_batch_size: usize,

    /// Result ceiling for unpaged searches
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,

    /// Per-search timeout sent to the cluster; defaults to 10s
    #[serde(default = "default_search_timeout_ms")]
    pub search_timeout_ms: u64,

    #[serde(default = "default_rebuild_lock_name")]
    pub rebuild_lock_name: String,

    /// Expiry of the Redis rebuild lock. A live holder keeps renewing it, so
    /// this only bounds how long a crashed holder blocks others.
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,
}

fn default_key_prefix() -> String { "es:".to_string() }
fn default_analyzer() -> String { DEFAULT_TEXT_ANALYZER.to_string() }
fn default_reindex_batch_size() -> usize { 20 }
fn default_max_page_size() -> usize { 10_000 }
fn default_search_timeout_ms() -> u64 { 10_000 }
fn default_rebuild_lock_name() -> String { REBUILD_LOCK_NAME.to_string() }
fn default_lock_ttl_secs() -> u64 { 3600 }

impl SearchConfig {
    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    /// Mapper analyzing text fields with `default_analyzer`.
    pub fn schema_mapper(&self) -> SchemaMapper {
        SchemaMapper::new(self.default_analyzer.clone())
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            key_prefix: default_key_prefix(),
            ephemeral_storage: false,
            default_analyzer: default_analyzer(),
            reindex_batch_size: default_reindex_batch_size(),
            max_page_size: default_max_page_size(),
            search_timeout_ms: default_search_timeout_ms(),
            rebuild_lock_name: default_rebuild_lock_name(),
            lock_ttl_secs: default_lock_ttl_secs(),
        }
    }
}
