// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Search cluster backends.
//!
//! ```text
//! SearchCluster (trait)
//!     ├─→ MemoryCluster   in-process, ephemeral
//!     └─→ RedisCluster    Redis Stack (RedisJSON + RediSearch), persistent
//! ```

mod memory;
mod redis;
pub mod redisearch;
mod traits;

pub use self::memory::MemoryCluster;
pub use self::redis::{RedisCluster, MAX_RESULT_WINDOW};
pub use self::redisearch::{RediSearchTranslator, SearchField, SearchFieldType, SearchIndex};
pub use self::traits::{
    BulkItemFailure, BulkOperation, BulkRequest, BulkResponse, ClusterError, SearchCluster, SearchHit,
    SearchRequest, SearchResponse, SortSpec, StorageMode, TermsAggregation, TermsBucket, WriteOutcome,
    WriteResult,
};
