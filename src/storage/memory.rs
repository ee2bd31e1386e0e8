// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::traits::{PageFn, PrimaryStore, StorageError};
use crate::entity::{AnyEntity, Searchable};

/// In-memory primary store keyed by document type name.
///
/// Records keep insertion order; re-inserting an id replaces it in place.
#[derive(Default)]
pub struct MemoryPrimaryStore {
    records: RwLock<HashMap<String, Vec<Arc<dyn AnyEntity>>>>,
    failing: RwLock<HashSet<String>>,
}

impl MemoryPrimaryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Searchable>(&self, entity: T) {
        let type_name = T::schema().document_type_name();
        let id = entity.search_id();
        let mut records = self.records.write();
        let list = records.entry(type_name).or_default();
        let entity: Arc<dyn AnyEntity> = Arc::new(entity);
        match list.iter().position(|e| e.entity_id() == id) {
            Some(pos) => list[pos] = entity,
            None => list.push(entity),
        }
    }

    pub fn extend<T: Searchable>(&self, entities: impl IntoIterator<Item = T>) {
        for entity in entities {
            self.insert(entity);
        }
    }

    /// Returns whether a record was removed.
    pub fn remove<T: Searchable>(&self, id: &str) -> bool {
        let type_name = T::schema().document_type_name();
        let mut records = self.records.write();
        let Some(list) = records.get_mut(&type_name) else {
            return false;
        };
        let before = list.len();
        list.retain(|e| e.entity_id() != id);
        list.len() != before
    }

    #[must_use]
    pub fn count(&self, type_name: &str) -> usize {
        self.records.read().get(type_name).map_or(0, Vec::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().values().all(Vec::is_empty)
    }

    /// Make iteration of `type_name` fail until [`restore_type`](Self::restore_type).
    pub fn fail_type(&self, type_name: impl Into<String>) {
        self.failing.write().insert(type_name.into());
    }

    pub fn restore_type(&self, type_name: &str) {
        self.failing.write().remove(type_name);
    }
}

#[async_trait]
impl PrimaryStore for MemoryPrimaryStore {
    async fn iterate(&self, type_name: &str, page_size: usize, on_page: &mut PageFn<'_>) -> Result<usize, StorageError> {
        if self.failing.read().contains(type_name) {
            return Err(StorageError::Backend(format!("iteration of '{}' failed", type_name)));
        }
        // Snapshot so callbacks run without the lock
        let snapshot: Vec<Arc<dyn AnyEntity>> = self.records.read().get(type_name).cloned().unwrap_or_default();
        for page in snapshot.chunks(page_size.max(1)) {
            on_page(page);
        }
        Ok(snapshot.len())
    }
}
