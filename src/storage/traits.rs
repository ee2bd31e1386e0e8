// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::entity::AnyEntity;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("Unknown entity type '{0}'")]
    UnknownType(String),
    #[error("Primary store backend error: {0}")]
    Backend(String),
}

/// Callback receiving one page of records.
pub type PageFn<'a> = dyn FnMut(&[Arc<dyn AnyEntity>]) + Send + 'a;

/// The system of record that search indices are rebuilt from.
#[async_trait]
pub trait PrimaryStore: Send + Sync {
    /// Walk every record of `type_name` in pages of at most `page_size`,
    /// handing each page to `on_page`. Returns the number of records visited.
    ///
    /// A type with no records is not an error.
    async fn iterate(&self, type_name: &str, page_size: usize, on_page: &mut PageFn<'_>) -> Result<usize, StorageError>;
}
