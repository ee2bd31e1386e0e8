// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Primary store access for reindexing.

pub mod memory;
pub mod traits;

pub use memory::MemoryPrimaryStore;
pub use traits::{PageFn, PrimaryStore, StorageError};
