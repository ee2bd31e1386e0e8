// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Named, non-blocking locks.
//!
//! Rebuild is guarded by a lock taken with [`LockService::try_lock`]: whoever
//! fails to get it skips the work instead of waiting. [`LocalLockService`]
//! covers a single process; [`RedisLockService`] covers every process sharing
//! the Redis instance.

mod redis;

use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

pub use self::redis::RedisLockService;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LockError {
    #[error("Lock backend unavailable: {0}")]
    Unavailable(String),
    #[error("Lock '{0}' is not held by this process")]
    NotHeld(String),
}

#[async_trait]
pub trait LockService: Send + Sync {
    /// Take the lock if free. `Ok(false)` means someone else holds it.
    async fn try_lock(&self, name: &str) -> Result<bool, LockError>;

    async fn unlock(&self, name: &str) -> Result<(), LockError>;
}

/// In-process lock set.
#[derive(Debug, Default)]
pub struct LocalLockService {
    held: Mutex<HashSet<String>>,
}

impl LocalLockService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self, name: &str) -> bool {
        self.held.lock().contains(name)
    }
}

#[async_trait]
impl LockService for LocalLockService {
    async fn try_lock(&self, name: &str) -> Result<bool, LockError> {
        Ok(self.held.lock().insert(name.to_string()))
    }

    async fn unlock(&self, name: &str) -> Result<(), LockError> {
        if self.held.lock().remove(name) {
            Ok(())
        } else {
            Err(LockError::NotHeld(name.to_string()))
        }
    }
}
