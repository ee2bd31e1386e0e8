// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis-backed lock: `SET key token NX PX ttl`, released by a compare-and-delete
//! script so a process never frees a lock that expired and was taken by another.
//!
//! While held, a background task pushes the expiry forward every third of the
//! TTL, so a long rebuild keeps the lock. The TTL only bounds how long a crashed
//! holder blocks others.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use redis::{cmd, Client, Script};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{LockError, LockService};
use crate::resilience::retry::{is_transient_redis, retry, retry_if, RetryConfig};

const UNLOCK_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

const RENEW_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("PEXPIRE", KEYS[1], ARGV[2])
else
    return 0
end
"#;

const MIN_RENEWAL_INTERVAL: Duration = Duration::from_millis(100);

/// How often a held lock's expiry is pushed forward.
fn renewal_interval(ttl: Duration) -> Duration {
    (ttl / 3).max(MIN_RENEWAL_INTERVAL)
}

struct HeldLock {
    token: String,
    renewal: JoinHandle<()>,
}

pub struct RedisLockService {
    connection: ConnectionManager,
    prefix: String,
    ttl: Duration,
    /// Locks held by this instance, by name
    held: DashMap<String, HeldLock>,
    unlock_script: Script,
    renew_script: Script,
}

impl RedisLockService {
    pub async fn new(connection_string: &str, prefix: &str, ttl: Duration) -> Result<Self, LockError> {
        let client = Client::open(connection_string).map_err(|e| LockError::Unavailable(e.to_string()))?;
        let connection = retry("redis_lock_connect", &RetryConfig::startup(), || async {
            ConnectionManager::new(client.clone()).await
        })
        .await
        .map_err(|e: redis::RedisError| LockError::Unavailable(e.to_string()))?;
        Ok(Self::with_connection(connection, prefix, ttl))
    }

    /// Share an existing connection.
    pub fn with_connection(connection: ConnectionManager, prefix: &str, ttl: Duration) -> Self {
        Self {
            connection,
            prefix: prefix.to_string(),
            ttl,
            held: DashMap::new(),
            unlock_script: Script::new(UNLOCK_SCRIPT),
            renew_script: Script::new(RENEW_SCRIPT),
        }
    }

    fn lock_key(&self, name: &str) -> String {
        format!("{}lock:{}", self.prefix, name)
    }

    /// Keep extending `key` while it still carries `token`.
    fn spawn_renewal(&self, name: &str, key: String, token: String) -> JoinHandle<()> {
        let mut conn = self.connection.clone();
        let script = self.renew_script.clone();
        let ttl_ms = self.ttl.as_millis() as u64;
        let every = renewal_interval(self.ttl);
        let name = name.to_string();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let renewed: Result<i64, redis::RedisError> =
                    script.key(&key).arg(&token).arg(ttl_ms).invoke_async(&mut conn).await;
                match renewed {
                    Ok(0) => {
                        warn!(lock = %name, "Lock lost before renewal");
                        return;
                    }
                    Ok(_) => debug!(lock = %name, "Lock renewed"),
                    Err(e) => warn!(lock = %name, error = %e, "Lock renewal failed"),
                }
            }
        })
    }
}

impl Drop for RedisLockService {
    fn drop(&mut self) {
        for entry in self.held.iter() {
            entry.renewal.abort();
        }
    }
}

#[async_trait]
impl LockService for RedisLockService {
    async fn try_lock(&self, name: &str) -> Result<bool, LockError> {
        let key = self.lock_key(name);
        let token = Uuid::new_v4().to_string();
        let ttl_ms = self.ttl.as_millis() as u64;

        let reply: Option<String> = retry_if("redis_lock", &RetryConfig::query(), is_transient_redis, || {
            let mut conn = self.connection.clone();
            let key = key.clone();
            let token = token.clone();
            async move {
                cmd("SET")
                    .arg(&key)
                    .arg(&token)
                    .arg("NX")
                    .arg("PX")
                    .arg(ttl_ms)
                    .query_async(&mut conn)
                    .await
            }
        })
        .await
        .map_err(|e| LockError::Unavailable(e.to_string()))?;

        if reply.is_some() {
            debug!(lock = %name, "Lock acquired");
            let renewal = self.spawn_renewal(name, key, token.clone());
            if let Some(previous) = self.held.insert(name.to_string(), HeldLock { token, renewal }) {
                previous.renewal.abort();
            }
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn unlock(&self, name: &str) -> Result<(), LockError> {
        let Some((_, HeldLock { token, renewal })) = self.held.remove(name) else {
            return Err(LockError::NotHeld(name.to_string()));
        };
        renewal.abort();
        let key = self.lock_key(name);

        let mut conn = self.connection.clone();
        let removed: i64 = self
            .unlock_script
            .key(&key)
            .arg(&token)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| LockError::Unavailable(e.to_string()))?;

        if removed == 0 {
            warn!(lock = %name, "Lock expired before release");
            return Err(LockError::NotHeld(name.to_string()));
        }
        debug!(lock = %name, "Lock released");
        Ok(())
    }
}
