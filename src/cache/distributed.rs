//! Distributed cache tier
//!
//! The engine's only cross-instance shared resource. The contract is a
//! minimal `get(key) -> value|miss` / `set(key, value, ttl)` over an opaque
//! string key and a JSON-serialized payload. Every implementation must
//! tolerate unavailability: the cache manager fails open, never closed.

use async_trait::async_trait;
use parking_lot::RwLock;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::config::RedisConfig;
use crate::error::CacheError;
use crate::types::AggregationResult;

/// One tier of the distributed cache
#[async_trait]
pub trait CacheTier: Send + Sync + 'static {
    /// Fetch a cached result; `Ok(None)` is a clean miss
    async fn get(&self, key: &str) -> Result<Option<AggregationResult>, CacheError>;

    /// Store a result with the given TTL
    async fn set(
        &self,
        key: &str,
        value: &AggregationResult,
        ttl: Duration,
    ) -> Result<(), CacheError>;
}

// ============================================================================
// Redis Tier
// ============================================================================

/// Redis-backed distributed tier
///
/// Uses a multiplexed connection and bounds every command with the
/// configured timeout so a slow Redis can never stall request handling.
pub struct RedisCacheTier {
    connection: redis::aio::MultiplexedConnection,
    command_timeout: Duration,
}

impl RedisCacheTier {
    /// Connect to Redis using the given configuration
    pub async fn connect(config: &RedisConfig) -> Result<Self, CacheError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| CacheError::Unreachable(e.to_string()))?;
        let command_timeout = Duration::from_millis(config.command_timeout_ms);
        let connection = timeout(command_timeout, client.get_multiplexed_tokio_connection())
            .await
            .map_err(|_| CacheError::Timeout(command_timeout))?
            .map_err(|e| CacheError::Unreachable(e.to_string()))?;
        Ok(Self {
            connection,
            command_timeout,
        })
    }
}

#[async_trait]
impl CacheTier for RedisCacheTier {
    async fn get(&self, key: &str) -> Result<Option<AggregationResult>, CacheError> {
        let mut conn = self.connection.clone();
        let payload: Option<String> = timeout(self.command_timeout, conn.get(key))
            .await
            .map_err(|_| CacheError::Timeout(self.command_timeout))?
            .map_err(|e| CacheError::Unreachable(e.to_string()))?;

        match payload {
            Some(json) => {
                let result = serde_json::from_str(&json)
                    .map_err(|e| CacheError::MalformedPayload(e.to_string()))?;
                Ok(Some(result))
            },
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: &AggregationResult,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let json = serde_json::to_string(value)
            .map_err(|e| CacheError::MalformedPayload(e.to_string()))?;
        let mut conn = self.connection.clone();
        timeout(
            self.command_timeout,
            conn.set_ex::<_, _, ()>(key, json, ttl.as_secs()),
        )
        .await
        .map_err(|_| CacheError::Timeout(self.command_timeout))?
        .map_err(|e| CacheError::Unreachable(e.to_string()))?;
        Ok(())
    }
}

// ============================================================================
// In-Memory Tier
// ============================================================================

/// In-process stand-in for the distributed tier
///
/// Serializes payloads through JSON like the Redis tier so the contract is
/// exercised identically. Used in tests and for embedded single-instance
/// deployments that do not run Redis.
pub struct InMemoryCacheTier {
    entries: RwLock<HashMap<String, (String, Instant, Duration)>>,
    fail: AtomicBool,
}

impl InMemoryCacheTier {
    /// Create an empty tier
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            fail: AtomicBool::new(false),
        }
    }

    /// Simulate an outage: every subsequent operation errors until cleared
    pub fn set_unavailable(&self, unavailable: bool) {
        self.fail.store(unavailable, Ordering::SeqCst);
    }

    /// Number of live (non-expired) entries
    pub fn len(&self) -> usize {
        let entries = self.entries.read();
        entries
            .values()
            .filter(|(_, at, ttl)| at.elapsed() <= *ttl)
            .count()
    }

    /// True when no live entries remain
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<(), CacheError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CacheError::Unreachable("simulated outage".to_string()));
        }
        Ok(())
    }
}

impl Default for InMemoryCacheTier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheTier for InMemoryCacheTier {
    async fn get(&self, key: &str) -> Result<Option<AggregationResult>, CacheError> {
        self.check_available()?;
        let entries = self.entries.read();
        match entries.get(key) {
            Some((json, inserted_at, ttl)) if inserted_at.elapsed() <= *ttl => {
                let result = serde_json::from_str(json)
                    .map_err(|e| CacheError::MalformedPayload(e.to_string()))?;
                Ok(Some(result))
            },
            _ => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: &AggregationResult,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.check_available()?;
        let json = serde_json::to_string(value)
            .map_err(|e| CacheError::MalformedPayload(e.to_string()))?;
        self.entries
            .write()
            .insert(key.to_string(), (json, Instant::now(), ttl));
        Ok(())
    }
}
