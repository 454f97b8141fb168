//! Two-tier result caching
//!
//! Memoizes aggregation results under an order-independent canonical key.
//! The local tier is a bounded in-process map swept periodically; the
//! distributed tier is shared across process instances and always fails
//! open.

pub mod distributed;
pub mod key;
pub mod local;
pub mod manager;

pub use distributed::{CacheTier, InMemoryCacheTier, RedisCacheTier};
pub use key::canonical_key;
pub use local::{CacheEntry, LocalResultCache, SweepReport};
pub use manager::{CacheHitTier, CacheManager, CacheStats};
