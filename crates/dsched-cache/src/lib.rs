//! # dsched Cache
//!
//! The shared cache is the only synchronization substrate between replicas.
//! This crate defines its contract and ships two backends:
//!
//! - [`MemoryCache`]: in-process, for tests and single-replica deployments
//! - `RedisCache` (feature `redis`): a Redis server shared by all replicas

mod cache;
mod error;
mod memory;
#[cfg(feature = "redis")]
mod redis_cache;

pub use cache::SharedCache;
pub use error::CacheError;
pub use memory::MemoryCache;
#[cfg(feature = "redis")]
pub use redis_cache::RedisCache;
