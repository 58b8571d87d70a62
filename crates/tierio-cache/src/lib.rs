//! Tierio read-through cache
//!
//! A bounded in-memory layer in front of the operation executor. Entries
//! expire by TTL and are evicted least-recently-used under byte/entry-count
//! pressure. `get_or_set` serializes population per key, so a stampede of
//! concurrent first reads runs the underlying load exactly once.

pub mod cache;

pub use cache::{CacheStats, ReadThroughCache};
