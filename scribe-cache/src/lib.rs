//! Ring buffer and write cache for Scribe.
//!
//! [`RingBuffer`] is a fixed-capacity history of recent items;
//! [`WriteCache`] uses one ring of document snapshots per
//! (document, scope, branch) stream with LRU stream eviction, sitting in
//! front of document storage on the executor's hot path.

mod error;
mod ring;
mod write_cache;

pub use error::{CacheError, CacheResult};
pub use ring::RingBuffer;
pub use write_cache::{WriteCache, WriteCacheConfig};
