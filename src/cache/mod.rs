//! Keyed cache of remote query results with staleness, in-flight
//! deduplication, bounded retry and explicit invalidation.
//!
//! - staleness is evaluated lazily at access time, never by timers
//! - at most one fetch per key is in flight; concurrent readers attach
//! - transient failures retry with exponential backoff, up to 3 attempts
//! - a failed refetch never discards the last known good value

mod entry;
mod layer;

pub use entry::{EntrySnapshot, EntryStatus};
pub use layer::{CacheEvent, Invalidation, ResourceCache, RetryPolicy};
