//! Per-entry cache state.
//!
//! Each entry walks a small state machine:
//! `Empty → Fetching → {Fresh, Error}`, `Fresh → Stale` (lazy, time-based),
//! `Stale → Fetching`, `Error → Fetching`. No state is terminal.

use std::time::{Duration, Instant};

use futures::future::{BoxFuture, Shared};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::api::keys::StoreQueryKey;
use crate::error::ApiError;

/// Outcome of one (possibly retried) fetch, shared between attached callers.
pub(crate) type FetchOutcome = Result<Value, ApiError>;

/// The single in-flight operation for a key. Cloning attaches another caller.
pub(crate) type SharedFetch = Shared<BoxFuture<'static, FetchOutcome>>;

/// Observable entry status. `Stale` is derived at access time, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
  Empty,
  Fetching,
  Fresh,
  Stale,
  Error,
}

/// One cached query result. Owned exclusively by the cache; callers only
/// ever see [`EntrySnapshot`] copies.
pub(crate) struct CacheEntry {
  pub key: StoreQueryKey,
  /// Distinguishes this entry from a successor created after a purge, so a
  /// fetch started against a purged entry cannot commit into its replacement.
  pub generation: u64,
  pub value: Option<Value>,
  pub fetched_at: Option<Instant>,
  pub stale_time: Duration,
  pub last_error: Option<ApiError>,
  /// Set by `invalidate`; forces staleness regardless of age.
  pub invalidated: bool,
  pub in_flight: Option<SharedFetch>,
}

impl CacheEntry {
  pub fn new(key: StoreQueryKey, generation: u64, stale_time: Duration) -> Self {
    Self {
      key,
      generation,
      value: None,
      fetched_at: None,
      stale_time,
      last_error: None,
      invalidated: false,
      in_flight: None,
    }
  }

  /// Evaluate the status lazily at access time. No timers are involved: an
  /// entry becomes stale the instant its age crosses the window.
  pub fn status(&self, now: Instant) -> EntryStatus {
    if self.in_flight.is_some() {
      return EntryStatus::Fetching;
    }
    if self.last_error.is_some() {
      return EntryStatus::Error;
    }
    match (&self.value, self.fetched_at) {
      (Some(_), Some(fetched_at)) => {
        if self.invalidated || now.duration_since(fetched_at) >= self.stale_time {
          EntryStatus::Stale
        } else {
          EntryStatus::Fresh
        }
      }
      _ => EntryStatus::Empty,
    }
  }

  /// Record a successful fetch or seed.
  pub fn commit_value(&mut self, value: Value, now: Instant) {
    self.value = Some(value);
    self.fetched_at = Some(now);
    self.last_error = None;
    self.invalidated = false;
    self.in_flight = None;
  }

  /// Record a failed fetch. The previously cached value, if any, is kept so
  /// it stays servable while the error is surfaced out-of-band.
  pub fn commit_error(&mut self, error: ApiError) {
    self.last_error = Some(error);
    self.in_flight = None;
  }

  pub fn snapshot(&self, now: Instant) -> EntrySnapshot {
    EntrySnapshot {
      key: self.key.clone(),
      status: self.status(now),
      value: self.value.clone(),
      last_error: self.last_error.clone(),
    }
  }
}

/// Point-in-time copy of an entry handed to callers.
#[derive(Debug, Clone)]
pub struct EntrySnapshot {
  pub key: StoreQueryKey,
  pub status: EntryStatus,
  pub value: Option<Value>,
  pub last_error: Option<ApiError>,
}

impl EntrySnapshot {
  /// Decode the cached value into a concrete type.
  pub fn value_as<T: DeserializeOwned>(&self) -> Option<T> {
    self
      .value
      .clone()
      .and_then(|v| serde_json::from_value(v).ok())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn key() -> StoreQueryKey {
    StoreQueryKey::ProductDetail { id: 1 }
  }

  #[test]
  fn empty_until_first_commit() {
    let entry = CacheEntry::new(key(), 0, Duration::from_secs(60));
    assert_eq!(entry.status(Instant::now()), EntryStatus::Empty);
  }

  #[test]
  fn fresh_then_stale_without_a_timer() {
    let mut entry = CacheEntry::new(key(), 0, Duration::from_millis(10));
    let t0 = Instant::now();
    entry.commit_value(json!({"id": 1}), t0);
    assert_eq!(entry.status(t0), EntryStatus::Fresh);
    assert_eq!(
      entry.status(t0 + Duration::from_millis(11)),
      EntryStatus::Stale
    );
  }

  #[test]
  fn invalidation_forces_staleness() {
    let mut entry = CacheEntry::new(key(), 0, Duration::from_secs(3600));
    let t0 = Instant::now();
    entry.commit_value(json!({"id": 1}), t0);
    entry.invalidated = true;
    assert_eq!(entry.status(t0), EntryStatus::Stale);
  }

  #[test]
  fn failed_fetch_keeps_previous_value() {
    let mut entry = CacheEntry::new(key(), 0, Duration::from_secs(60));
    entry.commit_value(json!({"id": 1}), Instant::now());
    entry.commit_error(ApiError::Transient {
      detail: "down".into(),
    });
    assert_eq!(entry.status(Instant::now()), EntryStatus::Error);
    assert!(entry.value.is_some());
  }
}
