//! Resource cache orchestrating staleness, deduplication and retry.
//!
//! The cache is the single owner of all query results. Callers go through
//! `get`, which serves fresh values synchronously, attaches concurrent
//! callers to one shared in-flight fetch per key, and refreshes stale
//! entries in the background while still serving the last known value.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::api::keys::{ResourceKind, StoreQueryKey};
use crate::error::ApiError;
use crate::observe::{SubscriptionId, Subscribers};
use crate::session::SessionState;

use super::entry::{CacheEntry, EntrySnapshot, EntryStatus, FetchOutcome, SharedFetch};

/// Bounded retry with exponential backoff for transient fetch failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub base_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      base_delay: Duration::from_millis(200),
    }
  }
}

impl RetryPolicy {
  fn delay_for(&self, attempt: u32) -> Duration {
    self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
  }
}

/// Which entries an invalidation applies to.
#[derive(Debug, Clone)]
pub enum Invalidation {
  /// Exactly one key.
  Key(StoreQueryKey),
  /// Every entry of a resource kind, e.g. all product list pages.
  Kind(ResourceKind),
}

impl Invalidation {
  fn matches(&self, entry: &CacheEntry) -> bool {
    match self {
      Invalidation::Key(key) => entry.key == *key,
      Invalidation::Kind(kind) => entry.key.kind() == *kind,
    }
  }
}

/// Emitted synchronously after every committed entry transition.
#[derive(Debug, Clone)]
pub struct CacheEvent {
  pub key: StoreQueryKey,
  pub status: EntryStatus,
}

type AuthListener = Arc<dyn Fn() + Send + Sync>;

/// Keyed cache of remote query results.
pub struct ResourceCache {
  entries: Mutex<HashMap<String, CacheEntry>>,
  session: Arc<SessionState>,
  retry: RetryPolicy,
  subscribers: Subscribers<CacheEvent>,
  /// Invoked when a fetch fails because the token itself is invalid; the
  /// composition root wires this to forced logout.
  auth_listener: Mutex<Option<AuthListener>>,
  generation: AtomicU64,
  /// Stale window for entries created by `seed`, until a `get` supplies one.
  default_stale_time: Duration,
}

impl ResourceCache {
  pub fn new(session: Arc<SessionState>, retry: RetryPolicy) -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
      session,
      retry,
      subscribers: Subscribers::new(),
      auth_listener: Mutex::new(None),
      generation: AtomicU64::new(0),
      default_stale_time: Duration::from_secs(5 * 60),
    }
  }

  /// Override the stale window used for seeded entries.
  pub fn with_default_stale_time(mut self, stale_time: Duration) -> Self {
    self.default_stale_time = stale_time;
    self
  }

  /// Register the forced-logout hook. Replaces any previous listener.
  pub fn set_auth_listener<F>(&self, listener: F)
  where
    F: Fn() + Send + Sync + 'static,
  {
    let mut slot = self.auth_listener.lock().unwrap_or_else(|e| e.into_inner());
    *slot = Some(Arc::new(listener));
  }

  /// Subscribe to entry transitions.
  pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
  where
    F: Fn(&CacheEvent) + Send + Sync + 'static,
  {
    self.subscribers.subscribe(callback)
  }

  pub fn unsubscribe(&self, id: SubscriptionId) {
    self.subscribers.unsubscribe(id);
  }

  /// Read a query result through the cache.
  ///
  /// - Fresh value: returned immediately, no remote call.
  /// - Stale or errored value: returned immediately while a background
  ///   refetch runs.
  /// - No value yet: the caller awaits the (possibly shared) fetch.
  /// - A fetch already in flight is always joined, never duplicated.
  pub async fn get<T, F, Fut>(
    self: &Arc<Self>,
    key: &StoreQueryKey,
    stale_time: Duration,
    fetcher: F,
  ) -> Result<T, ApiError>
  where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    if key.requires_auth() && !self.session.is_authenticated() {
      return Err(ApiError::Auth {
        detail: format!("{} requires an authenticated session", key.describe()),
        token_invalid: false,
      });
    }

    enum Plan {
      Serve(serde_json::Value),
      Await(SharedFetch),
    }

    let hash = key.cache_hash();
    let (plan, event) = {
      let mut entries = self.lock_entries();
      let entry = entries.entry(hash.clone()).or_insert_with(|| {
        CacheEntry::new(
          key.clone(),
          self.generation.fetch_add(1, Ordering::Relaxed),
          stale_time,
        )
      });
      entry.stale_time = stale_time;
      let now = Instant::now();

      match (entry.status(now), entry.in_flight.clone()) {
        (EntryStatus::Fetching, Some(shared)) => {
          // Attach to the in-flight operation; serve the old value if one
          // exists, otherwise wait for the shared result.
          match entry.value.clone() {
            Some(value) => (Plan::Serve(value), None),
            None => (Plan::Await(shared), None),
          }
        }
        (EntryStatus::Fresh, _) => {
          let value = entry.value.clone().unwrap_or_default();
          (Plan::Serve(value), None)
        }
        _ => {
          // Empty, Stale or Error: start (and register) a new fetch.
          let shared = self.install_fetch(entry, hash.clone(), fetcher);
          let event = CacheEvent {
            key: entry.key.clone(),
            status: EntryStatus::Fetching,
          };
          match entry.value.clone() {
            Some(value) => (Plan::Serve(value), Some(event)),
            None => (Plan::Await(shared), Some(event)),
          }
        }
      }
    };

    if let Some(event) = event {
      self.subscribers.notify(&event);
    }

    let value = match plan {
      Plan::Serve(value) => value,
      Plan::Await(shared) => shared.await?,
    };
    serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
  }

  /// Point-in-time view of an entry, if one exists.
  pub fn snapshot(&self, key: &StoreQueryKey) -> Option<EntrySnapshot> {
    let entries = self.lock_entries();
    entries
      .get(&key.cache_hash())
      .map(|entry| entry.snapshot(Instant::now()))
  }

  /// Mark matching entries stale. Values are kept servable; the next `get`
  /// triggers a refetch.
  pub fn invalidate(&self, invalidation: &Invalidation) {
    let events: Vec<CacheEvent> = {
      let mut entries = self.lock_entries();
      let now = Instant::now();
      entries
        .values_mut()
        .filter(|entry| invalidation.matches(entry))
        .map(|entry| {
          entry.invalidated = true;
          // A fetch already in flight started before this invalidation;
          // retire the generation so its commit cannot clear the flag.
          if entry.in_flight.take().is_some() {
            entry.generation = self.generation.fetch_add(1, Ordering::Relaxed);
          }
          CacheEvent {
            key: entry.key.clone(),
            status: entry.status(now),
          }
        })
        .collect()
    };
    for event in &events {
      debug!(key = %event.key.describe(), "cache entry invalidated");
      self.subscribers.notify(event);
    }
  }

  /// Write-through: adopt a mutation's return value as the fresh cached
  /// value for `key`, skipping a refetch round trip.
  pub fn seed<T: Serialize>(&self, key: &StoreQueryKey, value: &T) -> Result<(), ApiError> {
    let value = serde_json::to_value(value).map_err(|e| ApiError::Decode(e.to_string()))?;
    self.seed_value(key, value);
    Ok(())
  }

  /// Seed from an already-serialized value. A fetch still in flight started
  /// before this write-through, so the entry's generation is retired and the
  /// stale result's commit is rejected instead of clobbering the seed.
  pub(crate) fn seed_value(&self, key: &StoreQueryKey, value: serde_json::Value) {
    let event = {
      let mut entries = self.lock_entries();
      let hash = key.cache_hash();
      let entry = entries.entry(hash).or_insert_with(|| {
        CacheEntry::new(
          key.clone(),
          self.generation.fetch_add(1, Ordering::Relaxed),
          self.default_stale_time,
        )
      });
      let now = Instant::now();
      if entry.in_flight.take().is_some() {
        entry.generation = self.generation.fetch_add(1, Ordering::Relaxed);
      }
      entry.commit_value(value, now);
      CacheEvent {
        key: entry.key.clone(),
        status: entry.status(now),
      }
    };
    debug!(key = %key.describe(), "cache entry seeded");
    self.subscribers.notify(&event);
  }

  /// Remove every entry unconditionally. Used on identity change; no stale
  /// cross-identity data may survive.
  pub fn purge_all(&self) {
    let events: Vec<CacheEvent> = {
      let mut entries = self.lock_entries();
      entries
        .drain()
        .map(|(_, entry)| CacheEvent {
          key: entry.key,
          status: EntryStatus::Empty,
        })
        .collect()
    };
    debug!(purged = events.len(), "cache purged");
    for event in &events {
      self.subscribers.notify(event);
    }
  }

  fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
    self.entries.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Build the shared fetch future for an entry and start driving it.
  ///
  /// The future commits its outcome into the cache *before* resolving, so
  /// every awaiter observes the committed state (read-your-writes), and it
  /// is driven by a detached task so a caller that stops awaiting never
  /// prevents the commit.
  fn install_fetch<T, F, Fut>(
    self: &Arc<Self>,
    entry: &mut CacheEntry,
    hash: String,
    fetcher: F,
  ) -> SharedFetch
  where
    T: Serialize + Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    let cache = Arc::clone(self);
    let key = entry.key.clone();
    let generation = entry.generation;
    let retry = self.retry;

    let future: BoxFuture<'static, FetchOutcome> = async move {
      let outcome = run_with_retry(&key, retry, fetcher).await;
      cache.commit(&hash, generation, outcome.clone());
      outcome
    }
    .boxed();

    let shared = future.shared();
    entry.in_flight = Some(shared.clone());
    // Detached driver: completes the fetch even if every caller goes away.
    tokio::spawn(shared.clone().map(|_| ()));
    shared
  }

  /// Apply a fetch outcome to its entry. Skipped when the entry was purged,
  /// replaced, or superseded by a seed/invalidation while the fetch was in
  /// flight.
  fn commit(&self, hash: &str, generation: u64, outcome: FetchOutcome) {
    let token_invalid = matches!(&outcome, Err(e) if e.invalidates_token());

    let event = {
      let mut entries = self.lock_entries();
      let Some(entry) = entries.get_mut(hash) else {
        return;
      };
      if entry.generation != generation {
        return;
      }
      let now = Instant::now();
      match outcome {
        Ok(value) => {
          debug!(key = %entry.key.describe(), "fetch committed");
          entry.commit_value(value, now);
        }
        Err(error) => {
          warn!(key = %entry.key.describe(), %error, "fetch failed");
          entry.commit_error(error);
        }
      }
      CacheEvent {
        key: entry.key.clone(),
        status: entry.status(now),
      }
    };
    self.subscribers.notify(&event);

    if token_invalid {
      let listener = {
        let slot = self.auth_listener.lock().unwrap_or_else(|e| e.into_inner());
        slot.clone()
      };
      if let Some(listener) = listener {
        listener();
      }
    }
  }
}

/// Run the fetcher, retrying transient failures with exponential backoff.
/// Non-retryable errors and exhausted retries surface as-is.
async fn run_with_retry<T, F, Fut>(
  key: &StoreQueryKey,
  retry: RetryPolicy,
  fetcher: F,
) -> FetchOutcome
where
  T: Serialize,
  F: Fn() -> Fut,
  Fut: Future<Output = Result<T, ApiError>>,
{
  let mut attempt = 1u32;
  loop {
    match fetcher().await {
      Ok(value) => {
        return serde_json::to_value(&value).map_err(|e| ApiError::Decode(e.to_string()));
      }
      Err(error) if error.is_retryable() && attempt < retry.max_attempts => {
        let delay = retry.delay_for(attempt);
        debug!(
          key = %key.describe(),
          attempt,
          delay_ms = delay.as_millis() as u64,
          "transient fetch failure, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
      }
      Err(error) => return Err(error),
    }
  }
}
