//! Write operations and their cache effects.
//!
//! A mutation runs the remote write first; cache effects (write-through
//! seeds and invalidations) are applied only on success, synchronously,
//! before the result reaches the caller. A read issued after a successful
//! mutation therefore always observes its effects.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::api::keys::StoreQueryKey;
use crate::cache::{Invalidation, ResourceCache};
use crate::error::ApiError;

/// Cache effects applied after a successful mutation.
///
/// `seed_keys` name entries whose new value is exactly the mutation's return
/// value; `invalidate` names derived collections the server must recompute.
#[derive(Debug, Clone, Default)]
pub struct MutationEffects {
  pub seed_keys: Vec<StoreQueryKey>,
  pub invalidate: Vec<Invalidation>,
}

impl MutationEffects {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn seed(mut self, key: StoreQueryKey) -> Self {
    self.seed_keys.push(key);
    self
  }

  pub fn invalidate(mut self, invalidation: Invalidation) -> Self {
    self.invalidate.push(invalidation);
    self
  }
}

/// Executes write operations and applies the cache policy afterwards.
#[derive(Clone)]
pub struct MutationCoordinator {
  cache: Arc<ResourceCache>,
}

impl MutationCoordinator {
  pub fn new(cache: Arc<ResourceCache>) -> Self {
    Self { cache }
  }

  /// Run the remote write; on success seed and invalidate as described.
  /// On failure nothing is touched and the error passes through unmodified.
  pub async fn mutate<T, F, Fut>(&self, effects: MutationEffects, op: F) -> Result<T, ApiError>
  where
    T: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
  {
    let value = op().await?;

    // Serialize once up front: either every seed applies or none does.
    if !effects.seed_keys.is_empty() {
      let seeded =
        serde_json::to_value(&value).map_err(|e| ApiError::Decode(e.to_string()))?;
      for key in &effects.seed_keys {
        self.cache.seed_value(key, seeded.clone());
      }
    }
    for invalidation in &effects.invalidate {
      self.cache.invalidate(invalidation);
    }
    debug!(
      seeded = effects.seed_keys.len(),
      invalidated = effects.invalidate.len(),
      "mutation committed"
    );

    Ok(value)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::keys::ResourceKind;
  use crate::cache::{EntryStatus, RetryPolicy};
  use crate::session::SessionState;
  use std::time::Duration;

  fn coordinator() -> (MutationCoordinator, Arc<ResourceCache>) {
    let cache = Arc::new(ResourceCache::new(
      Arc::new(SessionState::default()),
      RetryPolicy::default(),
    ));
    (MutationCoordinator::new(cache.clone()), cache)
  }

  fn detail_key(id: u64) -> StoreQueryKey {
    StoreQueryKey::ProductDetail { id }
  }

  #[tokio::test]
  async fn success_seeds_and_invalidates_before_resolving() {
    let (coordinator, cache) = coordinator();
    cache.seed(&detail_key(2), &0u32).unwrap();

    let result = coordinator
      .mutate(
        MutationEffects::new()
          .seed(detail_key(1))
          .invalidate(Invalidation::Key(detail_key(2))),
        || async { Ok(7u32) },
      )
      .await
      .unwrap();
    assert_eq!(result, 7);

    // Read-your-writes: effects are visible as soon as mutate returns.
    let seeded = cache.snapshot(&detail_key(1)).unwrap();
    assert_eq!(seeded.status, EntryStatus::Fresh);
    assert_eq!(seeded.value_as::<u32>(), Some(7));
    assert_eq!(
      cache.snapshot(&detail_key(2)).unwrap().status,
      EntryStatus::Stale
    );
  }

  #[tokio::test]
  async fn failure_applies_no_cache_effects() {
    let (coordinator, cache) = coordinator();
    cache.seed(&detail_key(2), &0u32).unwrap();

    let result: Result<u32, _> = coordinator
      .mutate(
        MutationEffects::new()
          .seed(detail_key(1))
          .invalidate(Invalidation::Key(detail_key(2))),
        || async {
          Err(ApiError::Validation {
            detail: "price must be positive".into(),
          })
        },
      )
      .await;

    assert!(matches!(result, Err(ApiError::Validation { .. })));
    assert!(cache.snapshot(&detail_key(1)).is_none());
    assert_eq!(
      cache.snapshot(&detail_key(2)).unwrap().status,
      EntryStatus::Fresh
    );
  }

  struct Unserializable;

  impl Serialize for Unserializable {
    fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
      Err(serde::ser::Error::custom("refused"))
    }
  }

  #[tokio::test]
  async fn unserializable_result_applies_no_seed_at_all() {
    let (coordinator, cache) = coordinator();

    let result = coordinator
      .mutate(
        MutationEffects::new().seed(detail_key(1)).seed(detail_key(2)),
        || async { Ok(Unserializable) },
      )
      .await;

    // All-or-nothing: the first key must not be seeded when the value
    // cannot be serialized for the second.
    assert!(matches!(result, Err(ApiError::Decode(_))));
    assert!(cache.snapshot(&detail_key(1)).is_none());
    assert!(cache.snapshot(&detail_key(2)).is_none());
  }

  #[tokio::test]
  async fn kind_invalidation_reaches_every_matching_entry() {
    let (coordinator, cache) = coordinator();
    cache.seed(&detail_key(1), &1u32).unwrap();
    cache.seed(&detail_key(2), &2u32).unwrap();

    coordinator
      .mutate(
        MutationEffects::new().invalidate(Invalidation::Kind(ResourceKind::ProductDetail)),
        || async { Ok(0u32) },
      )
      .await
      .unwrap();

    for id in [1, 2] {
      assert_eq!(
        cache.snapshot(&detail_key(id)).unwrap().status,
        EntryStatus::Stale,
        "entry {} should be stale",
        id
      );
    }
  }

  #[tokio::test]
  async fn seeded_entries_keep_a_fresh_window() {
    let (coordinator, cache) = coordinator();

    coordinator
      .mutate(MutationEffects::new().seed(detail_key(1)), || async {
        Ok(42u32)
      })
      .await
      .unwrap();

    // Still fresh moments later: seeds are not immediately stale.
    tokio::time::sleep(Duration::from_millis(5)).await;
    let snapshot = cache.snapshot(&detail_key(1)).unwrap();
    assert_eq!(snapshot.value_as::<u32>(), Some(42));
  }
}
