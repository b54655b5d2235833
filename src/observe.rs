//! Synchronous change-notification registry.
//!
//! Consumers register callbacks on the cart, the session or the cache and are
//! notified synchronously after each committed mutation. This replaces the
//! implicit re-render subscriptions of a UI framework with an explicit
//! observer seam that tests can hook directly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Handle returned by [`Subscribers::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// A list of subscribers for one event type.
pub struct Subscribers<E> {
  inner: Mutex<Vec<(u64, Callback<E>)>>,
  next_id: AtomicU64,
}

impl<E> Default for Subscribers<E> {
  fn default() -> Self {
    Self {
      inner: Mutex::new(Vec::new()),
      next_id: AtomicU64::new(0),
    }
  }
}

impl<E> Subscribers<E> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a callback. It is invoked synchronously on every notification
  /// until unsubscribed.
  pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
  where
    F: Fn(&E) + Send + Sync + 'static,
  {
    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    inner.push((id, Arc::new(callback)));
    SubscriptionId(id)
  }

  /// Remove a previously registered callback. Unknown ids are ignored.
  pub fn unsubscribe(&self, id: SubscriptionId) {
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    inner.retain(|(existing, _)| *existing != id.0);
  }

  /// Invoke every callback with the event.
  ///
  /// Callbacks run outside the registry lock, so a callback may subscribe or
  /// unsubscribe without deadlocking.
  pub fn notify(&self, event: &E) {
    let callbacks: Vec<Callback<E>> = {
      let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
      inner.iter().map(|(_, cb)| Arc::clone(cb)).collect()
    };
    for callback in callbacks {
      callback(event);
    }
  }
}
