//! Authenticated session: shared state, login/logout flows, persistence.

pub mod storage;

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::api::types::{AuthResponse, Credentials, RegisterProfile, User};
use crate::api::StorefrontApi;
use crate::cache::ResourceCache;
use crate::error::ApiError;
use crate::observe::{SubscriptionId, Subscribers};

pub use storage::{MemoryStorage, PersistedSession, SessionStorage, SqliteStorage};

/// Token + identity held in memory. The invariant that both are set and
/// cleared together is enforced by replacing the pair wholesale.
#[derive(Debug, Clone)]
pub struct AuthSession {
  pub token: String,
  pub identity: User,
}

/// Shared in-memory session state.
///
/// This is the one piece of session data other components read directly:
/// the cache consults it for auth gating and the HTTP transport reads the
/// token from it.
#[derive(Default)]
pub struct SessionState {
  inner: Mutex<Option<AuthSession>>,
}

impl SessionState {
  pub fn is_authenticated(&self) -> bool {
    let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    inner.is_some()
  }

  pub fn token(&self) -> Option<String> {
    let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    inner.as_ref().map(|s| s.token.clone())
  }

  pub fn identity(&self) -> Option<User> {
    let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    inner.as_ref().map(|s| s.identity.clone())
  }

  pub(crate) fn replace(&self, session: Option<AuthSession>) {
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    *inner = session;
  }
}

/// Session lifecycle events delivered to subscribers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
  LoggedIn(User),
  LoggedOut,
  Restored(User),
}

/// Owns the authenticated identity and its persistence.
///
/// Every identity change purges the resource cache: no identity-scoped data
/// may survive a user switch.
pub struct SessionStore {
  api: Arc<dyn StorefrontApi>,
  storage: Arc<dyn SessionStorage>,
  state: Arc<SessionState>,
  cache: Arc<ResourceCache>,
  subscribers: Subscribers<SessionEvent>,
}

impl SessionStore {
  pub fn new(
    api: Arc<dyn StorefrontApi>,
    storage: Arc<dyn SessionStorage>,
    state: Arc<SessionState>,
    cache: Arc<ResourceCache>,
  ) -> Self {
    Self {
      api,
      storage,
      state,
      cache,
      subscribers: Subscribers::new(),
    }
  }

  pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
  where
    F: Fn(&SessionEvent) + Send + Sync + 'static,
  {
    self.subscribers.subscribe(callback)
  }

  pub fn unsubscribe(&self, id: SubscriptionId) {
    self.subscribers.unsubscribe(id);
  }

  pub fn is_authenticated(&self) -> bool {
    self.state.is_authenticated()
  }

  pub fn identity(&self) -> Option<User> {
    self.state.identity()
  }

  /// Authenticate against the remote API. On success the new session
  /// replaces the old one atomically and the cache is purged. Failure
  /// leaves any prior session untouched.
  pub async fn login(&self, credentials: Credentials) -> Result<User, ApiError> {
    let response = self.api.login(&credentials).await?;
    debug!(user = %response.user.username, "login succeeded");
    let user = self.adopt(response);
    self.subscribers.notify(&SessionEvent::LoggedIn(user.clone()));
    Ok(user)
  }

  /// Register a new account; on success behaves exactly like a login.
  pub async fn register(&self, profile: RegisterProfile) -> Result<User, ApiError> {
    let response = self.api.register(&profile).await?;
    debug!(user = %response.user.username, "registration succeeded");
    let user = self.adopt(response);
    self.subscribers.notify(&SessionEvent::LoggedIn(user.clone()));
    Ok(user)
  }

  /// Clear the session, its persisted copy, and the cache. Idempotent:
  /// logging out with no active session is a no-op.
  pub fn logout(&self) {
    if !self.state.is_authenticated() {
      return;
    }
    debug!("logging out");
    self.state.replace(None);
    if let Err(error) = self.storage.clear() {
      warn!(%error, "failed to erase persisted session");
    }
    self.cache.purge_all();
    self.subscribers.notify(&SessionEvent::LoggedOut);
  }

  /// Adopt a persisted session at startup without remote validation; its
  /// validity is only checked by the first authenticated fetch. A missing
  /// persisted session simply yields an unauthenticated state.
  pub fn restore(&self) {
    match self.storage.load() {
      Ok(Some(persisted)) => {
        debug!(user = %persisted.identity.username, "restored persisted session");
        let identity = persisted.identity.clone();
        self.state.replace(Some(AuthSession {
          token: persisted.token,
          identity: persisted.identity,
        }));
        self.subscribers.notify(&SessionEvent::Restored(identity));
      }
      Ok(None) => {}
      Err(error) => {
        // Unreadable persisted state degrades to an unauthenticated start.
        warn!(%error, "failed to load persisted session");
      }
    }
  }

  fn adopt(&self, response: AuthResponse) -> User {
    let user = response.user;
    let persisted = PersistedSession {
      token: response.access_token.clone(),
      identity: user.clone(),
    };
    self.state.replace(Some(AuthSession {
      token: response.access_token,
      identity: user.clone(),
    }));
    // Persistence is best-effort: an unwritable disk must not block login.
    if let Err(error) = self.storage.save(&persisted) {
      warn!(%error, "failed to persist session");
    }
    self.cache.purge_all();
    user
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::{
    NewOrder, Order, PageParams, Paginated, Product, ProductFilters, ProductForm, ProfileUpdate,
    Role,
  };
  use crate::cache::RetryPolicy;
  use async_trait::async_trait;
  use std::sync::atomic::{AtomicU32, Ordering};

  fn test_user(id: u64) -> User {
    User {
      id,
      email: format!("u{}@example.com", id),
      username: format!("u{}", id),
      full_name: format!("User {}", id),
      role: Role::Customer,
      is_active: true,
    }
  }

  /// Auth-only fake API; resource endpoints are never reached in these tests.
  struct FakeAuthApi {
    accept_password: String,
    logins: AtomicU32,
  }

  impl FakeAuthApi {
    fn new(accept_password: &str) -> Self {
      Self {
        accept_password: accept_password.into(),
        logins: AtomicU32::new(0),
      }
    }
  }

  #[async_trait]
  impl StorefrontApi for FakeAuthApi {
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ApiError> {
      self.logins.fetch_add(1, Ordering::SeqCst);
      if credentials.password == self.accept_password {
        Ok(AuthResponse {
          access_token: format!("token-for-{}", credentials.email),
          token_type: "bearer".into(),
          user: test_user(1),
        })
      } else {
        Err(ApiError::Auth {
          detail: "invalid credentials".into(),
          token_invalid: false,
        })
      }
    }

    async fn register(&self, profile: &RegisterProfile) -> Result<AuthResponse, ApiError> {
      Ok(AuthResponse {
        access_token: "fresh-token".into(),
        token_type: "bearer".into(),
        user: User {
          id: 2,
          email: profile.email.clone(),
          username: profile.username.clone(),
          full_name: profile.full_name.clone(),
          role: Role::Customer,
          is_active: true,
        },
      })
    }

    async fn list_products(
      &self,
      _filters: &ProductFilters,
      _page: &PageParams,
    ) -> Result<Paginated<Product>, ApiError> {
      unimplemented!("not used")
    }
    async fn get_product(&self, _id: u64) -> Result<Product, ApiError> {
      unimplemented!("not used")
    }
    async fn create_product(&self, _form: &ProductForm) -> Result<Product, ApiError> {
      unimplemented!("not used")
    }
    async fn update_product(&self, _id: u64, _form: &ProductForm) -> Result<Product, ApiError> {
      unimplemented!("not used")
    }
    async fn delete_product(&self, _id: u64) -> Result<(), ApiError> {
      unimplemented!("not used")
    }
    async fn list_orders(&self, _page: &PageParams) -> Result<Paginated<Order>, ApiError> {
      unimplemented!("not used")
    }
    async fn create_order(&self, _order: &NewOrder) -> Result<Order, ApiError> {
      unimplemented!("not used")
    }
    async fn get_profile(&self) -> Result<User, ApiError> {
      unimplemented!("not used")
    }
    async fn update_profile(&self, _update: &ProfileUpdate) -> Result<User, ApiError> {
      unimplemented!("not used")
    }
  }

  fn store_with(storage: Arc<dyn SessionStorage>) -> (SessionStore, Arc<ResourceCache>) {
    let state = Arc::new(SessionState::default());
    let cache = Arc::new(ResourceCache::new(state.clone(), RetryPolicy::default()));
    let store = SessionStore::new(
      Arc::new(FakeAuthApi::new("hunter2")),
      storage,
      state,
      cache.clone(),
    );
    (store, cache)
  }

  fn credentials(password: &str) -> Credentials {
    Credentials {
      email: "u1@example.com".into(),
      password: password.into(),
    }
  }

  #[tokio::test]
  async fn login_sets_state_persists_and_purges_cache() {
    let storage = Arc::new(MemoryStorage::new());
    let (store, cache) = store_with(storage.clone());

    // A cached public entry must not survive the identity change.
    let key = crate::api::StoreQueryKey::ProductDetail { id: 1 };
    cache.seed(&key, &1u32).unwrap();

    let user = store.login(credentials("hunter2")).await.unwrap();
    assert_eq!(user.id, 1);
    assert!(store.is_authenticated());
    assert!(storage.load().unwrap().is_some());
    assert!(cache.snapshot(&key).is_none());
  }

  #[tokio::test]
  async fn failed_login_leaves_prior_session_untouched() {
    let storage = Arc::new(MemoryStorage::new());
    let (store, _cache) = store_with(storage.clone());

    store.login(credentials("hunter2")).await.unwrap();
    let result = store.login(credentials("wrong")).await;
    assert!(matches!(result, Err(ApiError::Auth { .. })));

    // The earlier session is still active and persisted.
    assert!(store.is_authenticated());
    assert_eq!(storage.load().unwrap().unwrap().identity.id, 1);
  }

  #[tokio::test]
  async fn logout_clears_everything_and_is_idempotent() {
    let storage = Arc::new(MemoryStorage::new());
    let (store, cache) = store_with(storage.clone());

    store.login(credentials("hunter2")).await.unwrap();
    let key = crate::api::StoreQueryKey::ProductDetail { id: 1 };
    cache.seed(&key, &1u32).unwrap();

    store.logout();
    assert!(!store.is_authenticated());
    assert!(storage.load().unwrap().is_none());
    assert!(cache.snapshot(&key).is_none());

    // Second logout with no session: a no-op, no panic.
    store.logout();
    assert!(!store.is_authenticated());
  }

  #[tokio::test]
  async fn restore_adopts_persisted_session_without_remote_calls() {
    let storage = Arc::new(MemoryStorage::new());
    storage
      .save(&PersistedSession {
        token: "stored-token".into(),
        identity: test_user(5),
      })
      .unwrap();

    let (store, _cache) = store_with(storage);
    store.restore();
    assert!(store.is_authenticated());
    assert_eq!(store.identity().unwrap().id, 5);
  }

  #[tokio::test]
  async fn restore_with_empty_storage_stays_unauthenticated() {
    let (store, _cache) = store_with(Arc::new(MemoryStorage::new()));
    store.restore();
    assert!(!store.is_authenticated());
  }

  #[tokio::test]
  async fn session_events_fire_on_transitions() {
    let (store, _cache) = store_with(Arc::new(MemoryStorage::new()));
    let events: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let sink = events.clone();
    store.subscribe(move |event| {
      let label = match event {
        SessionEvent::LoggedIn(u) => format!("in:{}", u.id),
        SessionEvent::LoggedOut => "out".to_string(),
        SessionEvent::Restored(u) => format!("restored:{}", u.id),
      };
      sink.lock().unwrap().push(label);
    });

    store.login(credentials("hunter2")).await.unwrap();
    store.logout();

    let seen = events.lock().unwrap().clone();
    assert_eq!(seen, vec!["in:1".to_string(), "out".to_string()]);
  }
}
