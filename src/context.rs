//! Composition root and typed client surface.
//!
//! `StoreContext` wires the shared session state, the resource cache, the
//! cart and the mutation coordinator together and exposes one method per
//! storefront operation. Nothing here is a global: tests build as many
//! isolated contexts as they need.

use std::sync::Arc;

use color_eyre::Result;

use crate::api::keys::{ResourceKind, StoreQueryKey};
use crate::api::types::{
  Credentials, Order, PageParams, Paginated, Product, ProductFilters, ProductForm, ProfileUpdate,
  RegisterProfile, User,
};
use crate::api::{HttpApi, StorefrontApi};
use crate::cache::{Invalidation, ResourceCache};
use crate::cart::CartStore;
use crate::config::Config;
use crate::error::ApiError;
use crate::mutation::{MutationCoordinator, MutationEffects};
use crate::session::{SessionState, SessionStore, SessionStorage, SqliteStorage};

pub struct StoreContext {
  api: Arc<dyn StorefrontApi>,
  cache: Arc<ResourceCache>,
  session: Arc<SessionStore>,
  cart: Arc<CartStore>,
  mutations: MutationCoordinator,
  config: Config,
}

impl StoreContext {
  /// Assemble a context from explicit ports. The persisted session, if any,
  /// is restored immediately; its validity is checked by the first
  /// authenticated fetch.
  pub fn new(
    api: Arc<dyn StorefrontApi>,
    storage: Arc<dyn SessionStorage>,
    config: Config,
  ) -> Arc<Self> {
    Self::assemble(api, storage, config, Arc::new(SessionState::default()))
  }

  /// Production assembly: HTTP transport + SQLite session storage. The
  /// transport shares the session state so it sees tokens as soon as they
  /// are adopted.
  pub fn connect(config: Config) -> Result<Arc<Self>> {
    let state = Arc::new(SessionState::default());
    let api = Arc::new(HttpApi::new(&config.api.url, state.clone())?);
    let storage = Arc::new(SqliteStorage::open()?);
    Ok(Self::assemble(api, storage, config, state))
  }

  fn assemble(
    api: Arc<dyn StorefrontApi>,
    storage: Arc<dyn SessionStorage>,
    config: Config,
    state: Arc<SessionState>,
  ) -> Arc<Self> {
    let cache = Arc::new(ResourceCache::new(state.clone(), config.retry_policy()));
    let session = Arc::new(SessionStore::new(
      api.clone(),
      storage,
      state,
      cache.clone(),
    ));

    // A fetch that reports an invalid token forces a logout.
    let weak_session = Arc::downgrade(&session);
    cache.set_auth_listener(move || {
      if let Some(session) = weak_session.upgrade() {
        session.logout();
      }
    });

    session.restore();

    Arc::new(Self {
      api,
      cache: cache.clone(),
      session,
      cart: Arc::new(CartStore::new()),
      mutations: MutationCoordinator::new(cache),
      config,
    })
  }

  pub fn cart(&self) -> &Arc<CartStore> {
    &self.cart
  }

  pub fn session(&self) -> &Arc<SessionStore> {
    &self.session
  }

  pub fn cache(&self) -> &Arc<ResourceCache> {
    &self.cache
  }

  // ---- auth -------------------------------------------------------------

  pub async fn login(&self, credentials: Credentials) -> Result<User, ApiError> {
    self.session.login(credentials).await
  }

  pub async fn register(&self, profile: RegisterProfile) -> Result<User, ApiError> {
    self.session.register(profile).await
  }

  pub fn logout(&self) {
    self.session.logout();
  }

  // ---- queries ----------------------------------------------------------

  pub async fn products(
    &self,
    filters: ProductFilters,
    page: PageParams,
  ) -> Result<Paginated<Product>, ApiError> {
    let key = StoreQueryKey::ProductList {
      filters: filters.clone(),
      page: page.clone(),
    };
    let api = self.api.clone();
    self
      .cache
      .get(&key, self.config.product_stale_time(), move || {
        let api = api.clone();
        let filters = filters.clone();
        let page = page.clone();
        async move { api.list_products(&filters, &page).await }
      })
      .await
  }

  pub async fn product(&self, id: u64) -> Result<Product, ApiError> {
    let key = StoreQueryKey::ProductDetail { id };
    let api = self.api.clone();
    self
      .cache
      .get(&key, self.config.product_stale_time(), move || {
        let api = api.clone();
        async move { api.get_product(id).await }
      })
      .await
  }

  pub async fn orders(&self, page: PageParams) -> Result<Paginated<Order>, ApiError> {
    let key = StoreQueryKey::OrderList { page: page.clone() };
    let api = self.api.clone();
    self
      .cache
      .get(&key, self.config.order_stale_time(), move || {
        let api = api.clone();
        let page = page.clone();
        async move { api.list_orders(&page).await }
      })
      .await
  }

  pub async fn profile(&self) -> Result<User, ApiError> {
    let api = self.api.clone();
    self
      .cache
      .get(
        &StoreQueryKey::Profile,
        self.config.profile_stale_time(),
        move || {
          let api = api.clone();
          async move { api.get_profile().await }
        },
      )
      .await
  }

  // ---- mutations --------------------------------------------------------

  pub async fn create_product(&self, form: ProductForm) -> Result<Product, ApiError> {
    let api = self.api.clone();
    self
      .mutations
      .mutate(
        MutationEffects::new().invalidate(Invalidation::Kind(ResourceKind::ProductList)),
        move || async move { api.create_product(&form).await },
      )
      .await
  }

  /// The updated product is written through to its detail entry; list pages
  /// are recomputed server-side, so they are only invalidated.
  pub async fn update_product(&self, id: u64, form: ProductForm) -> Result<Product, ApiError> {
    let api = self.api.clone();
    self
      .mutations
      .mutate(
        MutationEffects::new()
          .seed(StoreQueryKey::ProductDetail { id })
          .invalidate(Invalidation::Kind(ResourceKind::ProductList)),
        move || async move { api.update_product(id, &form).await },
      )
      .await
  }

  pub async fn delete_product(&self, id: u64) -> Result<(), ApiError> {
    let api = self.api.clone();
    self
      .mutations
      .mutate(
        MutationEffects::new().invalidate(Invalidation::Kind(ResourceKind::ProductList)),
        move || async move { api.delete_product(id).await },
      )
      .await
  }

  pub async fn update_profile(&self, update: ProfileUpdate) -> Result<User, ApiError> {
    let api = self.api.clone();
    self
      .mutations
      .mutate(
        MutationEffects::new().seed(StoreQueryKey::Profile),
        move || async move { api.update_profile(&update).await },
      )
      .await
  }

  /// Submit the cart as an order. The cart is cleared only on success; a
  /// failed submission leaves it intact so the user can retry.
  pub async fn checkout(&self) -> Result<Order, ApiError> {
    let snapshot = self.cart.snapshot();
    if snapshot.is_empty() {
      return Err(ApiError::Validation {
        detail: "cart is empty".into(),
      });
    }

    let order = snapshot.to_order();
    let api = self.api.clone();
    let placed = self
      .mutations
      .mutate(
        MutationEffects::new().invalidate(Invalidation::Kind(ResourceKind::OrderList)),
        move || async move { api.create_order(&order).await },
      )
      .await?;

    self.cart.clear();
    Ok(placed)
  }
}
