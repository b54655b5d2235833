//! Abstract storefront API surface and its HTTP implementation.
//!
//! The core never talks to a transport directly: it consumes the
//! [`StorefrontApi`] trait, so tests can substitute an in-memory server and
//! the HTTP client stays swappable.

pub mod http;
pub mod keys;
pub mod types;

use async_trait::async_trait;

use crate::error::ApiError;
use types::{
  AuthResponse, Credentials, NewOrder, Order, PageParams, Paginated, Product, ProductFilters,
  ProductForm, ProfileUpdate, RegisterProfile, User,
};

pub use http::HttpApi;
pub use keys::{ResourceKind, StoreQueryKey};

/// Remote storefront API, transport-agnostic.
///
/// Auth endpoints return a fresh token+identity pair; resource endpoints
/// assume the transport attaches the current credential where required.
#[async_trait]
pub trait StorefrontApi: Send + Sync {
  // Auth
  async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ApiError>;
  async fn register(&self, profile: &RegisterProfile) -> Result<AuthResponse, ApiError>;

  // Catalog
  async fn list_products(
    &self,
    filters: &ProductFilters,
    page: &PageParams,
  ) -> Result<Paginated<Product>, ApiError>;
  async fn get_product(&self, id: u64) -> Result<Product, ApiError>;
  async fn create_product(&self, form: &ProductForm) -> Result<Product, ApiError>;
  async fn update_product(&self, id: u64, form: &ProductForm) -> Result<Product, ApiError>;
  async fn delete_product(&self, id: u64) -> Result<(), ApiError>;

  // Orders
  async fn list_orders(&self, page: &PageParams) -> Result<Paginated<Order>, ApiError>;
  async fn create_order(&self, order: &NewOrder) -> Result<Order, ApiError>;

  // Profile
  async fn get_profile(&self) -> Result<User, ApiError>;
  async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError>;
}
