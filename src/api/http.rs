//! reqwest-backed implementation of [`StorefrontApi`].
//!
//! Attaches the current session token as a bearer credential on every
//! request (when one is present) and maps HTTP status codes onto the typed
//! error taxonomy.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use url::Url;

use crate::error::ApiError;
use crate::session::SessionState;

use super::types::{
  AuthResponse, Credentials, NewOrder, Order, PageParams, Paginated, Product, ProductFilters,
  ProductForm, ProfileUpdate, RegisterProfile, User,
};
use super::StorefrontApi;

/// HTTP storefront client.
#[derive(Clone)]
pub struct HttpApi {
  http: reqwest::Client,
  base_url: Url,
  session: Arc<SessionState>,
}

/// Error body shape used by the server: `{"detail": "..."}`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
  detail: String,
}

impl HttpApi {
  pub fn new(base_url: &str, session: Arc<SessionState>) -> Result<Self> {
    // Url::join treats a base without a trailing slash as a file path and
    // would drop its last segment.
    let normalized = if base_url.ends_with('/') {
      base_url.to_string()
    } else {
      format!("{}/", base_url)
    };
    let base_url =
      Url::parse(&normalized).map_err(|e| eyre!("Invalid API base URL {}: {}", normalized, e))?;
    let http = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url,
      session,
    })
  }

  fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
    self
      .base_url
      .join(path)
      .map_err(|e| ApiError::Decode(format!("invalid endpoint {}: {}", path, e)))
  }

  /// Send a request and decode a JSON body from a successful response.
  async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
    let response = self.dispatch(request).await?;
    response
      .json::<T>()
      .await
      .map_err(|e| ApiError::Decode(e.to_string()))
  }

  /// Send a request where the response body is irrelevant (e.g. DELETE).
  async fn send_unit(&self, request: RequestBuilder) -> Result<(), ApiError> {
    self.dispatch(request).await.map(|_| ())
  }

  async fn dispatch(&self, request: RequestBuilder) -> Result<reqwest::Response, ApiError> {
    let request = match self.session.token() {
      Some(token) => request.bearer_auth(token),
      None => request,
    };

    let response = request.send().await.map_err(|e| ApiError::Transient {
      detail: e.to_string(),
    })?;

    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&body)
      .map(|b| b.detail)
      .unwrap_or(body);
    Err(classify_status(status, detail))
  }
}

/// Map an HTTP status onto the error taxonomy.
fn classify_status(status: StatusCode, detail: String) -> ApiError {
  match status {
    StatusCode::NOT_FOUND => ApiError::NotFound { resource: detail },
    StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ApiError::Validation { detail },
    StatusCode::UNAUTHORIZED => ApiError::Auth {
      detail,
      token_invalid: true,
    },
    StatusCode::FORBIDDEN => ApiError::Auth {
      detail,
      token_invalid: false,
    },
    _ => ApiError::Transient {
      detail: format!("{}: {}", status, detail),
    },
  }
}

fn list_query(filters: &ProductFilters, page: &PageParams) -> Vec<(&'static str, String)> {
  let mut pairs = Vec::new();
  if let Some(category) = &filters.category {
    pairs.push(("category", category.clone()));
  }
  if let Some(min) = filters.min_price {
    pairs.push(("min_price", min.to_string()));
  }
  if let Some(max) = filters.max_price {
    pairs.push(("max_price", max.to_string()));
  }
  if let Some(in_stock) = filters.in_stock {
    pairs.push(("in_stock", in_stock.to_string()));
  }
  if let Some(search) = &filters.search {
    pairs.push(("search", search.clone()));
  }
  pairs.extend(page_query(page));
  pairs
}

fn page_query(page: &PageParams) -> Vec<(&'static str, String)> {
  let mut pairs = Vec::new();
  if let Some(p) = page.page {
    pairs.push(("page", p.to_string()));
  }
  if let Some(s) = page.size {
    pairs.push(("size", s.to_string()));
  }
  pairs
}

#[async_trait]
impl StorefrontApi for HttpApi {
  async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ApiError> {
    let url = self.endpoint("auth/login")?;
    self.send(self.http.post(url).json(credentials)).await
  }

  async fn register(&self, profile: &RegisterProfile) -> Result<AuthResponse, ApiError> {
    let url = self.endpoint("auth/register")?;
    self.send(self.http.post(url).json(profile)).await
  }

  async fn list_products(
    &self,
    filters: &ProductFilters,
    page: &PageParams,
  ) -> Result<Paginated<Product>, ApiError> {
    let url = self.endpoint("products/")?;
    self
      .send(self.http.get(url).query(&list_query(filters, page)))
      .await
  }

  async fn get_product(&self, id: u64) -> Result<Product, ApiError> {
    let url = self.endpoint(&format!("products/{}", id))?;
    self.send(self.http.get(url)).await
  }

  async fn create_product(&self, form: &ProductForm) -> Result<Product, ApiError> {
    let url = self.endpoint("products/")?;
    self.send(self.http.post(url).json(form)).await
  }

  async fn update_product(&self, id: u64, form: &ProductForm) -> Result<Product, ApiError> {
    let url = self.endpoint(&format!("products/{}", id))?;
    self.send(self.http.put(url).json(form)).await
  }

  async fn delete_product(&self, id: u64) -> Result<(), ApiError> {
    let url = self.endpoint(&format!("products/{}", id))?;
    self.send_unit(self.http.delete(url)).await
  }

  async fn list_orders(&self, page: &PageParams) -> Result<Paginated<Order>, ApiError> {
    let url = self.endpoint("orders/")?;
    self.send(self.http.get(url).query(&page_query(page))).await
  }

  async fn create_order(&self, order: &NewOrder) -> Result<Order, ApiError> {
    let url = self.endpoint("orders/")?;
    self.send(self.http.post(url).json(order)).await
  }

  async fn get_profile(&self) -> Result<User, ApiError> {
    let url = self.endpoint("users/profile")?;
    self.send(self.http.get(url)).await
  }

  async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError> {
    let url = self.endpoint("users/profile")?;
    self.send(self.http.put(url).json(update)).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn status_mapping_matches_taxonomy() {
    assert!(matches!(
      classify_status(StatusCode::NOT_FOUND, "gone".into()),
      ApiError::NotFound { .. }
    ));
    assert!(matches!(
      classify_status(StatusCode::UNPROCESSABLE_ENTITY, "bad".into()),
      ApiError::Validation { .. }
    ));
    assert!(classify_status(StatusCode::UNAUTHORIZED, "expired".into()).invalidates_token());
    assert!(!classify_status(StatusCode::FORBIDDEN, "admin only".into()).invalidates_token());
    assert!(classify_status(StatusCode::BAD_GATEWAY, "upstream".into()).is_retryable());
  }

  #[test]
  fn list_query_serializes_only_present_filters() {
    let filters = ProductFilters {
      category: Some("books".into()),
      in_stock: Some(true),
      ..Default::default()
    };
    let page = PageParams {
      page: Some(3),
      size: None,
    };
    let pairs = list_query(&filters, &page);
    assert_eq!(
      pairs,
      vec![
        ("category", "books".to_string()),
        ("in_stock", "true".to_string()),
        ("page", "3".to_string()),
      ]
    );
  }
}
