//! Domain types exchanged with the storefront API.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Authenticated user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
  pub id: u64,
  pub email: String,
  pub username: String,
  pub full_name: String,
  pub role: Role,
  pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  Customer,
  Admin,
}

/// Catalog product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
  pub id: u64,
  pub name: String,
  pub description: String,
  pub price: Decimal,
  pub stock_quantity: u32,
  pub category: String,
  pub is_active: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at: Option<DateTime<Utc>>,
}

/// Placed order as returned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
  pub id: u64,
  pub customer_id: u64,
  pub total_amount: Decimal,
  pub status: OrderStatus,
  pub created_at: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
  Pending,
  Processing,
  Shipped,
  Delivered,
  Cancelled,
}

/// Order submission payload built from the cart's lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
  pub items: Vec<NewOrderItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderItem {
  pub product_id: u64,
  pub quantity: u32,
}

/// Login credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
  pub email: String,
  pub password: String,
}

/// Registration form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterProfile {
  pub email: String,
  pub username: String,
  pub full_name: String,
  pub password: String,
}

/// Successful login/registration response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
  pub access_token: String,
  pub token_type: String,
  pub user: User,
}

/// Create/update payload for a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductForm {
  pub name: String,
  pub description: String,
  pub price: Decimal,
  pub stock_quantity: u32,
  pub category: String,
}

/// Profile update payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileUpdate {
  pub email: String,
  pub username: String,
  pub full_name: String,
}

/// One page of a server-side collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paginated<T> {
  pub items: Vec<T>,
  pub total: u64,
  pub page: u32,
  pub size: u32,
  pub pages: u32,
}

/// Catalog list filters. All fields optional; an empty filter lists everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFilters {
  pub category: Option<String>,
  pub min_price: Option<Decimal>,
  pub max_price: Option<Decimal>,
  pub in_stock: Option<bool>,
  pub search: Option<String>,
}

/// Pagination parameters for list queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageParams {
  pub page: Option<u32>,
  pub size: Option<u32>,
}
