//! Cache keys for storefront queries.
//!
//! A key is a stable, order-independent serialization of (resource kind,
//! query parameters): equal parameter sets always hash identically, however
//! they were constructed.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use super::types::{PageParams, ProductFilters};

/// The resource kind behind a query key. Used for auth gating and for
/// predicate-style invalidation ("every product list page").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
  ProductList,
  ProductDetail,
  OrderList,
  Profile,
}

impl ResourceKind {
  fn as_str(self) -> &'static str {
    match self {
      Self::ProductList => "product_list",
      Self::ProductDetail => "product_detail",
      Self::OrderList => "order_list",
      Self::Profile => "profile",
    }
  }

  /// Orders and the profile are scoped to the authenticated user; the
  /// catalog is public.
  pub fn requires_auth(self) -> bool {
    matches!(self, Self::OrderList | Self::Profile)
  }
}

/// Query key types for the storefront API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreQueryKey {
  /// Product catalog page with filters
  ProductList {
    filters: ProductFilters,
    page: PageParams,
  },
  /// Single product by id
  ProductDetail { id: u64 },
  /// The authenticated user's orders
  OrderList { page: PageParams },
  /// The authenticated user's profile
  Profile,
}

impl StoreQueryKey {
  pub fn kind(&self) -> ResourceKind {
    match self {
      Self::ProductList { .. } => ResourceKind::ProductList,
      Self::ProductDetail { .. } => ResourceKind::ProductDetail,
      Self::OrderList { .. } => ResourceKind::OrderList,
      Self::Profile => ResourceKind::Profile,
    }
  }

  pub fn requires_auth(&self) -> bool {
    self.kind().requires_auth()
  }

  /// Stable hash for cache lookups.
  ///
  /// Parameters are collected into a sorted map before hashing, so two keys
  /// built from the same parameter set in different orders are identical.
  pub fn cache_hash(&self) -> String {
    let mut input = String::from(self.kind().as_str());
    for (name, value) in self.params() {
      input.push(':');
      input.push_str(name);
      input.push('=');
      input.push_str(&value);
    }

    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }

  /// Human-readable form for logging.
  pub fn describe(&self) -> String {
    match self {
      Self::ProductList { filters, page } => {
        format!(
          "products (category {}, page {})",
          filters.category.as_deref().unwrap_or("any"),
          page.page.unwrap_or(1)
        )
      }
      Self::ProductDetail { id } => format!("product {}", id),
      Self::OrderList { page } => format!("orders (page {})", page.page.unwrap_or(1)),
      Self::Profile => "profile".to_string(),
    }
  }

  fn params(&self) -> BTreeMap<&'static str, String> {
    let mut params = BTreeMap::new();
    match self {
      Self::ProductList { filters, page } => {
        if let Some(category) = &filters.category {
          params.insert("category", category.trim().to_lowercase());
        }
        if let Some(min) = filters.min_price {
          params.insert("min_price", min.normalize().to_string());
        }
        if let Some(max) = filters.max_price {
          params.insert("max_price", max.normalize().to_string());
        }
        if let Some(in_stock) = filters.in_stock {
          params.insert("in_stock", in_stock.to_string());
        }
        if let Some(search) = &filters.search {
          params.insert("search", search.trim().to_lowercase());
        }
        insert_page(&mut params, page);
      }
      Self::ProductDetail { id } => {
        params.insert("id", id.to_string());
      }
      Self::OrderList { page } => {
        insert_page(&mut params, page);
      }
      Self::Profile => {}
    }
    params
  }
}

fn insert_page(params: &mut BTreeMap<&'static str, String>, page: &PageParams) {
  if let Some(p) = page.page {
    params.insert("page", p.to_string());
  }
  if let Some(s) = page.size {
    params.insert("size", s.to_string());
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rust_decimal::Decimal;

  #[test]
  fn equal_filters_hash_identically() {
    let a = StoreQueryKey::ProductList {
      filters: ProductFilters {
        category: Some("Books".into()),
        min_price: Some(Decimal::new(500, 2)),
        ..Default::default()
      },
      page: PageParams {
        page: Some(2),
        size: None,
      },
    };
    let b = StoreQueryKey::ProductList {
      filters: ProductFilters {
        min_price: Some(Decimal::new(50, 1)),
        category: Some("books ".into()),
        ..Default::default()
      },
      page: PageParams {
        page: Some(2),
        size: None,
      },
    };
    assert_eq!(a.cache_hash(), b.cache_hash());
  }

  #[test]
  fn different_kinds_never_collide() {
    let list = StoreQueryKey::ProductList {
      filters: ProductFilters::default(),
      page: PageParams::default(),
    };
    let detail = StoreQueryKey::ProductDetail { id: 1 };
    let orders = StoreQueryKey::OrderList {
      page: PageParams::default(),
    };
    assert_ne!(list.cache_hash(), detail.cache_hash());
    assert_ne!(list.cache_hash(), orders.cache_hash());
    assert_ne!(detail.cache_hash(), orders.cache_hash());
  }

  #[test]
  fn different_params_change_the_hash() {
    let p1 = StoreQueryKey::ProductDetail { id: 1 };
    let p2 = StoreQueryKey::ProductDetail { id: 2 };
    assert_ne!(p1.cache_hash(), p2.cache_hash());
  }

  #[test]
  fn auth_gating_matches_resource_kind() {
    assert!(StoreQueryKey::Profile.requires_auth());
    assert!(StoreQueryKey::OrderList {
      page: PageParams::default()
    }
    .requires_auth());
    assert!(!StoreQueryKey::ProductDetail { id: 7 }.requires_auth());
  }
}
