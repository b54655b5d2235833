//! Shopping cart aggregate with derived totals.
//!
//! The cart is pure local state: its operations are synchronous, never fail,
//! and never touch the network. Totals are recomputed from the lines on
//! every mutation so they cannot drift.

use std::collections::BTreeMap;
use std::sync::Mutex;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::api::types::{NewOrder, NewOrderItem, Product};
use crate::observe::{SubscriptionId, Subscribers};

/// One cart line. The unit price is captured when the product is added and
/// is not re-read afterwards: later catalog price changes do not alter an
/// already-added line within the same cart session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
  pub product_id: u64,
  pub unit_price: Decimal,
  pub quantity: u32,
}

/// Immutable cart snapshot. Lines are keyed by product id, so a product
/// appears at most once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
  lines: BTreeMap<u64, CartLine>,
  total: Decimal,
  item_count: u32,
}

impl Cart {
  pub fn lines(&self) -> impl Iterator<Item = &CartLine> {
    self.lines.values()
  }

  pub fn line(&self, product_id: u64) -> Option<&CartLine> {
    self.lines.get(&product_id)
  }

  pub fn total(&self) -> Decimal {
    self.total
  }

  pub fn item_count(&self) -> u32 {
    self.item_count
  }

  pub fn is_empty(&self) -> bool {
    self.lines.is_empty()
  }

  /// Order payload for checkout: (product id, quantity) pairs.
  pub fn to_order(&self) -> NewOrder {
    NewOrder {
      items: self
        .lines
        .values()
        .map(|line| NewOrderItem {
          product_id: line.product_id,
          quantity: line.quantity,
        })
        .collect(),
    }
  }

  fn recompute(&mut self) {
    self.total = self
      .lines
      .values()
      .map(|line| line.unit_price * Decimal::from(line.quantity))
      .sum();
    self.item_count = self.lines.values().map(|line| line.quantity).sum();
  }
}

/// Owns the mutable cart. Subscribers receive a snapshot synchronously after
/// each committed mutation.
#[derive(Default)]
pub struct CartStore {
  inner: Mutex<Cart>,
  subscribers: Subscribers<Cart>,
}

impl CartStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
  where
    F: Fn(&Cart) + Send + Sync + 'static,
  {
    self.subscribers.subscribe(callback)
  }

  pub fn unsubscribe(&self, id: SubscriptionId) {
    self.subscribers.unsubscribe(id);
  }

  pub fn snapshot(&self) -> Cart {
    self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
  }

  /// Add `quantity` of a product. Re-adding merges quantities into the
  /// existing line; the line's captured price is kept. A zero quantity is a
  /// no-op. Stock ceilings are the caller's policy and are checked before
  /// this call, since stock levels live in a separately cached resource.
  pub fn add_item(&self, product: &Product, quantity: u32) {
    if quantity == 0 {
      return;
    }
    self.mutate(|cart| {
      cart
        .lines
        .entry(product.id)
        .and_modify(|line| line.quantity += quantity)
        .or_insert_with(|| CartLine {
          product_id: product.id,
          unit_price: product.price,
          quantity,
        });
    });
  }

  /// Remove a line entirely. No-op when the product is not in the cart.
  pub fn remove_item(&self, product_id: u64) {
    self.mutate(|cart| {
      cart.lines.remove(&product_id);
    });
  }

  /// Overwrite a line's quantity. A quantity of zero removes the line.
  /// No-op for a product not in the cart: a line cannot be created here
  /// because only `add_item` captures a price.
  pub fn set_quantity(&self, product_id: u64, quantity: u32) {
    self.mutate(|cart| {
      if quantity == 0 {
        cart.lines.remove(&product_id);
      } else if let Some(line) = cart.lines.get_mut(&product_id) {
        line.quantity = quantity;
      }
    });
  }

  /// Empty the cart (explicit reset or successful checkout).
  pub fn clear(&self) {
    self.mutate(|cart| {
      cart.lines.clear();
    });
  }

  fn mutate<F: FnOnce(&mut Cart)>(&self, f: F) {
    let snapshot = {
      let mut cart = self.inner.lock().unwrap_or_else(|e| e.into_inner());
      f(&mut cart);
      cart.recompute();
      cart.clone()
    };
    self.subscribers.notify(&snapshot);
  }
}
