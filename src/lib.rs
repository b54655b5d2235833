//! Client-side state synchronization for a storefront API.
//!
//! The crate keeps a UI-agnostic client consistent with a remote storefront:
//! a staleness-aware [`cache::ResourceCache`] deduplicates and retries reads,
//! [`session::SessionStore`] owns the authenticated identity,
//! [`cart::CartStore`] holds purely local cart state with derived totals, and
//! [`mutation::MutationCoordinator`] applies cache effects after successful
//! writes. [`context::StoreContext`] wires them together and exposes one
//! typed method per storefront operation.

pub mod api;
pub mod cache;
pub mod cart;
pub mod config;
pub mod context;
pub mod error;
pub mod mutation;
pub mod observe;
pub mod session;

pub use api::{HttpApi, ResourceKind, StoreQueryKey, StorefrontApi};
pub use cache::{EntrySnapshot, EntryStatus, Invalidation, ResourceCache, RetryPolicy};
pub use cart::{Cart, CartLine, CartStore};
pub use config::Config;
pub use context::StoreContext;
pub use error::ApiError;
pub use mutation::{MutationCoordinator, MutationEffects};
pub use session::{SessionEvent, SessionStore};
