//! Typed error taxonomy for remote operations.
//!
//! Every failure surfaced by the cache, the session store or the mutation
//! coordinator is one of these variants. The classification drives retry
//! behavior: only `Transient` errors are ever retried.

use thiserror::Error;

/// Errors produced by remote API calls and the caching layer around them.
///
/// `Clone` is required so a single fetch outcome can be shared between all
/// callers attached to the same in-flight operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
  /// The requested resource does not exist. Terminal, never retried.
  #[error("not found: {resource}")]
  NotFound { resource: String },

  /// The remote side rejected caller-supplied input. Surfaced verbatim so
  /// the UI can display it field-by-field. Never retried.
  #[error("validation failed: {detail}")]
  Validation { detail: String },

  /// Credentials rejected or missing where required. `token_invalid` is true
  /// only when the server indicated the token itself is bad (as opposed to
  /// the resource merely being forbidden).
  #[error("authentication failed: {detail}")]
  Auth { detail: String, token_invalid: bool },

  /// Network or server failure presumed recoverable. Retried with backoff.
  #[error("transient failure: {detail}")]
  Transient { detail: String },

  /// Local (de)serialization failure at the cache or transport boundary.
  /// Never retried; retrying cannot fix a shape mismatch.
  #[error("decode failure: {0}")]
  Decode(String),
}

impl ApiError {
  /// Whether a fetch that failed with this error may be attempted again.
  pub fn is_retryable(&self) -> bool {
    matches!(self, ApiError::Transient { .. })
  }

  /// Whether this error means the stored credential is no longer valid and
  /// the session should be torn down.
  pub fn invalidates_token(&self) -> bool {
    matches!(
      self,
      ApiError::Auth {
        token_invalid: true,
        ..
      }
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn only_transient_is_retryable() {
    assert!(ApiError::Transient {
      detail: "timeout".into()
    }
    .is_retryable());
    assert!(!ApiError::NotFound {
      resource: "product 9".into()
    }
    .is_retryable());
    assert!(!ApiError::Validation {
      detail: "price must be positive".into()
    }
    .is_retryable());
    assert!(!ApiError::Decode("bad shape".into()).is_retryable());
  }

  #[test]
  fn forbidden_does_not_invalidate_token() {
    let forbidden = ApiError::Auth {
      detail: "admin only".into(),
      token_invalid: false,
    };
    let expired = ApiError::Auth {
      detail: "token expired".into(),
      token_invalid: true,
    };
    assert!(!forbidden.invalidates_token());
    assert!(expired.invalidates_token());
  }
}
