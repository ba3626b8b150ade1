//! The `UpstreamRegistry` trait and its policy knobs.
//!
//! The trait is implemented by storage backends (e.g. `ksce-store-sqlite`).
//! The reconciliation layer depends on this abstraction, not on any concrete
//! backend.

use std::future::Future;

use serde::Deserialize;

use crate::{error::Classify, upstream::Upstream};

/// How repeated registrations treat downstream public keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicKeyPolicy {
  /// Insert every supplied key on every call, duplicating rows for keys that
  /// were already registered.
  #[default]
  Append,
  /// Skip keys whose `(name, data)` pair already has a row.
  SkipExisting,
}

/// Abstraction over the proxy's routing database.
///
/// Neither operation is atomic across its steps: a failure part-way through
/// leaves the rows written by earlier steps in place.
pub trait UpstreamRegistry: Send + Sync {
  type Error: std::error::Error + Classify + Send + Sync + 'static;

  /// Find-or-create the server, upstream, user map and private key rows for
  /// `upstream`, then add its public keys.
  fn register<'a>(
    &'a self,
    upstream: &'a Upstream,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Remove every row belonging to `upstream`.
  ///
  /// Returns a not-found error, without writing anything, when the identity
  /// was never registered.
  fn unregister<'a>(
    &'a self,
    upstream: &'a Upstream,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
