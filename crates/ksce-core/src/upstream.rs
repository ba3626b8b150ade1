//! The canonical in-memory record of one routable SSH target.
//!
//! An `Upstream` is never persisted as-is. It is rebuilt from a credential
//! object on every reconciliation and projected onto the relational tables by
//! an [`UpstreamRegistry`](crate::UpstreamRegistry).

use crate::error::IncompleteUpstream;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Upstream {
  /// Stable identity, taken from the credential object's name.
  pub name:        String,
  pub username:    String,
  /// Network address of the workload. Empty until the endpoint is resolved.
  pub address:     String,
  /// Private key the proxy presents to the upstream. May be empty.
  pub private_key: String,
  /// Authorized downstream keys, base64 of the SSH wire blob.
  pub public_keys: Vec<String>,
}

impl Upstream {
  /// Build an upstream whose username mirrors its name, as the proxy expects.
  pub fn new(name: impl Into<String>) -> Self {
    let name = name.into();
    Self {
      username: name.clone(),
      name,
      ..Self::default()
    }
  }

  pub fn with_address(mut self, address: impl Into<String>) -> Self {
    self.address = address.into();
    self
  }

  pub fn with_keys(mut self, private_key: String, public_keys: Vec<String>) -> Self {
    self.private_key = private_key;
    self.public_keys = public_keys;
    self
  }

  /// Registration needs a routable address; unregistration does not.
  pub fn require_address(&self) -> Result<&str, IncompleteUpstream> {
    if self.address.is_empty() {
      return Err(IncompleteUpstream {
        name:  self.name.clone(),
        field: "address",
      });
    }
    Ok(&self.address)
  }
}
