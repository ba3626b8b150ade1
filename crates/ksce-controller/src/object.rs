//! Typed credential objects and the events that carry them.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;

use crate::Error;

/// The parts of a secret the reconciler reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialObject {
  pub name:             String,
  pub namespace:        String,
  /// Changes whenever the stored object changes.
  pub resource_version: Option<String>,
  pub data:             BTreeMap<String, Vec<u8>>,
}

/// `namespace/name` of a watched object.
pub type ObjectKey = (String, String);

impl CredentialObject {
  pub fn key(&self) -> ObjectKey { (self.namespace.clone(), self.name.clone()) }

  /// Whether `other` is a different revision of this object.
  pub fn revision_differs(&self, other: &Self) -> bool {
    self.resource_version != other.resource_version
  }
}

impl TryFrom<Secret> for CredentialObject {
  type Error = Error;

  fn try_from(secret: Secret) -> Result<Self, Self::Error> {
    let meta = secret.metadata;
    let name = meta.name.ok_or(Error::InvalidObject("name"))?;
    let namespace = meta.namespace.ok_or(Error::InvalidObject("namespace"))?;
    let data = secret
      .data
      .unwrap_or_default()
      .into_iter()
      .map(|(k, v)| (k, v.0))
      .collect();

    Ok(Self {
      name,
      namespace,
      resource_version: meta.resource_version,
      data,
    })
  }
}

/// A change to a credential object, as delivered to the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretEvent {
  Created(CredentialObject),
  Updated {
    old: CredentialObject,
    new: CredentialObject,
  },
  Deleted(CredentialObject),
}

impl SecretEvent {
  /// The object the event is about (the new state for updates).
  pub fn object(&self) -> &CredentialObject {
    match self {
      Self::Created(obj) | Self::Deleted(obj) => obj,
      Self::Updated { new, .. } => new,
    }
  }

  pub fn verb(&self) -> &'static str {
    match self {
      Self::Created(_) => "create",
      Self::Updated { .. } => "update",
      Self::Deleted(_) => "delete",
    }
  }
}
