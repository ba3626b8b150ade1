//! Create, update and delete handling for credential objects.
//!
//! Failures split into two groups. Malformed payloads, missing endpoints and
//! rows that are already gone cannot change until a new event arrives, so
//! they are logged and absorbed here. Backend failures are returned so the
//! caller can redeliver the event.

use std::sync::Arc;

use ksce_core::{Classify, ErrorKind, Upstream, UpstreamRegistry};
use ksce_keys::{KeyMaterial, ParseOptions, parse_keys};
use tracing::{debug, info, warn};

use crate::{
  Error, Result,
  endpoint::{Endpoint, EndpointResolver},
  object::{CredentialObject, SecretEvent},
};

/// Turns secret events into registry calls.
pub struct SecretHandler<R, E> {
  registry: Arc<R>,
  resolver: Arc<E>,
  options:  ParseOptions,
}

impl<R, E> Clone for SecretHandler<R, E> {
  fn clone(&self) -> Self {
    Self {
      registry: Arc::clone(&self.registry),
      resolver: Arc::clone(&self.resolver),
      options:  self.options.clone(),
    }
  }
}

impl<R, E> SecretHandler<R, E>
where
  R: UpstreamRegistry,
  E: EndpointResolver,
{
  pub fn new(registry: Arc<R>, resolver: Arc<E>, options: ParseOptions) -> Self {
    Self { registry, resolver, options }
  }

  /// Dispatch one event. Only retryable failures are returned.
  pub async fn handle(&self, event: &SecretEvent) -> Result<()> {
    match event {
      SecretEvent::Created(obj) => self.on_create(obj).await,
      SecretEvent::Updated { old, new } => self.on_update(old, new).await,
      SecretEvent::Deleted(obj) => self.on_delete(obj).await,
    }
  }

  pub async fn on_create(&self, obj: &CredentialObject) -> Result<()> {
    let Some(endpoint) = self.endpoint_for(obj).await else {
      return Ok(());
    };
    let Some(keys) = self.keys_for(obj) else {
      return Ok(());
    };

    let upstream = Upstream::new(&obj.name)
      .with_address(endpoint.address)
      .with_keys(keys.private_key, keys.public_keys);

    match self.registry.register(&upstream).await {
      Ok(()) => Ok(()),
      Err(e) if e.kind().is_retryable() => Err(Error::registry(e)),
      Err(e) => {
        warn!(namespace = %obj.namespace, name = %obj.name, error = %e, "register rejected, dropping event");
        Ok(())
      }
    }
  }

  /// Re-register only when the stored object actually changed.
  pub async fn on_update(&self, old: &CredentialObject, new: &CredentialObject) -> Result<()> {
    if !old.revision_differs(new) {
      debug!(namespace = %new.namespace, name = %new.name, "revision unchanged, nothing to do");
      return Ok(());
    }
    self.on_create(new).await
  }

  pub async fn on_delete(&self, obj: &CredentialObject) -> Result<()> {
    let Some(keys) = self.keys_for(obj) else {
      return Ok(());
    };
    let upstream = Upstream::new(&obj.name).with_keys(keys.private_key, keys.public_keys);

    match self.registry.unregister(&upstream).await {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == ErrorKind::NotFound => {
        info!(namespace = %obj.namespace, name = %obj.name, error = %e, "nothing registered, skipping cleanup");
        Ok(())
      }
      Err(e) if e.kind().is_retryable() => Err(Error::registry(e)),
      Err(e) => {
        warn!(namespace = %obj.namespace, name = %obj.name, error = %e, "unregister rejected, dropping event");
        Ok(())
      }
    }
  }

  async fn endpoint_for(&self, obj: &CredentialObject) -> Option<Endpoint> {
    match self.resolver.resolve(&obj.name, &obj.namespace).await {
      Ok(Some(endpoint)) => Some(endpoint),
      Ok(None) => {
        debug!(namespace = %obj.namespace, name = %obj.name, "no ssh service yet");
        None
      }
      Err(e) => {
        warn!(namespace = %obj.namespace, name = %obj.name, error = %e, "service lookup failed");
        None
      }
    }
  }

  fn keys_for(&self, obj: &CredentialObject) -> Option<KeyMaterial> {
    match parse_keys(&obj.data, &self.options) {
      Ok(keys) => Some(keys),
      Err(e) => {
        warn!(namespace = %obj.namespace, name = %obj.name, error = %e, "unusable key material");
        None
      }
    }
  }
}
