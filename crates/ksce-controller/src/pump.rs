//! Feeds watch events for secrets into a [`SecretHandler`].
//!
//! The Kubernetes watcher reports only the current state of an object. The
//! pump remembers the last state it saw per object so it can hand the handler
//! proper `Updated { old, new }` pairs, and it synthesizes deletions for
//! objects that disappear across a re-list. Events are handled one at a time,
//! in arrival order, which serializes work per object.

use std::{
  collections::{HashMap, HashSet},
  time::Duration,
};

use futures::{Stream, StreamExt as _, pin_mut};
use k8s_openapi::api::core::v1::Secret;
use ksce_core::{Classify as _, UpstreamRegistry};
use kube::runtime::watcher;
use tracing::{error, info, warn};

use crate::{
  endpoint::EndpointResolver,
  handler::SecretHandler,
  object::{CredentialObject, ObjectKey, SecretEvent},
};

/// Upper bound for a single retry delay.
const MAX_DELAY: Duration = Duration::from_secs(30);

/// Bounded exponential backoff for retryable handler failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
  pub max_retries: u32,
  pub base:        Duration,
}

impl RetryPolicy {
  /// Delay before retry number `attempt` (zero-based): `base * 2^attempt`,
  /// capped.
  pub fn delay(&self, attempt: u32) -> Duration {
    self
      .base
      .checked_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX))
      .unwrap_or(MAX_DELAY)
      .min(MAX_DELAY)
  }
}

pub struct EventPump<R, E> {
  handler: SecretHandler<R, E>,
  retry:   RetryPolicy,
  known:   HashMap<ObjectKey, CredentialObject>,
  /// Keys seen since the last `Init`, while a re-list is in progress.
  relist:  Option<HashSet<ObjectKey>>,
}

impl<R, E> EventPump<R, E>
where
  R: UpstreamRegistry,
  E: EndpointResolver,
{
  pub fn new(handler: SecretHandler<R, E>, retry: RetryPolicy) -> Self {
    Self {
      handler,
      retry,
      known: HashMap::new(),
      relist: None,
    }
  }

  /// Drain `stream` until it ends.
  pub async fn run<S>(mut self, stream: S)
  where
    S: Stream<Item = Result<watcher::Event<Secret>, watcher::Error>>,
  {
    pin_mut!(stream);

    while let Some(item) = stream.next().await {
      match item {
        Ok(event) => {
          for event in self.translate(event) {
            self.dispatch(&event).await;
          }
        }
        Err(e) => warn!(error = %e, "error watching secrets"),
      }
    }

    warn!("secret watch stream ended");
  }

  /// Turn one watcher event into zero or more handler events.
  pub fn translate(&mut self, event: watcher::Event<Secret>) -> Vec<SecretEvent> {
    match event {
      watcher::Event::Init => {
        self.relist = Some(HashSet::new());
        Vec::new()
      }
      watcher::Event::InitApply(secret) => {
        let Some(obj) = convert(secret) else { return Vec::new() };
        if let Some(seen) = self.relist.as_mut() {
          seen.insert(obj.key());
        }
        vec![self.apply(obj)]
      }
      watcher::Event::InitDone => {
        let Some(seen) = self.relist.take() else { return Vec::new() };
        let gone: Vec<ObjectKey> = self
          .known
          .keys()
          .filter(|key| !seen.contains(*key))
          .cloned()
          .collect();
        gone
          .into_iter()
          .filter_map(|key| self.known.remove(&key))
          .map(SecretEvent::Deleted)
          .collect()
      }
      watcher::Event::Apply(secret) => match convert(secret) {
        Some(obj) => vec![self.apply(obj)],
        None => Vec::new(),
      },
      watcher::Event::Delete(secret) => match convert(secret) {
        Some(obj) => {
          self.known.remove(&obj.key());
          vec![SecretEvent::Deleted(obj)]
        }
        None => Vec::new(),
      },
    }
  }

  fn apply(&mut self, obj: CredentialObject) -> SecretEvent {
    match self.known.insert(obj.key(), obj.clone()) {
      Some(old) => SecretEvent::Updated { old, new: obj },
      None => SecretEvent::Created(obj),
    }
  }

  /// Handle `event`, retrying retryable failures with backoff.
  pub async fn dispatch(&self, event: &SecretEvent) {
    let obj = event.object();
    let mut attempt = 0;

    loop {
      match self.handler.handle(event).await {
        Ok(()) => return,
        Err(e) if e.kind().is_retryable() && attempt < self.retry.max_retries => {
          let delay = self.retry.delay(attempt);
          warn!(
            namespace = %obj.namespace,
            name = %obj.name,
            verb = event.verb(),
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            error = %e,
            "reconcile failed, retrying"
          );
          tokio::time::sleep(delay).await;
          attempt += 1;
        }
        Err(e) => {
          error!(
            namespace = %obj.namespace,
            name = %obj.name,
            verb = event.verb(),
            error = %e,
            "reconcile failed, giving up"
          );
          return;
        }
      }
    }
  }
}

fn convert(secret: Secret) -> Option<CredentialObject> {
  match CredentialObject::try_from(secret) {
    Ok(obj) => Some(obj),
    Err(e) => {
      info!(error = %e, "ignoring secret");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use std::{sync::Arc, time::Duration};

  use k8s_openapi::api::core::v1::Secret;
  use ksce_core::ErrorKind;
  use ksce_keys::ParseOptions;
  use kube::runtime::watcher;

  use super::{EventPump, RetryPolicy};
  use crate::{
    SecretEvent, SecretHandler,
    handler::test_support::{ALICE, Call, RecordingRegistry, StaticResolver, credential},
  };

  fn secret(name: &str, version: &str) -> Secret {
    serde_json::from_value(serde_json::json!({
      "metadata": { "name": name, "namespace": "ssh", "resourceVersion": version },
    }))
    .unwrap()
  }

  fn pump(
    registry: RecordingRegistry,
  ) -> (EventPump<RecordingRegistry, StaticResolver>, Arc<RecordingRegistry>) {
    let registry = Arc::new(registry);
    let handler = SecretHandler::new(
      registry.clone(),
      Arc::new(StaticResolver::at("10.0.0.5")),
      ParseOptions::default(),
    );
    let retry = RetryPolicy { max_retries: 3, base: Duration::from_millis(1) };
    (EventPump::new(handler, retry), registry)
  }

  #[test]
  fn retry_delay_doubles_and_caps() {
    let policy = RetryPolicy { max_retries: 10, base: Duration::from_millis(100) };
    assert_eq!(policy.delay(0), Duration::from_millis(100));
    assert_eq!(policy.delay(3), Duration::from_millis(800));
    assert_eq!(policy.delay(20), Duration::from_secs(30));
    assert_eq!(policy.delay(40), Duration::from_secs(30));
  }

  #[test]
  fn apply_becomes_create_then_update() {
    let (mut p, _) = pump(RecordingRegistry::default());

    let first = p.translate(watcher::Event::Apply(secret("svc-a", "1")));
    assert!(matches!(first.as_slice(), [SecretEvent::Created(o)] if o.name == "svc-a"));

    let second = p.translate(watcher::Event::Apply(secret("svc-a", "2")));
    match second.as_slice() {
      [SecretEvent::Updated { old, new }] => {
        assert_eq!(old.resource_version.as_deref(), Some("1"));
        assert_eq!(new.resource_version.as_deref(), Some("2"));
      }
      other => panic!("expected update, got {other:?}"),
    }
  }

  #[test]
  fn delete_forgets_the_object() {
    let (mut p, _) = pump(RecordingRegistry::default());
    p.translate(watcher::Event::Apply(secret("svc-a", "1")));

    let deleted = p.translate(watcher::Event::Delete(secret("svc-a", "1")));
    assert!(matches!(deleted.as_slice(), [SecretEvent::Deleted(_)]));

    let again = p.translate(watcher::Event::Apply(secret("svc-a", "3")));
    assert!(matches!(again.as_slice(), [SecretEvent::Created(_)]));
  }

  #[test]
  fn relist_synthesizes_deletes_for_vanished_objects() {
    let (mut p, _) = pump(RecordingRegistry::default());
    p.translate(watcher::Event::Apply(secret("svc-a", "1")));
    p.translate(watcher::Event::Apply(secret("svc-b", "1")));

    assert!(p.translate(watcher::Event::Init).is_empty());
    let replayed = p.translate(watcher::Event::InitApply(secret("svc-a", "1")));
    assert!(matches!(replayed.as_slice(), [SecretEvent::Updated { .. }]));

    let done = p.translate(watcher::Event::InitDone);
    match done.as_slice() {
      [SecretEvent::Deleted(o)] => assert_eq!(o.name, "svc-b"),
      other => panic!("expected one delete, got {other:?}"),
    }
  }

  #[test]
  fn secret_without_namespace_is_skipped() {
    let (mut p, _) = pump(RecordingRegistry::default());
    let orphan: Secret =
      serde_json::from_value(serde_json::json!({ "metadata": { "name": "svc-a" } })).unwrap();
    assert!(p.translate(watcher::Event::Apply(orphan)).is_empty());
  }

  #[tokio::test]
  async fn dispatch_retries_transient_failures() {
    let (p, registry) = pump(RecordingRegistry::failing(ErrorKind::Transient, 2));

    p.dispatch(&SecretEvent::Created(credential("svc-a", "1", ALICE))).await;

    let calls = registry.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|c| matches!(c, Call::Register(_))));
  }

  #[tokio::test]
  async fn dispatch_gives_up_after_max_retries() {
    let (p, registry) = pump(RecordingRegistry::failing(ErrorKind::Transient, 100));

    p.dispatch(&SecretEvent::Created(credential("svc-a", "1", ALICE))).await;

    assert_eq!(registry.calls().len(), 4);
  }

  #[tokio::test]
  async fn dispatch_does_not_retry_not_found() {
    let (p, registry) = pump(RecordingRegistry::failing(ErrorKind::NotFound, 100));

    p.dispatch(&SecretEvent::Deleted(credential("svc-a", "1", ALICE))).await;

    assert_eq!(registry.calls().len(), 1);
  }

  #[tokio::test]
  async fn run_drains_stream_in_order() {
    let (p, registry) = pump(RecordingRegistry::default());
    let mut a1 = secret("svc-a", "1");
    a1.data = Some(
      [(
        "downstream_id_rsa.pub".to_string(),
        k8s_openapi::ByteString(ALICE.as_bytes().to_vec()),
      )]
      .into_iter()
      .collect(),
    );
    let events: Vec<Result<watcher::Event<Secret>, watcher::Error>> = vec![
      Ok(watcher::Event::Apply(a1.clone())),
      Ok(watcher::Event::Apply(a1.clone())),
      Ok(watcher::Event::Delete(a1)),
    ];

    p.run(futures::stream::iter(events)).await;

    let calls = registry.calls();
    assert_eq!(calls.len(), 2, "{calls:?}");
    assert!(matches!(calls[0], Call::Register(_)));
    assert!(matches!(calls[1], Call::Unregister(_)));
  }
}
