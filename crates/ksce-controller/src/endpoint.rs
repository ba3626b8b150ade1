//! Resolution of the network endpoint that goes with a credential object.

use std::future::Future;

use k8s_openapi::api::core::v1::Service;
use kube::{Api, Client};

use crate::Result;

/// Port a service must expose to be routed through the proxy.
pub const SSH_SERVICE_PORT: i32 = 22;

/// A routable SSH endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
  pub address: String,
}

impl Endpoint {
  /// Accept a service only if it exposes the SSH port and has a cluster IP.
  pub fn from_service(service: &Service) -> Option<Self> {
    let spec = service.spec.as_ref()?;
    let exposes_ssh = spec
      .ports
      .iter()
      .flatten()
      .any(|p| p.port == SSH_SERVICE_PORT);
    if !exposes_ssh {
      return None;
    }

    match spec.cluster_ip.as_deref() {
      // Headless services have no address to route to.
      Some("") | Some("None") | None => None,
      Some(ip) => Some(Self { address: ip.to_string() }),
    }
  }
}

/// Looks up the endpoint for a credential object by `(name, namespace)`.
pub trait EndpointResolver: Send + Sync {
  /// Returns `None` when no SSH-capable endpoint exists yet.
  fn resolve<'a>(
    &'a self,
    name: &'a str,
    namespace: &'a str,
  ) -> impl Future<Output = Result<Option<Endpoint>>> + Send + 'a;
}

/// Resolves endpoints from Kubernetes services of the same name.
#[derive(Clone)]
pub struct KubeEndpointResolver {
  client: Client,
}

impl KubeEndpointResolver {
  pub fn new(client: Client) -> Self { Self { client } }
}

impl EndpointResolver for KubeEndpointResolver {
  async fn resolve(&self, name: &str, namespace: &str) -> Result<Option<Endpoint>> {
    let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
    let service = services.get_opt(name).await?;
    Ok(service.as_ref().and_then(Endpoint::from_service))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn service(json: serde_json::Value) -> Service { serde_json::from_value(json).unwrap() }

  #[test]
  fn ssh_service_resolves_to_cluster_ip() {
    let svc = service(serde_json::json!({
      "metadata": { "name": "svc-a" },
      "spec": {
        "clusterIP": "10.0.0.5",
        "ports": [{ "name": "http", "port": 80 }, { "name": "ssh", "port": 22 }]
      }
    }));
    assert_eq!(
      Endpoint::from_service(&svc),
      Some(Endpoint { address: "10.0.0.5".into() })
    );
  }

  #[test]
  fn service_without_ssh_port_is_ignored() {
    let svc = service(serde_json::json!({
      "metadata": { "name": "svc-a" },
      "spec": { "clusterIP": "10.0.0.5", "ports": [{ "port": 2222 }] }
    }));
    assert_eq!(Endpoint::from_service(&svc), None);
  }

  #[test]
  fn headless_service_is_ignored() {
    let svc = service(serde_json::json!({
      "metadata": { "name": "svc-a" },
      "spec": { "clusterIP": "None", "ports": [{ "port": 22 }] }
    }));
    assert_eq!(Endpoint::from_service(&svc), None);
  }
}
