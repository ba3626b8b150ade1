//! Reconciliation layer that keeps the SSH proxy's routing database in step
//! with Kubernetes secrets.
//!
//! A secret named after an SSH-exposing service carries the proxy's private
//! key and the downstream public keys allowed through it. Each create, update
//! or delete of such a secret is turned into a register or unregister call on
//! an [`UpstreamRegistry`](ksce_core::UpstreamRegistry).

pub mod endpoint;
pub mod error;
pub mod handler;
pub mod object;
pub mod pump;

pub use error::{Error, Result};
pub use handler::SecretHandler;
pub use object::{CredentialObject, SecretEvent};
pub use pump::{EventPump, RetryPolicy};

use std::{path::PathBuf, time::Duration};

use ksce_core::PublicKeyPolicy;
use ksce_keys::{DEFAULT_PRIVATE_KEY_FIELD, DEFAULT_PUBLIC_KEYS_FIELD, ParseOptions};
use serde::Deserialize;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime configuration, deserialised from `config.toml` and `KSCE_*`
/// environment variables.
#[derive(Deserialize, Clone, Debug)]
pub struct ControllerConfig {
  #[serde(default = "default_store_path")]
  pub store_path:          PathBuf,
  /// Watch a single namespace instead of the whole cluster.
  #[serde(default)]
  pub namespace:           Option<String>,
  #[serde(default)]
  pub label_selector:      Option<String>,
  #[serde(default = "default_private_key_field")]
  pub private_key_field:   String,
  #[serde(default = "default_public_keys_field")]
  pub public_keys_field:   String,
  /// Clear the routing tables before the initial list replays every secret.
  #[serde(default = "default_true")]
  pub truncate_on_start:   bool,
  #[serde(default)]
  pub require_private_key: bool,
  #[serde(default)]
  pub public_key_policy:   PublicKeyPolicy,
  #[serde(default = "default_max_retries")]
  pub max_retries:         u32,
  #[serde(default = "default_retry_base_ms")]
  pub retry_base_ms:       u64,
}

fn default_store_path() -> PathBuf { PathBuf::from("sshpiper.db") }
fn default_private_key_field() -> String { DEFAULT_PRIVATE_KEY_FIELD.to_string() }
fn default_public_keys_field() -> String { DEFAULT_PUBLIC_KEYS_FIELD.to_string() }
fn default_true() -> bool { true }
fn default_max_retries() -> u32 { 5 }
fn default_retry_base_ms() -> u64 { 500 }

impl ControllerConfig {
  pub fn parse_options(&self) -> ParseOptions {
    ParseOptions {
      private_key_field:   self.private_key_field.clone(),
      public_keys_field:   self.public_keys_field.clone(),
      require_private_key: self.require_private_key,
    }
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy {
      max_retries: self.max_retries,
      base:        Duration::from_millis(self.retry_base_ms),
    }
  }
}
