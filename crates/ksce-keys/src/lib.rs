//! Key material parser for credential objects.
//!
//! Turns the raw payload of a credential object into a private key and a list
//! of canonical downstream public keys. Pure synchronous; no I/O.
//!
//! # Quick start
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use ksce_keys::{ParseOptions, parse_keys};
//!
//! let mut data = BTreeMap::new();
//! data.insert("sshpiper_id_rsa".to_string(), b"-----BEGIN ...".to_vec());
//! data.insert(
//!   "downstream_id_rsa.pub".to_string(),
//!   b"ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAA... alice\n".to_vec(),
//! );
//! let keys = parse_keys(&data, &ParseOptions::default()).unwrap();
//! println!("{} downstream keys", keys.public_keys.len());
//! ```

pub mod error;
mod parse;

pub use error::{Error, Result};

use std::collections::BTreeMap;

/// Secret field holding the proxy's private key.
pub const DEFAULT_PRIVATE_KEY_FIELD: &str = "sshpiper_id_rsa";
/// Secret field holding newline-delimited authorized downstream keys.
pub const DEFAULT_PUBLIC_KEYS_FIELD: &str = "downstream_id_rsa.pub";

// ─── Public types
// ─────────────────────────────────────────────────────────────

/// The canonical key set extracted from one credential object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyMaterial {
  /// The private key exactly as stored; empty when not provisioned.
  pub private_key: String,
  /// Base64 of each key's SSH wire blob, in source order.
  pub public_keys: Vec<String>,
}

/// Where to find the key fields and how strict to be about them.
#[derive(Debug, Clone)]
pub struct ParseOptions {
  pub private_key_field:   String,
  pub public_keys_field:   String,
  /// Reject payloads with no private-key field instead of yielding an empty
  /// key.
  pub require_private_key: bool,
}

impl Default for ParseOptions {
  fn default() -> Self {
    Self {
      private_key_field:   DEFAULT_PRIVATE_KEY_FIELD.to_string(),
      public_keys_field:   DEFAULT_PUBLIC_KEYS_FIELD.to_string(),
      require_private_key: false,
    }
  }
}

// ─── Public API
// ───────────────────────────────────────────────────────────────

/// Extract the key set from a credential object's payload.
///
/// Fails as a whole if any non-empty, non-comment public-key line does not
/// parse; no partial result is ever returned.
pub fn parse_keys(
  data:    &BTreeMap<String, Vec<u8>>,
  options: &ParseOptions,
) -> Result<KeyMaterial> {
  let private_key = match data.get(&options.private_key_field) {
    Some(bytes) => utf8_field(bytes, &options.private_key_field)?.to_string(),
    None if options.require_private_key => {
      return Err(Error::MissingPrivateKey(options.private_key_field.clone()));
    }
    None => String::new(),
  };

  let public_keys = match data.get(&options.public_keys_field) {
    Some(bytes) => {
      parse::parse_authorized_keys(utf8_field(bytes, &options.public_keys_field)?)?
    }
    None => Vec::new(),
  };

  Ok(KeyMaterial { private_key, public_keys })
}

fn utf8_field<'a>(bytes: &'a [u8], field: &str) -> Result<&'a str> {
  std::str::from_utf8(bytes).map_err(|_| Error::InvalidUtf8 {
    field: field.to_string(),
  })
}
