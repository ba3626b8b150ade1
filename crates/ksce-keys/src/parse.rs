//! authorized_keys parsing and canonical re-encoding.
//!
//! Pipeline:
//!   raw &str
//!     └─ split on '\n', strip '\r', drop blanks and '#' comments
//!          └─ Entry::from_str()         → options + PublicKey
//!               └─ encode()              → base64(wire blob)

use std::str::FromStr as _;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use ssh_key::{PublicKey, authorized_keys::Entry};

use crate::error::{Error, Result};

/// Parse every entry of an authorized_keys document, all or nothing.
pub(crate) fn parse_authorized_keys(input: &str) -> Result<Vec<String>> {
  let mut keys = Vec::new();

  for (idx, raw) in input.split('\n').enumerate() {
    let line = raw.strip_suffix('\r').unwrap_or(raw).trim();
    if line.is_empty() || line.starts_with('#') {
      continue;
    }

    let entry = Entry::from_str(line)
      .map_err(|source| Error::MalformedKey { line: idx + 1, source })?;
    let encoded = encode(entry.public_key())
      .map_err(|source| Error::MalformedKey { line: idx + 1, source })?;
    keys.push(encoded);
  }

  Ok(keys)
}

fn encode(key: &PublicKey) -> Result<String, ssh_key::Error> {
  Ok(B64.encode(key.to_bytes()?))
}
