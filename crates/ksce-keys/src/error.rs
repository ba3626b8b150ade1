//! Error types for the key material parser.

use ksce_core::{Classify, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("malformed public key on line {line}: {source}")]
  MalformedKey {
    line:   usize,
    #[source]
    source: ssh_key::Error,
  },

  #[error("field {field:?} is not valid UTF-8")]
  InvalidUtf8 { field: String },

  #[error("private key field {0:?} is missing")]
  MissingPrivateKey(String),
}

impl Classify for Error {
  fn kind(&self) -> ErrorKind { ErrorKind::Malformed }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
