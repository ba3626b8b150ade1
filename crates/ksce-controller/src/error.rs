//! Error type for the reconciliation layer.

use ksce_core::{Classify, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("kubernetes error: {0}")]
  Kube(#[from] kube::Error),

  /// The watched object cannot be turned into a credential object.
  #[error("secret is missing metadata.{0}")]
  InvalidObject(&'static str),

  #[error("registry error: {source}")]
  Registry {
    kind:   ErrorKind,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },
}

impl Error {
  /// Wrap a registry failure, keeping its classification.
  pub fn registry<E>(e: E) -> Self
  where
    E: std::error::Error + Classify + Send + Sync + 'static,
  {
    Self::Registry { kind: e.kind(), source: Box::new(e) }
  }
}

impl Classify for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Self::Kube(_) => ErrorKind::Transient,
      Self::InvalidObject(_) => ErrorKind::Malformed,
      Self::Registry { kind, .. } => *kind,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
