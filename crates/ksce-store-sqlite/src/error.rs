//! Error type for `ksce-store-sqlite`.

use ksce_core::{Classify, ErrorKind, error::IncompleteUpstream};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  /// A row the operation depends on does not exist.
  #[error("no {table} row for {key:?}")]
  NotFound { table: &'static str, key: String },

  /// Some rows of a best-effort delete loop could not be removed.
  #[error("failed to delete {} row(s) from {table}: {}", failures.len(), failures.join("; "))]
  PartialDeletion {
    table:    &'static str,
    failures: Vec<String>,
  },

  #[error(transparent)]
  Incomplete(#[from] IncompleteUpstream),
}

impl From<rusqlite::Error> for Error {
  fn from(e: rusqlite::Error) -> Self { Self::Database(e.into()) }
}

impl Classify for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Self::Database(_) => ErrorKind::Transient,
      Self::NotFound { .. } => ErrorKind::NotFound,
      Self::PartialDeletion { .. } => ErrorKind::PartialDeletion,
      Self::Incomplete(e) => e.kind(),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
