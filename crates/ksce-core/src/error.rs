//! Error classification shared by every crate in the workspace.
//!
//! Each crate keeps its own concrete error enum; this module only fixes the
//! vocabulary used to decide whether a failure is worth retrying.

use thiserror::Error;

/// Coarse category of a failure, independent of where it was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// An expected row or object is absent. Never retried; for unregister it
  /// means there is nothing left to clean up.
  NotFound,
  /// The input could not be parsed or has the wrong shape. Terminal for the
  /// event that carried it.
  Malformed,
  /// The backend failed mid-step. Retryable by redelivery.
  Transient,
  /// One or more best-effort row deletions failed.
  PartialDeletion,
}

impl ErrorKind {
  /// Whether redelivering the same event could succeed.
  pub fn is_retryable(self) -> bool {
    matches!(self, Self::Transient | Self::PartialDeletion)
  }
}

/// Implemented by every error type that crosses a crate boundary.
pub trait Classify {
  fn kind(&self) -> ErrorKind;

  fn is_not_found(&self) -> bool { self.kind() == ErrorKind::NotFound }
}

/// Raised when an [`Upstream`](crate::Upstream) is missing a field a
/// registry operation depends on.
#[derive(Debug, Error)]
#[error("upstream {name:?} is missing {field}")]
pub struct IncompleteUpstream {
  pub name:  String,
  pub field: &'static str,
}

impl Classify for IncompleteUpstream {
  fn kind(&self) -> ErrorKind { ErrorKind::Malformed }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn only_backend_failures_are_retryable() {
    assert!(ErrorKind::Transient.is_retryable());
    assert!(ErrorKind::PartialDeletion.is_retryable());
    assert!(!ErrorKind::NotFound.is_retryable());
    assert!(!ErrorKind::Malformed.is_retryable());
  }
}
