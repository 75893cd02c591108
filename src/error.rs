//! Error taxonomy for synchronization steps.
//!
//! Every per-entity failure is classified by [`SyncError::disposition`] so the
//! driver can decide between re-queueing, dropping, or aborting the whole run.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::filesize::FileSize;

pub type Result<T, E = SyncError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SyncError {
  /// Navigation or interaction with the source UI failed.
  #[error("source interaction failed: {0}")]
  TransientUi(String),

  /// The entity is not part of the current enumeration.
  #[error("{kind} {id} not found at the source")]
  NotFound { kind: &'static str, id: String },

  #[error("download did not finish within {0:?}")]
  DownloadTimeout(Duration),

  #[error("no download activity detected after {0:?}")]
  DownloadNotDetected(Duration),

  #[error("downloaded {path} is {actual} but {expected} was expected")]
  SizeMismatch {
    path: PathBuf,
    expected: FileSize,
    actual: FileSize,
  },

  #[error("failed to read cache metadata {path}: {source}")]
  CacheRead {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to write cache metadata {path}: {source}")]
  CacheWrite {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("invalid glob pattern {pattern:?}: {source}")]
  Pattern {
    pattern: String,
    #[source]
    source: glob::PatternError,
  },

  #[error("failed to read notes export {path}: {source}")]
  Notes {
    path: PathBuf,
    #[source]
    source: csv::Error,
  },

  #[error("failed to read sketch archive {path}: {source}")]
  Sketches {
    path: PathBuf,
    #[source]
    source: zip::result::ZipError,
  },

  /// Filesystem failure. Abort-class on its own; the driver demotes it to a
  /// retry when the cache and download directories still accept writes.
  #[error(transparent)]
  Io(#[from] std::io::Error),
}

/// What the driver should do with an entity whose step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
  /// Try again on the next pass while attempts remain.
  Retry,
  /// Drop the entity for this run without retrying.
  Skip,
  /// Stop the run.
  Abort,
}

impl SyncError {
  pub fn transient(message: impl Into<String>) -> Self {
    Self::TransientUi(message.into())
  }

  pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
    Self::NotFound {
      kind,
      id: id.into(),
    }
  }

  pub fn disposition(&self) -> Disposition {
    match self {
      Self::TransientUi(_)
      | Self::DownloadTimeout(_)
      | Self::DownloadNotDetected(_)
      | Self::SizeMismatch { .. } => Disposition::Retry,
      Self::NotFound { .. }
      | Self::CacheRead { .. }
      | Self::CacheWrite { .. }
      | Self::Pattern { .. }
      | Self::Notes { .. }
      | Self::Sketches { .. } => Disposition::Skip,
      Self::Io(_) => Disposition::Abort,
    }
  }

  pub fn is_retryable(&self) -> bool {
    self.disposition() == Disposition::Retry
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_transfer_failures_are_retryable() {
    assert!(SyncError::DownloadTimeout(Duration::from_secs(5)).is_retryable());
    assert!(SyncError::DownloadNotDetected(Duration::from_secs(10)).is_retryable());
    assert!(SyncError::transient("menu vanished").is_retryable());
  }

  #[test]
  fn test_drift_and_corruption_are_skipped() {
    assert_eq!(
      SyncError::not_found("review", "42").disposition(),
      Disposition::Skip
    );
    let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let err = SyncError::CacheRead {
      path: PathBuf::from("review_metadata.json"),
      source,
    };
    assert_eq!(err.disposition(), Disposition::Skip);
  }

  #[test]
  fn test_bad_entity_data_is_skipped() {
    let err = SyncError::Pattern {
      pattern: "*.m[ov".into(),
      source: glob::Pattern::new("*.m[ov").unwrap_err(),
    };
    assert_eq!(err.disposition(), Disposition::Skip);
  }

  #[test]
  fn test_io_aborts() {
    let err = SyncError::from(std::io::Error::new(
      std::io::ErrorKind::PermissionDenied,
      "read-only",
    ));
    assert_eq!(err.disposition(), Disposition::Abort);
  }
}
