//! Retry queue over entity ids.
//!
//! Each pass runs the step once for every queued id. Retryable failures go
//! back on the queue until an id has used up `max_attempts`; skips and
//! exhausted ids end up in the [`StepReport`]. Only an abort-class error stops
//! the run early.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::thread;
use tracing::{info, warn};

use super::context::SyncContext;
use crate::error::{Disposition, Result, SyncError};
use crate::source::ReviewSource;

/// An id the driver gave up on.
#[derive(Debug)]
pub struct Failure {
  pub id: String,
  pub attempts: u32,
  pub error: SyncError,
}

/// Outcome of running one step over a set of ids.
#[derive(Debug, Default)]
pub struct StepReport {
  pub step: &'static str,
  pub succeeded: Vec<String>,
  pub skipped: Vec<Failure>,
  pub failed: Vec<Failure>,
  pub passes: u32,
}

impl StepReport {
  fn new(step: &'static str) -> Self {
    Self {
      step,
      ..Self::default()
    }
  }

  pub fn is_clean(&self) -> bool {
    self.failed.is_empty() && self.skipped.is_empty()
  }

  pub fn failed_ids(&self) -> Vec<&str> {
    self.failed.iter().map(|f| f.id.as_str()).collect()
  }

  pub fn skipped_ids(&self) -> Vec<&str> {
    self.skipped.iter().map(|f| f.id.as_str()).collect()
  }
}

impl fmt::Display for StepReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}: {} ok, {} skipped, {} failed",
      self.step,
      self.succeeded.len(),
      self.skipped.len(),
      self.failed.len()
    )?;
    for failure in self.skipped.iter().chain(&self.failed) {
      write!(f, "\n  {} ({} attempts): {}", failure.id, failure.attempts, failure.error)?;
    }
    Ok(())
  }
}

/// Run `op` for every id until each one succeeded, was skipped, or ran out
/// of attempts.
pub fn run_step<S, F>(
  ctx: &mut SyncContext<S>,
  step: &'static str,
  ids: Vec<String>,
  mut op: F,
) -> Result<StepReport>
where
  S: ReviewSource,
  F: FnMut(&mut SyncContext<S>, &str) -> Result<()>,
{
  let mut report = StepReport::new(step);
  let max_attempts = ctx.sync_config().max_attempts.max(1);
  let checkpoint = ctx.sync_config().checkpoint_interval;
  let pass_delay = ctx.sync_config().pass_delay;

  let mut seen = HashSet::new();
  let mut queue: VecDeque<String> = ids.into_iter().filter(|id| seen.insert(id.clone())).collect();
  let mut attempts: HashMap<String, u32> = HashMap::new();

  while !queue.is_empty() {
    if report.passes > 0 && !pass_delay.is_zero() {
      thread::sleep(pass_delay);
    }
    report.passes += 1;
    info!(step, pass = report.passes, queued = queue.len(), "Starting pass");

    let mut requeue = Vec::new();
    for (n, id) in queue.drain(..).enumerate() {
      if checkpoint > 0 && (n + 1) % checkpoint == 0 {
        ctx.refresh();
      }

      let error = match op(ctx, &id) {
        Ok(()) => {
          report.succeeded.push(id);
          continue;
        }
        Err(e) => e,
      };

      let count = attempts.entry(id.clone()).or_insert(0);
      *count += 1;
      let count = *count;

      match disposition(ctx, &error) {
        Disposition::Retry if count < max_attempts => {
          warn!(step, id = %id, attempt = count, error = %error, "Requeueing");
          requeue.push(id);
          ctx.refresh();
        }
        Disposition::Retry => {
          warn!(step, id = %id, attempts = count, error = %error, "Giving up");
          report.failed.push(Failure {
            id,
            attempts: count,
            error,
          });
          ctx.refresh();
        }
        Disposition::Skip => {
          warn!(step, id = %id, error = %error, "Skipping");
          report.skipped.push(Failure {
            id,
            attempts: count,
            error,
          });
        }
        Disposition::Abort => return Err(error),
      }
    }
    queue.extend(requeue);
  }

  info!(step, "{}", report);
  Ok(report)
}

/// How `error` from one id's step is handled. I/O errors only stop the run
/// when the cache root or the download directory has stopped accepting
/// writes; otherwise they belong to the entity and are retried.
fn disposition<S: ReviewSource>(ctx: &SyncContext<S>, error: &SyncError) -> Disposition {
  match error.disposition() {
    Disposition::Abort if matches!(error, SyncError::Io(_)) => match ctx.check_directories() {
      Ok(()) => Disposition::Retry,
      Err(e) => {
        warn!(error = %e, "Working directories are not writable");
        Disposition::Abort
      }
    },
    other => other,
  }
}

/// Run a single operation with the same attempt budget as [`run_step`].
pub fn with_retries<S, T, F>(ctx: &mut SyncContext<S>, label: &str, mut op: F) -> Result<T>
where
  S: ReviewSource,
  F: FnMut(&mut SyncContext<S>) -> Result<T>,
{
  let max_attempts = ctx.sync_config().max_attempts.max(1);
  let mut attempt = 1;
  loop {
    match op(ctx) {
      Ok(value) => return Ok(value),
      Err(e) if e.is_retryable() && attempt < max_attempts => {
        warn!(label, attempt, error = %e, "Retrying");
        attempt += 1;
        ctx.refresh();
        let delay = ctx.sync_config().pass_delay;
        if !delay.is_zero() {
          thread::sleep(delay);
        }
      }
      Err(e) => return Err(e),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Config;
  use crate::source::mock::MockSource;
  use std::path::Path;
  use std::time::Duration;
  use tempfile::TempDir;

  fn context(dir: &Path) -> SyncContext<MockSource> {
    let mut config = Config::default();
    config.cache_location = dir.join("cache");
    config.download_location = dir.join("downloads");
    config.sync.pass_delay = Duration::ZERO;
    config.sync.checkpoint_interval = 2;
    SyncContext::new(MockSource::new(dir.join("downloads")), &config)
  }

  fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn test_always_transient_is_attempted_max_times() {
    let dir = TempDir::new().unwrap();
    let mut ctx = context(dir.path());
    let mut calls = 0;
    let report = run_step(&mut ctx, "data", ids(&["7"]), |_, _| {
      calls += 1;
      Err(SyncError::transient("page did not load"))
    })
    .unwrap();

    assert_eq!(calls, 3);
    assert_eq!(report.passes, 3);
    assert_eq!(report.failed_ids(), vec!["7"]);
    assert_eq!(report.failed[0].attempts, 3);
  }

  #[test]
  fn test_fails_once_then_succeeds() {
    let dir = TempDir::new().unwrap();
    let mut ctx = context(dir.path());
    let mut failed = false;
    let report = run_step(&mut ctx, "data", ids(&["1", "2", "3"]), |_, id| {
      if id == "2" && !failed {
        failed = true;
        return Err(SyncError::transient("stale element"));
      }
      Ok(())
    })
    .unwrap();

    assert!(report.is_clean());
    assert_eq!(report.succeeded, ids(&["1", "3", "2"]));
    assert_eq!(report.passes, 2);
  }

  #[test]
  fn test_not_found_is_skipped_without_retry() {
    let dir = TempDir::new().unwrap();
    let mut ctx = context(dir.path());
    let mut calls = 0;
    let report = run_step(&mut ctx, "data", ids(&["9"]), |_, id| {
      calls += 1;
      Err(SyncError::not_found("review", id))
    })
    .unwrap();

    assert_eq!(calls, 1);
    assert_eq!(report.skipped_ids(), vec!["9"]);
    assert!(report.failed.is_empty());
  }

  #[test]
  fn test_entity_io_error_is_retried() {
    let dir = TempDir::new().unwrap();
    let mut ctx = context(dir.path());
    let mut calls = 0;
    let report = run_step(&mut ctx, "media", ids(&["1", "2"]), |_, id| {
      if id == "2" {
        return Ok(());
      }
      calls += 1;
      Err(std::io::Error::new(std::io::ErrorKind::NotFound, "download vanished").into())
    })
    .unwrap();

    assert_eq!(calls, 3);
    assert_eq!(report.failed_ids(), vec!["1"]);
    assert_eq!(report.succeeded, ids(&["2"]));
  }

  #[test]
  fn test_io_error_aborts_when_cache_unwritable() {
    let dir = TempDir::new().unwrap();
    let mut ctx = context(dir.path());
    // a plain file where the cache root should be
    std::fs::write(dir.path().join("cache"), b"").unwrap();
    let mut visited = Vec::new();
    let result = run_step(&mut ctx, "files", ids(&["1", "2"]), |_, id| {
      visited.push(id.to_string());
      Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into())
    });

    assert!(matches!(result, Err(SyncError::Io(_))));
    assert_eq!(visited, ids(&["1"]));
  }

  #[test]
  fn test_checkpoint_refreshes_and_dedups() {
    let dir = TempDir::new().unwrap();
    let mut ctx = context(dir.path());
    let report = run_step(&mut ctx, "media", ids(&["1", "2", "2", "3", "4", "5"]), |_, _| Ok(()))
      .unwrap();

    assert_eq!(report.succeeded.len(), 5);
    // refreshed before the 2nd and 4th id
    assert_eq!(ctx.source().refreshes, 2);
  }

  #[test]
  fn test_with_retries_recovers() {
    let dir = TempDir::new().unwrap();
    let mut ctx = context(dir.path());
    ctx.source_mut().fail("list_reviews", 2);
    let reviews = with_retries(&mut ctx, "enumerate", |ctx| ctx.source_mut().list_reviews()).unwrap();
    assert!(reviews.is_empty());
    assert_eq!(ctx.source().count_calls("list_reviews"), 3);

    ctx.source_mut().fail("list_reviews", 3);
    assert!(with_retries(&mut ctx, "enumerate", |ctx| ctx.source_mut().list_reviews()).is_err());
  }
}
