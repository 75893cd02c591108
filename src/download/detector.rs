//! Transfer completion state machine.
//!
//! The source gives no completion callback, so progress is inferred from the
//! entries that appeared in the download directory since the baseline. The
//! detector is fed one [`Observation`] per poll together with the elapsed time
//! and moves through these states:
//!
//! | current            | observation                         | next                  |
//! |--------------------|-------------------------------------|-----------------------|
//! | any live state     | finished entry matches the pattern  | `Complete`            |
//! | any live state     | partial entry present               | `Partial`             |
//! | `Partial`          | no partial entry                    | `Stalled`, deadline = elapsed + resume grace |
//! | `Waiting`/`Stalled`| no partial entry, past the deadline | `Failed(NotDetected)` |
//! | any live state     | past the absolute timeout           | `Failed(Timeout)`     |
//!
//! `Complete` and `Failed` are terminal. Deadlines are strict: a failure is
//! reported by the first poll *after* the deadline, so a 5s timeout polled
//! every second fails at 6s.

use glob::Pattern;
use std::time::Duration;

use crate::cache::{compile_pattern, glob_matches};
use crate::config::DownloadConfig;
use crate::error::{Result, SyncError};
use crate::filesize::FileSize;

const MIN_STALL_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
  /// Nothing resembling a transfer showed up in time.
  NotDetected,
  /// The absolute budget ran out, progress or not.
  Timeout,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransferState {
  Waiting,
  Partial { progress: Option<f64> },
  Stalled,
  Complete(String),
  Failed(FailureKind),
}

impl TransferState {
  pub fn is_terminal(&self) -> bool {
    matches!(self, TransferState::Complete(_) | TransferState::Failed(_))
  }
}

/// A directory entry that was not part of the baseline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
  pub name: String,
  pub size: Option<FileSize>,
}

impl NewEntry {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      size: None,
    }
  }

  pub fn with_size(name: impl Into<String>, size: FileSize) -> Self {
    Self {
      name: name.into(),
      size: Some(size),
    }
  }
}

/// Entries present now but absent from the baseline, sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observation {
  pub entries: Vec<NewEntry>,
}

impl Observation {
  pub fn new(mut entries: Vec<NewEntry>) -> Self {
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Self { entries }
  }

  pub fn empty() -> Self {
    Self::default()
  }
}

#[derive(Debug, Clone)]
pub struct Detector {
  pattern: Pattern,
  partial_patterns: Vec<Pattern>,
  expected_size: Option<FileSize>,
  stall_deadline: Duration,
  resume_grace: Duration,
  timeout: Option<Duration>,
  active: bool,
  state: TransferState,
}

impl Detector {
  pub fn new(pattern: &str, settings: &DownloadConfig) -> Result<Self> {
    let partial_patterns = settings
      .partial_patterns
      .iter()
      .map(|p| compile_pattern(p))
      .collect::<Result<Vec<_>>>()?;

    Ok(Self {
      pattern: compile_pattern(pattern)?,
      partial_patterns,
      expected_size: None,
      stall_deadline: settings.stall_grace.max(MIN_STALL_GRACE),
      resume_grace: settings.resume_grace,
      timeout: (!settings.timeout.is_zero()).then_some(settings.timeout),
      active: false,
      state: TransferState::Waiting,
    })
  }

  pub fn with_expected_size(mut self, size: Option<FileSize>) -> Self {
    self.expected_size = size.filter(|s| s.bytes() > 0);
    self
  }

  pub fn state(&self) -> &TransferState {
    &self.state
  }

  pub fn pattern(&self) -> &str {
    self.pattern.as_str()
  }

  pub fn expected_size(&self) -> Option<FileSize> {
    self.expected_size
  }

  fn is_partial(&self, name: &str) -> bool {
    self.partial_patterns.iter().any(|p| glob_matches(p, name))
  }

  /// Advance the state machine by one poll.
  pub fn observe(&mut self, elapsed: Duration, observation: &Observation) -> &TransferState {
    if self.state.is_terminal() {
      return &self.state;
    }

    let mut partial: Option<&NewEntry> = None;
    for entry in &observation.entries {
      if self.is_partial(&entry.name) {
        if partial.is_none() {
          partial = Some(entry);
        }
      } else if glob_matches(&self.pattern, &entry.name) {
        self.state = TransferState::Complete(entry.name.clone());
        return &self.state;
      }
    }

    match partial {
      Some(entry) => {
        self.active = true;
        let progress = match (entry.size, self.expected_size) {
          (Some(size), Some(expected)) => size.ratio_of(expected),
          _ => None,
        };
        self.state = TransferState::Partial { progress };
      }
      None => {
        if self.active {
          // partial file gone without a finished file yet: allow a short resume
          self.active = false;
          self.stall_deadline = elapsed + self.resume_grace;
          self.state = TransferState::Stalled;
        }
        if elapsed > self.stall_deadline {
          self.state = TransferState::Failed(FailureKind::NotDetected);
          return &self.state;
        }
      }
    }

    if let Some(timeout) = self.timeout {
      if elapsed > timeout {
        self.state = TransferState::Failed(FailureKind::Timeout);
      }
    }

    &self.state
  }

  /// Error describing a failed state at `elapsed`.
  pub fn failure(&self, kind: FailureKind, elapsed: Duration) -> SyncError {
    match kind {
      FailureKind::NotDetected => SyncError::DownloadNotDetected(elapsed),
      FailureKind::Timeout => SyncError::DownloadTimeout(self.timeout.unwrap_or(elapsed)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn settings(stall: u64, timeout: u64) -> DownloadConfig {
    DownloadConfig {
      stall_grace: Duration::from_secs(stall),
      timeout: Duration::from_secs(timeout),
      ..DownloadConfig::default()
    }
  }

  fn obs(names: &[&str]) -> Observation {
    Observation::new(names.iter().map(|n| NewEntry::new(*n)).collect())
  }

  fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
  }

  #[test]
  fn test_partial_then_complete() {
    let mut d = Detector::new("*.csv", &settings(10, 0)).unwrap();
    assert_eq!(d.observe(secs(0), &obs(&[])), &TransferState::Waiting);
    assert_eq!(
      d.observe(secs(1), &obs(&["x.crdownload"])),
      &TransferState::Partial { progress: None }
    );
    assert_eq!(
      d.observe(secs(2), &obs(&["x.csv"])),
      &TransferState::Complete("x.csv".into())
    );
  }

  #[test]
  fn test_partial_name_never_completes() {
    let mut d = Detector::new("*", &settings(10, 0)).unwrap();
    assert_eq!(
      d.observe(secs(1), &obs(&["export.csv.crdownload"])),
      &TransferState::Partial { progress: None }
    );
  }

  #[test]
  fn test_pattern_is_case_sensitive() {
    let mut d = Detector::new("*.csv", &settings(2, 0)).unwrap();
    assert_eq!(d.observe(secs(1), &obs(&["X.CSV"])), &TransferState::Waiting);
  }

  #[test]
  fn test_nothing_appears_fails_after_grace() {
    let mut d = Detector::new("*.csv", &settings(2, 0)).unwrap();
    let mut failed_at = None;
    for t in 0..10 {
      if let TransferState::Failed(kind) = d.observe(secs(t), &obs(&[])) {
        assert_eq!(*kind, FailureKind::NotDetected);
        failed_at = Some(t);
        break;
      }
    }
    assert_eq!(failed_at, Some(3));
  }

  #[test]
  fn test_stall_grace_has_floor() {
    let mut d = Detector::new("*.csv", &settings(0, 0)).unwrap();
    assert_eq!(d.observe(secs(1), &obs(&[])), &TransferState::Waiting);
    assert_eq!(
      d.observe(Duration::from_millis(1_001), &obs(&[])),
      &TransferState::Failed(FailureKind::NotDetected)
    );
  }

  #[test]
  fn test_stall_extends_deadline() {
    let mut d = Detector::new("*.zip", &settings(2, 0)).unwrap();
    d.observe(secs(1), &obs(&["a.crdownload"]));
    d.observe(secs(5), &obs(&["a.crdownload"]));
    // partial gone at 6s: deadline moves to 7s instead of failing
    assert_eq!(d.observe(secs(6), &obs(&[])), &TransferState::Stalled);
    assert_eq!(d.observe(secs(7), &obs(&[])), &TransferState::Stalled);
    assert_eq!(
      d.observe(secs(8), &obs(&[])),
      &TransferState::Failed(FailureKind::NotDetected)
    );
  }

  #[test]
  fn test_resume_after_stall_completes() {
    let mut d = Detector::new("*.zip", &settings(2, 0)).unwrap();
    d.observe(secs(1), &obs(&["a.crdownload"]));
    d.observe(secs(4), &obs(&[]));
    d.observe(secs(5), &obs(&["b.crdownload"]));
    assert_eq!(
      d.observe(secs(20), &obs(&["a.zip"])),
      &TransferState::Complete("a.zip".into())
    );
  }

  #[test]
  fn test_timeout_despite_progress() {
    let mut d = Detector::new("*.mov", &settings(2, 5)).unwrap();
    let mut outcome = None;
    for t in 0..20 {
      let state = d.observe(secs(t), &obs(&["clip.crdownload"])).clone();
      if state.is_terminal() {
        outcome = Some((t, state));
        break;
      }
    }
    // first poll past the 5s budget
    assert_eq!(
      outcome,
      Some((6, TransferState::Failed(FailureKind::Timeout)))
    );
  }

  #[test]
  fn test_progress_against_expected_size() {
    let mut d = Detector::new("*.mov", &settings(10, 0))
      .unwrap()
      .with_expected_size(Some(FileSize::new(2_000)));
    let observation = Observation::new(vec![NewEntry::with_size(
      "clip.mov.crdownload",
      FileSize::new(500),
    )]);
    assert_eq!(
      d.observe(secs(1), &observation),
      &TransferState::Partial {
        progress: Some(0.25)
      }
    );
  }

  #[test]
  fn test_terminal_states_stick() {
    let mut d = Detector::new("*.csv", &settings(10, 0)).unwrap();
    d.observe(secs(1), &obs(&["a.csv"]));
    assert_eq!(
      d.observe(secs(100), &obs(&[])),
      &TransferState::Complete("a.csv".into())
    );
  }

  #[test]
  fn test_failure_errors() {
    let d = Detector::new("*.csv", &settings(10, 5)).unwrap();
    assert!(matches!(
      d.failure(FailureKind::Timeout, secs(6)),
      SyncError::DownloadTimeout(t) if t == secs(5)
    ));
    assert!(matches!(
      d.failure(FailureKind::NotDetected, secs(11)),
      SyncError::DownloadNotDetected(_)
    ));
  }
}
