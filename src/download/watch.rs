//! Scoped watch over the download directory.
//!
//! ```ignore
//! let path = DownloadRequest::new(&dir, "*.csv", &settings)
//!   .capture(|| source.start_transfer(review_id, Transfer::Csv))?;
//! ```
//!
//! The baseline listing is taken in [`DownloadRequest::begin`], strictly
//! before the caller triggers the transfer, so fast transfers are not missed.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::detector::{Detector, NewEntry, Observation, TransferState};
use crate::config::DownloadConfig;
use crate::error::{Result, SyncError};
use crate::filesize::FileSize;

/// Relative deviation from the announced size still accepted as complete.
/// The source only shows sizes rounded to one decimal of their unit.
const SIZE_TOLERANCE: f64 = 0.05;

/// Parameters of one expected transfer.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
  dir: PathBuf,
  pattern: String,
  expected_size: Option<FileSize>,
  make_empty: bool,
  settings: DownloadConfig,
}

impl DownloadRequest {
  pub fn new(dir: &Path, pattern: impl Into<String>, settings: &DownloadConfig) -> Self {
    Self {
      dir: dir.to_path_buf(),
      pattern: pattern.into(),
      expected_size: None,
      make_empty: false,
      settings: settings.clone(),
    }
  }

  pub fn expected_size(mut self, size: Option<FileSize>) -> Self {
    self.expected_size = size;
    self
  }

  /// Empty the download directory before taking the baseline.
  pub fn make_empty(mut self, make_empty: bool) -> Self {
    self.make_empty = make_empty;
    self
  }

  /// Snapshot the directory. Trigger the transfer only after this returns.
  pub fn begin(self) -> Result<ActiveDownload> {
    if self.make_empty {
      remove_dir_contents(&self.dir)?;
    }
    fs::create_dir_all(&self.dir)?;

    let baseline = list_names(&self.dir)?;
    let detector =
      Detector::new(&self.pattern, &self.settings)?.with_expected_size(self.expected_size);
    debug!(dir = %self.dir.display(), pattern = %self.pattern, baseline = baseline.len(), "Watching for download");

    Ok(ActiveDownload {
      dir: self.dir,
      poll_interval: self.settings.poll_interval,
      baseline,
      detector,
    })
  }

  /// Begin, run `trigger`, then block until the transfer completes or fails.
  pub fn capture<F>(self, trigger: F) -> Result<PathBuf>
  where
    F: FnOnce() -> Result<()>,
  {
    let active = self.begin()?;
    trigger()?;
    active.finish()
  }
}

/// A watch in progress; the baseline has been taken.
#[derive(Debug)]
pub struct ActiveDownload {
  dir: PathBuf,
  poll_interval: Duration,
  baseline: HashSet<String>,
  detector: Detector,
}

impl ActiveDownload {
  pub fn baseline(&self) -> &HashSet<String> {
    &self.baseline
  }

  /// Entries that appeared since the baseline, with their current sizes.
  fn observe_dir(&self) -> Result<Observation> {
    let entries = list_names(&self.dir)?
      .into_iter()
      .filter(|name| !self.baseline.contains(name))
      .map(|name| match fs::metadata(self.dir.join(&name)) {
        Ok(meta) => NewEntry::with_size(name, FileSize::new(meta.len())),
        Err(_) => NewEntry::new(name),
      })
      .collect();
    Ok(Observation::new(entries))
  }

  /// Poll until the detector reaches a terminal state.
  pub fn finish(mut self) -> Result<PathBuf> {
    let start = Instant::now();
    loop {
      let observation = self.observe_dir()?;
      let elapsed = start.elapsed();

      match self.detector.observe(elapsed, &observation).clone() {
        TransferState::Complete(name) => {
          let path = self.dir.join(name);
          self.verify_size(&path)?;
          info!(path = %path.display(), elapsed = ?elapsed, "Download complete");
          return Ok(path);
        }
        TransferState::Failed(kind) => return Err(self.detector.failure(kind, elapsed)),
        TransferState::Partial {
          progress: Some(progress),
        } => {
          if let Some(expected) = self.detector.expected_size() {
            let done = FileSize::new((progress * expected.bytes() as f64) as u64);
            info!(
              "{:.02}% downloaded ({} of {})",
              progress * 100.0,
              done.humanized(),
              expected.humanized()
            );
          }
        }
        state => debug!(?state, elapsed = ?elapsed, "Waiting for download"),
      }

      thread::sleep(self.poll_interval);
    }
  }

  fn verify_size(&self, path: &Path) -> Result<()> {
    let Some(expected) = self.detector.expected_size() else {
      return Ok(());
    };
    let actual = FileSize::new(fs::metadata(path)?.len());
    let ratio = actual.ratio_of(expected).unwrap_or(1.0);
    if (ratio - 1.0).abs() > SIZE_TOLERANCE {
      return Err(SyncError::SizeMismatch {
        path: path.to_path_buf(),
        expected,
        actual,
      });
    }
    Ok(())
  }
}

fn list_names(dir: &Path) -> io::Result<HashSet<String>> {
  fs::read_dir(dir)?
    .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
    .collect()
}

/// Delete every file and directory inside `dir`, keeping `dir` itself.
pub fn remove_dir_contents(dir: &Path) -> io::Result<()> {
  let entries = match fs::read_dir(dir) {
    Ok(entries) => entries,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
    Err(e) => return Err(e),
  };
  for entry in entries {
    let entry = entry?;
    let path = entry.path();
    if entry.file_type()?.is_dir() {
      fs::remove_dir_all(&path)?;
    } else {
      fs::remove_file(&path)?;
    }
  }
  Ok(())
}
