//! State threaded through one sync session.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::cache::EntityCache;
use crate::config::{Config, DownloadConfig, SyncConfig};
use crate::download::{remove_dir_contents, DownloadRequest};
use crate::error::Result;
use crate::source::{ReviewSource, Transfer};

/// A source together with the cache it fills and the download settings.
///
/// One context drives one session; nothing in it is shared across threads.
#[derive(Debug)]
pub struct SyncContext<S> {
  source: S,
  cache: EntityCache,
  download_dir: PathBuf,
  download: DownloadConfig,
  sync: SyncConfig,
}

impl<S: ReviewSource> SyncContext<S> {
  pub fn new(source: S, config: &Config) -> Self {
    Self {
      source,
      cache: EntityCache::new(&config.cache_location),
      download_dir: config.download_location.clone(),
      download: config.download.clone(),
      sync: config.sync.clone(),
    }
  }

  pub fn source(&self) -> &S {
    &self.source
  }

  pub fn source_mut(&mut self) -> &mut S {
    &mut self.source
  }

  pub fn into_source(self) -> S {
    self.source
  }

  pub fn cache(&self) -> &EntityCache {
    &self.cache
  }

  pub fn download_dir(&self) -> &Path {
    &self.download_dir
  }

  pub fn download_config(&self) -> &DownloadConfig {
    &self.download
  }

  pub fn sync_config(&self) -> &SyncConfig {
    &self.sync
  }

  /// Prepare the cache root and, when configured, empty the download directory.
  pub fn start_session(&mut self) -> Result<()> {
    self.cache.ensure_writable()?;
    if self.download.clear_on_start {
      info!(dir = %self.download_dir.display(), "Clearing download directory");
      remove_dir_contents(&self.download_dir)?;
    }
    Ok(())
  }

  /// Cache root and download directory both exist and accept writes.
  pub fn check_directories(&self) -> Result<()> {
    self.cache.ensure_writable()?;
    fs::create_dir_all(&self.download_dir)?;
    Ok(())
  }

  /// Trigger `transfer` and block until its file has landed.
  pub fn download(&mut self, review_id: &str, transfer: Transfer<'_>) -> Result<PathBuf> {
    debug!(review = review_id, transfer = transfer.label(), "Starting transfer");
    let source = &mut self.source;
    DownloadRequest::new(&self.download_dir, transfer.pattern(), &self.download)
      .expected_size(transfer.expected_size())
      .capture(|| source.start_transfer(review_id, transfer))
  }

  /// Re-acquire the source's navigation context. Failures are logged only;
  /// the next step surfaces them if the source stays broken.
  pub fn refresh(&mut self) {
    if let Err(e) = self.source.refresh() {
      warn!(error = %e, "Failed to refresh source context");
    }
  }
}
