//! File-backed entity cache.
//!
//! Layout under the cache root:
//! - `project_<id>/project_metadata.json` with the enumerated review summaries
//! - `review_<id>/review_metadata.json` with the review's item summaries
//! - `review_<id>/review_<id>.csv` and `.zip` exports
//! - `review_<id>/sketches/` once the archive has been unpacked
//! - `review_<id>/item_<id>/review_item_metadata.json` next to the media file
//!
//! Staleness is always derived from what is on disk, never stored.

pub mod analytics;
pub mod codec;
pub mod export;
mod item;
mod project;
mod review;
mod storage;
mod traits;

pub use analytics::{AnalyticsReport, CacheAnalytics, ReviewFilter};
pub use item::ReviewItemCache;
pub use project::{ProjectCache, ProjectMetadata};
pub use export::Note;
pub use review::{ReviewCache, ReviewMetadata, CSV_PATTERN, SKETCH_DIR, ZIP_PATTERN};
pub use storage::{copy_preserving_mtime, find_matching, Record};
pub use traits::{CacheRecord, Metadata};

pub(crate) use storage::{compile_pattern, glob_matches};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Handle on the cache root. Cheap to clone; holds no open files.
#[derive(Debug, Clone)]
pub struct EntityCache {
  root: PathBuf,
}

impl EntityCache {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Create the root and make sure it accepts writes.
  pub fn ensure_writable(&self) -> Result<()> {
    fs::create_dir_all(&self.root)?;
    let check = self.root.join(".write-check");
    fs::write(&check, b"")?;
    fs::remove_file(&check)?;
    Ok(())
  }

  pub fn project(&self, id: &str) -> ProjectCache {
    ProjectCache::new(&self.root, id)
  }

  pub fn open_project(&self, id: &str) -> Result<ProjectCache> {
    ProjectCache::open(&self.root, id)
  }

  pub fn review(&self, id: &str) -> ReviewCache {
    ReviewCache::new(&self.root, id)
  }

  pub fn open_review(&self, id: &str) -> Result<ReviewCache> {
    ReviewCache::open(&self.root, id)
  }

  pub fn item(&self, review_id: &str, id: &str) -> ReviewItemCache {
    ReviewItemCache::new(&self.root, review_id, id)
  }

  /// Ids of all review directories under the root, in numeric order.
  pub fn review_ids(&self) -> Result<Vec<String>> {
    let entries = match fs::read_dir(&self.root) {
      Ok(entries) => entries,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => return Err(e.into()),
    };

    let mut ids = Vec::new();
    for entry in entries {
      let entry = entry?;
      if !entry.file_type()?.is_dir() {
        continue;
      }
      if let Some(id) = review::parse_dir_name(&entry.file_name().to_string_lossy()) {
        ids.push(id.to_string());
      }
    }
    ids.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    Ok(ids)
  }

  pub fn analytics(&self) -> CacheAnalytics<'_> {
    CacheAnalytics::new(self)
  }

  /// Remove one review and all its items. Reviews are never purged implicitly.
  pub fn purge_review(&self, id: &str) -> Result<bool> {
    let mut review = self.review(id);
    let existed = review.cache_dir().exists();
    review.remove()?;
    Ok(existed)
  }
}
