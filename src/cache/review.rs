//! Review cache: review summary, denormalized item summaries, exported files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use super::codec;
use super::export::{self, Note};
use super::item::ReviewItemCache;
use super::storage::Record;
use super::traits::{CacheRecord, Metadata};
use crate::error::Result;
use crate::filesize::FileSize;
use crate::model::{Review, ReviewItem};

pub const KIND: &str = "review";
pub const CSV_PATTERN: &str = "*.csv";
pub const ZIP_PATTERN: &str = "*.zip";
pub const SKETCH_DIR: &str = "sketches";

/// Contents of `review_metadata.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewMetadata {
  #[serde(flatten)]
  pub review: Review,
  #[serde(default)]
  pub review_items: Vec<ReviewItem>,
}

impl Metadata for ReviewMetadata {
  fn set_id(&mut self, id: &str) {
    self.review.id = id.to_string();
  }
}

#[derive(Debug, Clone)]
pub struct ReviewCache {
  record: Record<ReviewMetadata>,
  root: PathBuf,
}

impl ReviewCache {
  pub fn new(root: &Path, id: &str) -> Self {
    Self {
      record: Record::new(KIND, id, root.join(dir_name(id))),
      root: root.to_path_buf(),
    }
  }

  pub fn with_data(root: &Path, review: Review) -> Self {
    let mut cache = Self::new(root, &review.id);
    cache.set_data(review);
    cache
  }

  /// Load the persisted review, or an empty one if it was never stored.
  pub fn open(root: &Path, id: &str) -> Result<Self> {
    let mut cache = Self::new(root, id);
    cache.load()?;
    Ok(cache)
  }

  pub fn data(&self) -> &Review {
    &self.record.meta().review
  }

  /// Replace the review summary, keeping the cached item summaries.
  pub fn set_data(&mut self, review: Review) {
    self.record.meta_mut().review = review;
    let id = self.record.id().to_string();
    self.record.meta_mut().set_id(&id);
  }

  pub fn name(&self) -> &str {
    &self.data().name
  }

  pub fn review_items(&self) -> &[ReviewItem] {
    &self.record.meta().review_items
  }

  pub fn clear_review_items(&mut self) {
    self.record.meta_mut().review_items.clear();
  }

  pub fn append_review_item(&mut self, mut item: ReviewItem) {
    item.upload_time = codec::cache_precision(item.upload_time);
    self.record.meta_mut().review_items.push(item);
  }

  pub fn set_review_items(&mut self, items: Vec<ReviewItem>) {
    self.clear_review_items();
    for item in items {
      self.append_review_item(item);
    }
  }

  /// Cache for one item summary.
  ///
  /// Persisted per-item metadata wins over the denormalized summary; the
  /// summary only stands in for items that were never stored on their own.
  pub fn item_cache(&self, summary: &ReviewItem) -> Result<ReviewItemCache> {
    let mut cache = ReviewItemCache::new(&self.root, self.id(), &summary.id);
    if cache.exists() {
      cache.load()?;
    } else {
      cache.set_data(summary.clone());
    }
    Ok(cache)
  }

  pub fn item_caches(&self) -> Result<Vec<ReviewItemCache>> {
    self
      .review_items()
      .iter()
      .map(|summary| self.item_cache(summary))
      .collect()
  }

  fn has_asset(&self, pattern: &str) -> bool {
    match self.find_asset(pattern) {
      Ok(found) => found.is_some(),
      Err(e) => {
        warn!(review = self.id(), pattern, error = %e, "Failed to scan review directory");
        false
      }
    }
  }

  pub fn csv_path(&self) -> Option<PathBuf> {
    self.find_asset(CSV_PATTERN).ok().flatten()
  }

  pub fn zip_path(&self) -> Option<PathBuf> {
    self.find_asset(ZIP_PATTERN).ok().flatten()
  }

  /// Item count unknown, or different from the cached item summaries.
  pub fn needs_data_sync(&self) -> bool {
    match self.data().item_count {
      None => true,
      Some(count) => count as usize != self.review_items().len(),
    }
  }

  pub fn needs_csv(&self) -> bool {
    !self.has_asset(CSV_PATTERN)
  }

  pub fn needs_zip(&self) -> bool {
    !self.has_asset(ZIP_PATTERN)
  }

  pub fn needs_files(&self) -> bool {
    self.needs_csv() || self.needs_zip()
  }

  /// Any item whose cached media is missing or older than its upload.
  pub fn needs_media(&self) -> bool {
    self
      .review_items()
      .iter()
      .any(|summary| match self.item_cache(summary) {
        Ok(cache) => cache.needs_media(),
        Err(e) => {
          warn!(review = self.id(), item = %summary.id, error = %e, "Unreadable item cache");
          true
        }
      })
  }

  pub fn is_complete(&self) -> bool {
    !(self.needs_data_sync() || self.needs_files() || self.needs_media())
  }

  /// Number of items whose media file is present in the cache.
  pub fn media_count(&self) -> usize {
    self
      .review_items()
      .iter()
      .filter_map(|summary| self.item_cache(summary).ok())
      .filter(|cache| cache.media_path().is_file())
      .count()
  }

  /// Rows of the cached notes export, zero when it was not downloaded.
  pub fn num_notes(&self) -> Result<usize> {
    match self.csv_path() {
      Some(path) => export::count_notes(&path),
      None => Ok(0),
    }
  }

  pub fn notes(&self) -> Result<Vec<Note>> {
    match self.csv_path() {
      Some(path) => export::read_notes(&path),
      None => Ok(Vec::new()),
    }
  }

  /// Sketches in the cached archive, zero when it was not downloaded.
  pub fn num_sketches(&self) -> Result<usize> {
    match self.zip_path() {
      Some(path) => export::count_sketches(&path),
      None => Ok(0),
    }
  }

  /// Unpack the sketch archive into `<review dir>/sketches`.
  pub fn extract_sketches(&self) -> Result<Vec<PathBuf>> {
    match self.zip_path() {
      Some(path) => export::extract_sketches(&path, &self.cache_dir().join(SKETCH_DIR)),
      None => Ok(Vec::new()),
    }
  }

  /// Note counts as listed on the item summaries.
  pub fn total_notes(&self) -> u64 {
    self.review_items().iter().map(|i| u64::from(i.notes)).sum()
  }

  pub fn total_size(&self) -> FileSize {
    self.review_items().iter().map(|i| i.size).sum()
  }

  /// Delete everything cached for this review, items included.
  pub fn remove(&mut self) -> Result<()> {
    self.record.remove()
  }
}

impl CacheRecord for ReviewCache {
  type Meta = ReviewMetadata;

  fn record(&self) -> &Record<ReviewMetadata> {
    &self.record
  }

  fn record_mut(&mut self) -> &mut Record<ReviewMetadata> {
    &mut self.record
  }
}

pub fn dir_name(id: &str) -> String {
  format!("review_{}", id)
}

/// Inverse of [`dir_name`]: `review_123` yields `123`.
pub fn parse_dir_name(name: &str) -> Option<&str> {
  let id = name.strip_prefix("review_")?;
  if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) {
    Some(id)
  } else {
    None
  }
}
