//! Per-item cache: metadata plus the downloaded media file.

use chrono::{DateTime, Utc};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use super::codec;
use super::storage::{copy_preserving_mtime, mtime_or_epoch, Record};
use super::traits::{CacheRecord, Metadata};
use crate::error::Result;
use crate::model::ReviewItem;

pub const KIND: &str = "review_item";

impl Metadata for ReviewItem {
  fn set_id(&mut self, id: &str) {
    self.id = id.to_string();
  }
}

#[derive(Debug, Clone)]
pub struct ReviewItemCache {
  record: Record<ReviewItem>,
  review_id: String,
}

impl ReviewItemCache {
  pub fn new(root: &Path, review_id: &str, id: &str) -> Self {
    let dir = root
      .join(super::review::dir_name(review_id))
      .join(dir_name(id));
    let mut record: Record<ReviewItem> = Record::new(KIND, id, dir);
    record.meta_mut().review_id = review_id.to_string();
    Self {
      record,
      review_id: review_id.to_string(),
    }
  }

  /// Cache bound to an item summary taken from the source or a review record.
  pub fn with_data(root: &Path, item: ReviewItem) -> Self {
    let mut cache = Self::new(root, &item.review_id, &item.id);
    cache.set_data(item);
    cache
  }

  pub fn review_id(&self) -> &str {
    &self.review_id
  }

  pub fn data(&self) -> &ReviewItem {
    self.record.meta()
  }

  pub fn set_data(&mut self, mut item: ReviewItem) {
    item.review_id = self.review_id.clone();
    item.upload_time = codec::cache_precision(item.upload_time);
    self.record.set_meta(item);
  }

  /// Path of the media file, named after the item's declared file name.
  ///
  /// Names that are not a single plain path component (empty, `..`,
  /// separators, absolute) fall back to `item_<id><ext>`.
  pub fn media_path(&self) -> PathBuf {
    let dir = self.record.dir();
    let name = &self.data().name;
    if is_plain_file_name(name) {
      return dir.join(name);
    }
    let fallback = format!("item_{}{}", self.id(), self.data().extension().unwrap_or(""));
    if is_plain_file_name(&fallback) {
      dir.join(fallback)
    } else {
      dir.join(format!("item_{}", self.id()))
    }
  }

  /// Modification time of the cached media, the epoch when absent.
  pub fn mtime(&self) -> DateTime<Utc> {
    mtime_or_epoch(&self.media_path())
  }

  pub fn upload_time(&self) -> DateTime<Utc> {
    self.data().upload_time
  }

  /// True when the source holds a newer upload than the cached media.
  pub fn needs_media(&self) -> bool {
    self.mtime() < self.upload_time()
  }

  /// Copy downloaded media into place under [`media_path`](Self::media_path).
  pub fn store_media(&self, source: &Path) -> Result<PathBuf> {
    let target = self.media_path();
    copy_preserving_mtime(source, &target)?;
    Ok(target)
  }
}

fn is_plain_file_name(name: &str) -> bool {
  !name.is_empty() && Path::new(name).file_name() == Some(OsStr::new(name))
}

impl CacheRecord for ReviewItemCache {
  type Meta = ReviewItem;

  fn record(&self) -> &Record<ReviewItem> {
    &self.record
  }

  fn record_mut(&mut self) -> &mut Record<ReviewItem> {
    &mut self.record
  }

  fn store(&mut self) -> Result<PathBuf> {
    if self.record.meta().review_id != self.review_id {
      self.record.meta_mut().review_id = self.review_id.clone();
    }
    self.record.store()
  }

  fn load(&mut self) -> Result<()> {
    self.record.load()?;
    if self.record.meta().review_id.is_empty() {
      self.record.meta_mut().review_id = self.review_id.clone();
      // filling in the parent id is not a change worth persisting
      self.record.mark_clean();
    }
    Ok(())
  }
}

pub fn dir_name(id: &str) -> String {
  format!("item_{}", id)
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{Duration, TimeZone};
  use filetime::FileTime;
  use std::fs;
  use tempfile::TempDir;

  fn item(upload_time: DateTime<Utc>) -> ReviewItem {
    ReviewItem {
      id: "11".into(),
      review_id: "2".into(),
      name: "shot.mov".into(),
      upload_time,
      ..ReviewItem::default()
    }
  }

  #[test]
  fn test_layout() {
    let dir = TempDir::new().unwrap();
    let mut cache = ReviewItemCache::with_data(dir.path(), item(Utc::now()));
    let path = cache.store().unwrap();
    assert_eq!(
      path,
      dir.path().join("review_2/item_11/review_item_metadata.json")
    );
    assert_eq!(
      cache.media_path(),
      dir.path().join("review_2/item_11/shot.mov")
    );
  }

  #[test]
  fn test_media_stays_inside_item_dir() {
    let dir = TempDir::new().unwrap();
    let cache_root = dir.path().join("cache");
    let item_dir = cache_root.join("review_2/item_11");
    let download = dir.path().join("download.mov");
    fs::write(&download, b"frames").unwrap();

    for name in ["../../escaped.mov", "/tmp/abs.mov", "sub/dir.mov", "..", ""] {
      let mut data = item(Utc::now());
      data.name = name.into();
      let cache = ReviewItemCache::with_data(&cache_root, data);
      let stored = cache.store_media(&download).unwrap();
      assert_eq!(stored.parent(), Some(item_dir.as_path()), "{:?}", name);
    }
    assert!(!cache_root.join("escaped.mov").exists());

    let mut data = item(Utc::now());
    data.name = "../../escaped.mov".into();
    let cache = ReviewItemCache::with_data(&cache_root, data);
    assert_eq!(cache.media_path(), item_dir.join("item_11.mov"));
  }

  #[test]
  fn test_upload_time_survives_store_and_load() {
    let dir = TempDir::new().unwrap();
    let precise = Utc.timestamp_opt(1_760_785_261, 621_040_840).unwrap();
    let mut cache = ReviewItemCache::with_data(dir.path(), item(precise));
    cache.store().unwrap();

    let mut loaded = ReviewItemCache::new(dir.path(), "2", "11");
    loaded.load().unwrap();
    assert_eq!(loaded.data(), cache.data());
    assert_eq!(loaded.upload_time().timestamp_subsec_nanos(), 621_040_000);
  }

  #[test]
  fn test_absent_media_needs_download() {
    let dir = TempDir::new().unwrap();
    let t1 = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();
    let cache = ReviewItemCache::with_data(dir.path(), item(t1));
    assert_eq!(cache.mtime(), DateTime::<Utc>::UNIX_EPOCH);
    assert!(cache.needs_media());
  }

  #[test]
  fn test_reupload_makes_media_stale_again() {
    let dir = TempDir::new().unwrap();
    let t1 = Utc::now() - Duration::days(2);
    let mut cache = ReviewItemCache::with_data(dir.path(), item(t1));

    let download = dir.path().join("shot.mov");
    fs::write(&download, b"frames").unwrap();
    cache.store_media(&download).unwrap();
    assert!(!cache.needs_media());

    let t3 = Utc::now() + Duration::hours(1);
    cache.set_data(item(t3));
    assert!(cache.needs_media());
  }

  #[test]
  fn test_media_older_than_upload_is_stale() {
    let dir = TempDir::new().unwrap();
    let cache = ReviewItemCache::with_data(
      dir.path(),
      item(Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap()),
    );
    let download = dir.path().join("old.mov");
    fs::write(&download, b"frames").unwrap();
    let stored = cache.store_media(&download).unwrap();
    filetime::set_file_mtime(&stored, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();
    assert!(cache.needs_media());
  }

  #[test]
  fn test_load_restores_parent_id() {
    let dir = TempDir::new().unwrap();
    let item_dir = dir.path().join("review_2/item_11");
    fs::create_dir_all(&item_dir).unwrap();
    fs::write(
      item_dir.join("review_item_metadata.json"),
      r#"{"name": "a.mov", "size": 10, "upload_time": 1600000000.0}"#,
    )
    .unwrap();

    let mut cache = ReviewItemCache::new(dir.path(), "2", "11");
    cache.load().unwrap();
    assert_eq!(cache.data().review_id, "2");
    assert_eq!(cache.data().id, "11");
    assert_eq!(cache.upload_time().timestamp(), 1_600_000_000);
    assert!(!cache.is_dirty());
  }
}
