//! Core traits shared by every cached entity.

use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};

use super::storage::Record;
use crate::error::Result;

/// Serialized form of an entity's metadata file.
pub trait Metadata: Default + Serialize + DeserializeOwned {
  /// Stamp the owning entity's id before the record is written.
  fn set_id(&mut self, id: &str);
}

/// An entity with a metadata file and an asset directory in the cache tree.
///
/// The in-memory copy and the file on disk only meet through [`store`] and
/// [`load`]: `store` writes the working copy and clears the dirty bit, `load`
/// replaces the working copy wholesale.
///
/// [`store`]: CacheRecord::store
/// [`load`]: CacheRecord::load
pub trait CacheRecord {
  type Meta: Metadata;

  fn record(&self) -> &Record<Self::Meta>;

  fn record_mut(&mut self) -> &mut Record<Self::Meta>;

  fn id(&self) -> &str {
    self.record().id()
  }

  fn cache_dir(&self) -> &Path {
    self.record().dir()
  }

  fn metadata_path(&self) -> PathBuf {
    self.record().metadata_path()
  }

  fn is_dirty(&self) -> bool {
    self.record().is_dirty()
  }

  /// Whether the metadata file has been written before.
  fn exists(&self) -> bool {
    self.record().exists()
  }

  fn store(&mut self) -> Result<PathBuf> {
    self.record_mut().store()
  }

  fn load(&mut self) -> Result<()> {
    self.record_mut().load()
  }

  /// Copy a fetched file into the entity directory as `<kind>_<id><ext>`.
  fn store_asset(&self, source: &Path) -> Result<PathBuf> {
    self.record().store_asset(source)
  }

  /// First regular file in the entity directory matching `pattern`.
  fn find_asset(&self, pattern: &str) -> Result<Option<PathBuf>> {
    self.record().find_asset(pattern)
  }
}
