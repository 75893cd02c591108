//! JSON-file record storage and the flat-file asset store.

use chrono::{DateTime, Utc};
use filetime::FileTime;
use glob::{MatchOptions, Pattern};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::traits::Metadata;
use crate::error::{Result, SyncError};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
  case_sensitive: true,
  require_literal_separator: false,
  require_literal_leading_dot: false,
};

/// Working copy of one entity's metadata, bound to its directory.
#[derive(Debug, Clone)]
pub struct Record<M> {
  id: String,
  kind: &'static str,
  dir: PathBuf,
  meta: M,
  dirty: bool,
}

impl<M: Metadata> Record<M> {
  /// An unsaved, empty record. Nothing touches the disk until `store`.
  pub fn new(kind: &'static str, id: impl Into<String>, dir: PathBuf) -> Self {
    let id = id.into();
    let mut meta = M::default();
    meta.set_id(&id);
    Self {
      id,
      kind,
      dir,
      meta,
      dirty: true,
    }
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn kind(&self) -> &'static str {
    self.kind
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  pub fn metadata_path(&self) -> PathBuf {
    self.dir.join(format!("{}_metadata.json", self.kind))
  }

  pub fn is_dirty(&self) -> bool {
    self.dirty
  }

  pub(crate) fn mark_clean(&mut self) {
    self.dirty = false;
  }

  pub fn meta(&self) -> &M {
    &self.meta
  }

  /// Mutable access to the working copy; marks the record dirty.
  pub fn meta_mut(&mut self) -> &mut M {
    self.dirty = true;
    &mut self.meta
  }

  /// Replace the working copy; marks the record dirty.
  pub fn set_meta(&mut self, mut meta: M) {
    meta.set_id(&self.id);
    self.meta = meta;
    self.dirty = true;
  }

  /// Whether a metadata file exists for this record.
  pub fn exists(&self) -> bool {
    self.metadata_path().is_file()
  }

  /// Write the working copy to the metadata file and clear the dirty bit.
  ///
  /// The file is written next to its final location and renamed into place,
  /// so readers never observe a half-written record.
  pub fn store(&mut self) -> Result<PathBuf> {
    fs::create_dir_all(&self.dir)?;
    self.meta.set_id(&self.id);

    let path = self.metadata_path();
    let data = serde_json::to_vec_pretty(&self.meta).map_err(|source| SyncError::CacheWrite {
      path: path.clone(),
      source,
    })?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, data)?;
    fs::rename(&tmp, &path)?;

    self.dirty = false;
    Ok(path)
  }

  /// Replace the working copy with the metadata file's contents.
  ///
  /// A missing file yields an empty record. A malformed file is an error and
  /// leaves the working copy untouched.
  pub fn load(&mut self) -> Result<()> {
    let path = self.metadata_path();
    let meta = match fs::read(&path) {
      Ok(data) => {
        let mut meta: M = serde_json::from_slice(&data)
          .map_err(|source| SyncError::CacheRead { path, source })?;
        meta.set_id(&self.id);
        meta
      }
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        let mut meta = M::default();
        meta.set_id(&self.id);
        meta
      }
      Err(e) => return Err(e.into()),
    };

    self.meta = meta;
    self.dirty = false;
    Ok(())
  }

  /// Copy `source` into the directory as `<kind>_<id><ext>`, replacing any
  /// previous asset with the same extension.
  pub fn store_asset(&self, source: &Path) -> Result<PathBuf> {
    let ext = source
      .extension()
      .map(|e| format!(".{}", e.to_string_lossy()))
      .unwrap_or_default();
    let target = self.dir.join(format!("{}_{}{}", self.kind, self.id, ext));
    copy_preserving_mtime(source, &target)?;
    Ok(target)
  }

  pub fn find_asset(&self, pattern: &str) -> Result<Option<PathBuf>> {
    find_matching(&self.dir, pattern)
  }

  /// Delete the entity directory and everything in it.
  pub fn remove(&mut self) -> Result<()> {
    match fs::remove_dir_all(&self.dir) {
      Ok(()) => {}
      Err(e) if e.kind() == io::ErrorKind::NotFound => {}
      Err(e) => return Err(e.into()),
    }
    self.dirty = true;
    Ok(())
  }
}

pub fn compile_pattern(pattern: &str) -> Result<Pattern> {
  Pattern::new(pattern).map_err(|source| SyncError::Pattern {
    pattern: pattern.to_string(),
    source,
  })
}

/// Case-sensitive glob match against a bare file name.
pub fn glob_matches(pattern: &Pattern, name: &str) -> bool {
  pattern.matches_with(name, MATCH_OPTIONS)
}

/// First regular file (by name order) in `dir` matching `pattern`.
/// A missing directory has no matches.
pub fn find_matching(dir: &Path, pattern: &str) -> Result<Option<PathBuf>> {
  let pattern = compile_pattern(pattern)?;
  let entries = match fs::read_dir(dir) {
    Ok(entries) => entries,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
    Err(e) => return Err(e.into()),
  };

  let mut found: Vec<PathBuf> = Vec::new();
  for entry in entries {
    let entry = entry?;
    let name = entry.file_name();
    if entry.file_type()?.is_file() && glob_matches(&pattern, &name.to_string_lossy()) {
      found.push(entry.path());
    }
  }
  found.sort();
  Ok(found.into_iter().next())
}

/// Copy a file, replacing `target`, and carry over the source's mtime.
pub fn copy_preserving_mtime(source: &Path, target: &Path) -> io::Result<()> {
  if let Some(parent) = target.parent() {
    fs::create_dir_all(parent)?;
  }
  if target.is_file() {
    fs::remove_file(target)?;
  }
  fs::copy(source, target)?;

  let metadata = fs::metadata(source)?;
  filetime::set_file_mtime(target, FileTime::from_last_modification_time(&metadata))
}

/// Modification time of `path`, or the Unix epoch if it does not exist.
pub fn mtime_or_epoch(path: &Path) -> DateTime<Utc> {
  fs::metadata(path)
    .and_then(|m| m.modified())
    .map(DateTime::<Utc>::from)
    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
