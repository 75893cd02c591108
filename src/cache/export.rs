//! Readers for a review's exported files: the notes CSV and the sketch zip.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};

/// Extension counted as a sketch inside the archive.
pub const SKETCH_EXTENSION: &str = "jpg";

/// One note row, keyed by the export's header names.
pub type Note = BTreeMap<String, String>;

fn notes_error(path: &Path) -> impl FnOnce(csv::Error) -> SyncError + '_ {
  move |source| SyncError::Notes {
    path: path.to_path_buf(),
    source,
  }
}

fn sketches_error(path: &Path) -> impl FnOnce(zip::result::ZipError) -> SyncError + '_ {
  move |source| SyncError::Sketches {
    path: path.to_path_buf(),
    source,
  }
}

fn csv_reader(path: &Path) -> Result<csv::Reader<File>> {
  csv::ReaderBuilder::new()
    .flexible(true)
    .from_path(path)
    .map_err(notes_error(path))
}

/// Number of note rows, the header excluded.
pub fn count_notes(path: &Path) -> Result<usize> {
  let mut reader = csv_reader(path)?;
  let mut count = 0;
  for record in reader.records() {
    record.map_err(notes_error(path))?;
    count += 1;
  }
  Ok(count)
}

/// Every note row as a header-keyed map. Missing trailing cells are empty.
pub fn read_notes(path: &Path) -> Result<Vec<Note>> {
  let mut reader = csv_reader(path)?;
  let headers = reader.headers().map_err(notes_error(path))?.clone();
  let mut notes = Vec::new();
  for record in reader.records() {
    let record = record.map_err(notes_error(path))?;
    let note = headers
      .iter()
      .enumerate()
      .map(|(n, name)| (name.to_string(), record.get(n).unwrap_or("").to_string()))
      .collect();
    notes.push(note);
  }
  Ok(notes)
}

fn open_archive(path: &Path) -> Result<zip::ZipArchive<File>> {
  let file = File::open(path)?;
  zip::ZipArchive::new(file).map_err(sketches_error(path))
}

fn is_sketch(name: &str) -> bool {
  Path::new(name)
    .extension()
    .is_some_and(|ext| ext == SKETCH_EXTENSION)
}

/// Number of `.jpg` files in the archive. Directories do not count.
pub fn count_sketches(path: &Path) -> Result<usize> {
  let mut archive = open_archive(path)?;
  let mut count = 0;
  for n in 0..archive.len() {
    let entry = archive.by_index(n).map_err(sketches_error(path))?;
    if !entry.is_dir() && is_sketch(entry.name()) {
      count += 1;
    }
  }
  Ok(count)
}

/// Unpack every file of the archive under `target`, keeping its inner
/// layout. Entries that would land outside `target` are left out.
/// Returns the extracted sketch paths in archive order.
pub fn extract_sketches(path: &Path, target: &Path) -> Result<Vec<PathBuf>> {
  let mut archive = open_archive(path)?;
  let mut sketches = Vec::new();
  for n in 0..archive.len() {
    let mut entry = archive.by_index(n).map_err(sketches_error(path))?;
    let Some(relative) = entry.enclosed_name() else {
      continue;
    };
    let out = target.join(relative);
    if entry.is_dir() {
      fs::create_dir_all(&out)?;
      continue;
    }
    if let Some(parent) = out.parent() {
      fs::create_dir_all(parent)?;
    }
    io::copy(&mut entry, &mut File::create(&out)?)?;
    if is_sketch(entry.name()) {
      sketches.push(out);
    }
  }
  Ok(sketches)
}
