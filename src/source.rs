//! Boundary to the review platform.
//!
//! Implementations drive whatever UI or API exposes the project. They only
//! *trigger* transfers; detecting when a file has landed in the download
//! directory is the caller's job (see [`crate::download`]).

use crate::error::Result;
use crate::filesize::FileSize;
use crate::model::{Project, Review, ReviewItem};

/// A file delivery the source can start for a review.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transfer<'a> {
  /// The review's notes exported as CSV.
  Csv,
  /// All sketches of the review as one zip archive.
  Sketches,
  /// The originally uploaded media of an item.
  Original(&'a ReviewItem),
  /// The platform's transcoded rendition of an item.
  Transcoded(&'a ReviewItem),
}

impl Transfer<'_> {
  /// Glob the finished file is expected to match.
  pub fn pattern(&self) -> String {
    match self {
      Transfer::Csv => crate::cache::CSV_PATTERN.to_string(),
      Transfer::Sketches => crate::cache::ZIP_PATTERN.to_string(),
      Transfer::Original(item) => extension_pattern(item.extension().unwrap_or("")),
      // renditions come back with a lowercased extension
      Transfer::Transcoded(item) => {
        extension_pattern(&item.extension().unwrap_or("").to_lowercase())
      }
    }
  }

  /// Announced size, when the source gives one we can hold the file to.
  pub fn expected_size(&self) -> Option<FileSize> {
    match self {
      Transfer::Original(item) if item.size.bytes() > 0 => Some(item.size),
      _ => None,
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      Transfer::Csv => "csv",
      Transfer::Sketches => "sketches",
      Transfer::Original(_) => "original",
      Transfer::Transcoded(_) => "transcoded",
    }
  }
}

/// `*<ext>` with the extension matched literally, whatever it contains.
fn extension_pattern(ext: &str) -> String {
  format!("*{}", glob::Pattern::escape(ext))
}

/// Accessors over the source. Every call may fail with
/// [`SyncError::TransientUi`](crate::error::SyncError::TransientUi); lookups
/// by id fail with `NotFound` when the entity is no longer listed.
pub trait ReviewSource {
  fn project(&mut self) -> Result<Project>;

  /// Summaries of every review in the project.
  fn list_reviews(&mut self) -> Result<Vec<Review>>;

  fn review(&mut self, id: &str) -> Result<Review>;

  fn review_items(&mut self, review_id: &str) -> Result<Vec<ReviewItem>>;

  /// Start a transfer and return without waiting for it.
  fn start_transfer(&mut self, review_id: &str, transfer: Transfer<'_>) -> Result<()>;

  /// Re-acquire top-level navigation context after drift or a failure.
  fn refresh(&mut self) -> Result<()> {
    Ok(())
  }
}

#[cfg(test)]
pub(crate) mod mock {
  //! Scripted in-memory source that writes into the download directory.

  use std::collections::HashMap;
  use std::fs;
  use std::path::PathBuf;

  use super::*;
  use crate::error::SyncError;

  #[derive(Debug, Default)]
  pub struct MockSource {
    pub project: Project,
    pub reviews: Vec<Review>,
    pub items: HashMap<String, Vec<ReviewItem>>,
    pub download_dir: PathBuf,
    /// Remaining transient failures per operation key, e.g. `review_items:2`.
    pub failures: HashMap<String, u32>,
    /// Transfer labels that never produce a file.
    pub silent: Vec<&'static str>,
    pub calls: Vec<String>,
    pub transfers: Vec<String>,
    pub refreshes: usize,
  }

  impl MockSource {
    pub fn new(download_dir: PathBuf) -> Self {
      Self {
        project: Project {
          id: "1".into(),
          workspace: "studio".into(),
          title: "Feature".into(),
        },
        download_dir,
        ..Self::default()
      }
    }

    pub fn add_review(&mut self, id: &str, items: Vec<ReviewItem>) {
      let items: Vec<ReviewItem> = items
        .into_iter()
        .map(|mut item| {
          item.review_id = id.to_string();
          item.project_id = self.project.id.clone();
          item
        })
        .collect();
      self.reviews.push(Review {
        id: id.to_string(),
        project_id: self.project.id.clone(),
        name: format!("Review {}", id),
        item_count: Some(items.len() as u32),
        workspace: self.project.workspace.clone(),
        project: self.project.title.clone(),
      });
      self.items.insert(id.to_string(), items);
    }

    pub fn fail(&mut self, key: &str, times: u32) {
      self.failures.insert(key.to_string(), times);
    }

    fn check(&mut self, key: String) -> Result<()> {
      self.calls.push(key.clone());
      match self.failures.get_mut(&key) {
        Some(left) if *left > 0 => {
          *left -= 1;
          Err(SyncError::transient(format!("{} failed", key)))
        }
        _ => Ok(()),
      }
    }

    pub fn count_calls(&self, key: &str) -> usize {
      self.calls.iter().filter(|c| *c == key).count()
    }

    /// Browsers keep earlier downloads and number the new one: `a (1).csv`.
    fn unique_path(&self, name: &str) -> PathBuf {
      let first = self.download_dir.join(name);
      if !first.exists() {
        return first;
      }
      let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) => (stem, format!(".{}", ext)),
        None => (name, String::new()),
      };
      (1..)
        .map(|n| self.download_dir.join(format!("{} ({}){}", stem, n, ext)))
        .find(|p| !p.exists())
        .unwrap_or(first)
    }
  }

  impl ReviewSource for MockSource {
    fn project(&mut self) -> Result<Project> {
      self.check("project".into())?;
      Ok(self.project.clone())
    }

    fn list_reviews(&mut self) -> Result<Vec<Review>> {
      self.check("list_reviews".into())?;
      Ok(self.reviews.clone())
    }

    fn review(&mut self, id: &str) -> Result<Review> {
      self.check(format!("review:{}", id))?;
      self
        .reviews
        .iter()
        .find(|r| r.id == id)
        .cloned()
        .ok_or_else(|| SyncError::not_found("review", id))
    }

    fn review_items(&mut self, review_id: &str) -> Result<Vec<ReviewItem>> {
      self.check(format!("review_items:{}", review_id))?;
      self
        .items
        .get(review_id)
        .cloned()
        .ok_or_else(|| SyncError::not_found("review", review_id))
    }

    fn start_transfer(&mut self, review_id: &str, transfer: Transfer<'_>) -> Result<()> {
      let label = transfer.label();
      self.check(format!("{}:{}", label, review_id))?;
      if !self.items.contains_key(review_id) {
        return Err(SyncError::not_found("review", review_id));
      }
      self.transfers.push(format!("{}:{}", label, review_id));
      if self.silent.contains(&label) {
        return Ok(());
      }

      let (name, size) = match transfer {
        Transfer::Csv => (format!("Review {} notes.csv", review_id), 16),
        Transfer::Sketches => (format!("Review {} sketches.zip", review_id), 16),
        Transfer::Original(item) => (item.name.clone(), item.size.bytes() as usize),
        Transfer::Transcoded(item) => {
          let stem = item.name.rsplit_once('.').map_or(&*item.name, |(s, _)| s);
          let ext = item.extension().unwrap_or("").to_lowercase();
          (format!("{}{}", stem, ext), 8)
        }
      };
      fs::create_dir_all(&self.download_dir)?;
      fs::write(self.unique_path(&name), vec![0u8; size])?;
      Ok(())
    }

    fn refresh(&mut self) -> Result<()> {
      self.refreshes += 1;
      Ok(())
    }
  }
}
