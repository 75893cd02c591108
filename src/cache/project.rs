//! Project cache: the root record holding the enumerated review summaries.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::review::ReviewCache;
use super::storage::Record;
use super::traits::{CacheRecord, Metadata};
use crate::error::Result;
use crate::model::{Project, Review};

pub const KIND: &str = "project";

/// Contents of `project_metadata.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
  #[serde(flatten)]
  pub project: Project,
  #[serde(default)]
  pub reviews: Vec<Review>,
}

impl Metadata for ProjectMetadata {
  fn set_id(&mut self, id: &str) {
    self.project.id = id.to_string();
  }
}

#[derive(Debug, Clone)]
pub struct ProjectCache {
  record: Record<ProjectMetadata>,
  root: PathBuf,
}

impl ProjectCache {
  pub fn new(root: &Path, id: &str) -> Self {
    Self {
      record: Record::new(KIND, id, root.join(format!("project_{}", id))),
      root: root.to_path_buf(),
    }
  }

  pub fn open(root: &Path, id: &str) -> Result<Self> {
    let mut cache = Self::new(root, id);
    cache.load()?;
    Ok(cache)
  }

  pub fn data(&self) -> &Project {
    &self.record.meta().project
  }

  pub fn set_data(&mut self, project: Project) {
    self.record.meta_mut().project = project;
    let id = self.record.id().to_string();
    self.record.meta_mut().set_id(&id);
  }

  pub fn reviews(&self) -> &[Review] {
    &self.record.meta().reviews
  }

  pub fn set_reviews(&mut self, reviews: Vec<Review>) {
    self.record.meta_mut().reviews = reviews;
  }

  pub fn review_ids(&self) -> Vec<String> {
    self.reviews().iter().map(|r| r.id.clone()).collect()
  }

  /// Load the cache of every enumerated review.
  pub fn review_caches(&self) -> Result<Vec<ReviewCache>> {
    self
      .reviews()
      .iter()
      .map(|r| ReviewCache::open(&self.root, &r.id))
      .collect()
  }
}

impl CacheRecord for ProjectCache {
  type Meta = ProjectMetadata;

  fn record(&self) -> &Record<ProjectMetadata> {
    &self.record
  }

  fn record_mut(&mut self) -> &mut Record<ProjectMetadata> {
    &mut self.record
  }
}
