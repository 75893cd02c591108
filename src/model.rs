//! Records extracted from the source, as persisted in the cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::codec::epoch_seconds;
use crate::filesize::FileSize;

/// Project summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
  pub id: String,
  pub workspace: String,
  #[serde(alias = "project")]
  pub title: String,
}

/// Review summary as listed on the project page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Review {
  pub id: String,
  pub project_id: String,
  pub name: String,
  /// Number of items the source reports; `None` until the review was seen
  pub item_count: Option<u32>,
  pub workspace: String,
  pub project: String,
}

/// A single uploaded media item within a review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewItem {
  pub id: String,
  pub review_id: String,
  pub project_id: String,
  pub order: u32,
  /// Declared file name, also the name of the cached media file
  pub name: String,
  pub views: u32,
  pub notes: u32,
  pub size: FileSize,
  #[serde(rename = "type")]
  pub kind: String,
  pub user: String,
  #[serde(with = "epoch_seconds")]
  pub upload_time: DateTime<Utc>,
}

impl Default for ReviewItem {
  fn default() -> Self {
    Self {
      id: String::new(),
      review_id: String::new(),
      project_id: String::new(),
      order: 0,
      name: String::new(),
      views: 0,
      notes: 0,
      size: FileSize::default(),
      kind: String::new(),
      user: String::new(),
      upload_time: DateTime::<Utc>::UNIX_EPOCH,
    }
  }
}

impl ReviewItem {
  /// Extension of the declared file name including the dot, e.g. `.mov`.
  pub fn extension(&self) -> Option<&str> {
    let dot = self.name.rfind('.')?;
    if dot == 0 {
      return None;
    }
    Some(&self.name[dot..])
  }
}
