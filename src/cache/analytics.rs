//! Read-only views over everything persisted in the cache.

use std::fmt;
use std::str::FromStr;
use tracing::warn;

use super::review::ReviewCache;
use super::traits::CacheRecord;
use super::EntityCache;
use crate::error::{Result, SyncError};

/// Named staleness predicates usable as review filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReviewFilter {
  NeedsDataSync,
  NeedsMedia,
  NeedsCsv,
  NeedsZip,
  NeedsFiles,
  IsComplete,
}

impl ReviewFilter {
  pub const ALL: [ReviewFilter; 6] = [
    ReviewFilter::NeedsDataSync,
    ReviewFilter::NeedsMedia,
    ReviewFilter::NeedsZip,
    ReviewFilter::NeedsCsv,
    ReviewFilter::NeedsFiles,
    ReviewFilter::IsComplete,
  ];

  pub fn name(self) -> &'static str {
    match self {
      ReviewFilter::NeedsDataSync => "needs_data_sync",
      ReviewFilter::NeedsMedia => "needs_media",
      ReviewFilter::NeedsCsv => "needs_csv",
      ReviewFilter::NeedsZip => "needs_zip",
      ReviewFilter::NeedsFiles => "needs_files",
      ReviewFilter::IsComplete => "is_complete",
    }
  }

  pub fn matches(self, review: &ReviewCache) -> bool {
    match self {
      ReviewFilter::NeedsDataSync => review.needs_data_sync(),
      ReviewFilter::NeedsMedia => review.needs_media(),
      ReviewFilter::NeedsCsv => review.needs_csv(),
      ReviewFilter::NeedsZip => review.needs_zip(),
      ReviewFilter::NeedsFiles => review.needs_files(),
      ReviewFilter::IsComplete => review.is_complete(),
    }
  }
}

impl fmt::Display for ReviewFilter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for ReviewFilter {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let normalized = s.trim().to_lowercase().replace('-', "_");
    ReviewFilter::ALL
      .into_iter()
      .find(|f| f.name() == normalized)
      .ok_or_else(|| {
        let names: Vec<_> = ReviewFilter::ALL.iter().map(|f| f.name()).collect();
        format!("unknown filter {:?}, expected one of {}", s, names.join(", "))
      })
  }
}

/// Count of reviews matching each filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyticsReport {
  pub total: usize,
  pub counts: Vec<(ReviewFilter, usize)>,
}

impl fmt::Display for AnalyticsReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "{:<16} {}", "reviews", self.total)?;
    for (filter, count) in &self.counts {
      writeln!(f, "{:<16} {}", filter.name(), count)?;
    }
    Ok(())
  }
}

pub struct CacheAnalytics<'a> {
  cache: &'a EntityCache,
}

impl<'a> CacheAnalytics<'a> {
  pub fn new(cache: &'a EntityCache) -> Self {
    Self { cache }
  }

  /// Load every review directory found under the cache root.
  ///
  /// Reviews with unreadable metadata are logged and left out.
  pub fn reviews(&self) -> Result<Vec<ReviewCache>> {
    let mut reviews = Vec::new();
    for id in self.cache.review_ids()? {
      match self.cache.open_review(&id) {
        Ok(review) => reviews.push(review),
        Err(e @ SyncError::CacheRead { .. }) => {
          warn!(review = %id, error = %e, "Skipping unreadable review");
        }
        Err(e) => return Err(e),
      }
    }
    Ok(reviews)
  }

  pub fn filter_reviews<'r>(
    &self,
    reviews: &'r [ReviewCache],
    filter: ReviewFilter,
  ) -> Vec<&'r ReviewCache> {
    self.filter_by(reviews, |r| filter.matches(r))
  }

  pub fn filter_by<'r, F>(&self, reviews: &'r [ReviewCache], predicate: F) -> Vec<&'r ReviewCache>
  where
    F: Fn(&ReviewCache) -> bool,
  {
    reviews.iter().filter(|r| predicate(*r)).collect()
  }

  /// The `top` complete reviews with the most sketches in their archive.
  /// An unreadable archive ranks as empty.
  pub fn candidate_reviews<'r>(
    &self,
    reviews: &'r [ReviewCache],
    top: usize,
  ) -> Vec<&'r ReviewCache> {
    let mut ranked: Vec<(usize, &ReviewCache)> = self
      .filter_reviews(reviews, ReviewFilter::IsComplete)
      .into_iter()
      .map(|r| {
        let sketches = r.num_sketches().unwrap_or_else(|e| {
          warn!(review = r.id(), error = %e, "Failed to read sketch archive");
          0
        });
        (sketches, r)
      })
      .collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0));
    ranked.into_iter().take(top).map(|(_, r)| r).collect()
  }

  pub fn report(&self, reviews: &[ReviewCache]) -> AnalyticsReport {
    AnalyticsReport {
      total: reviews.len(),
      counts: ReviewFilter::ALL
        .into_iter()
        .map(|f| (f, self.filter_reviews(reviews, f).len()))
        .collect(),
    }
  }
}
