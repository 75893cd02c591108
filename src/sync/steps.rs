//! Per-entity sync steps. Each one reads the source, writes the cache, and
//! leaves the entity converged for its part of the pipeline.

use tracing::{debug, info, warn};

use super::context::SyncContext;
use crate::cache::CacheRecord;
use crate::error::{Result, SyncError};
use crate::model::ReviewItem;
use crate::source::{ReviewSource, Transfer};

/// Enumerate the project and persist its review summaries.
///
/// Cached item summaries of known reviews are kept; only the review summary
/// itself is replaced. Returns the review ids in listing order.
pub fn sync_project<S: ReviewSource>(ctx: &mut SyncContext<S>) -> Result<Vec<String>> {
  let project = ctx.source_mut().project()?;
  let reviews = ctx.source_mut().list_reviews()?;
  info!(project = %project.id, reviews = reviews.len(), "Enumerated project");

  let mut project_cache = ctx.cache().project(&project.id);
  project_cache.set_data(project);
  project_cache.set_reviews(reviews.clone());
  project_cache.store()?;

  let mut ids = Vec::with_capacity(reviews.len());
  for review in reviews {
    ids.push(review.id.clone());
    let mut cache = match ctx.cache().open_review(&review.id) {
      Ok(cache) => cache,
      Err(e @ SyncError::CacheRead { .. }) => {
        warn!(review = %review.id, error = %e, "Keeping unreadable review cache as is");
        continue;
      }
      Err(e) => return Err(e),
    };
    if cache.exists() && cache.data() == &review {
      continue;
    }
    cache.set_data(review);
    cache.store()?;
  }
  Ok(ids)
}

/// Fetch one review with its items and persist both levels.
pub fn sync_review_data<S: ReviewSource>(ctx: &mut SyncContext<S>, id: &str) -> Result<()> {
  let review = ctx.source_mut().review(id)?;
  let items = ctx.source_mut().review_items(id)?;
  if review.item_count.is_some_and(|count| count as usize != items.len()) {
    warn!(
      review = id,
      reported = ?review.item_count,
      fetched = items.len(),
      "Item list is incomplete, review stays pending"
    );
  }

  let mut cache = ctx.cache().open_review(id)?;
  for item in &items {
    let mut item_cache = ctx.cache().item(id, &item.id);
    item_cache.set_data(item.clone());
    item_cache.store()?;
  }

  info!(review = id, name = %review.name, items = items.len(), "Synced review data");
  cache.set_data(review);
  cache.set_review_items(items);
  cache.store()?;
  Ok(())
}

/// Download the notes export and sketch archive when missing, or always
/// when `force` is set.
pub fn sync_review_files<S: ReviewSource>(
  ctx: &mut SyncContext<S>,
  id: &str,
  force: bool,
) -> Result<()> {
  let cache = ctx.cache().open_review(id)?;

  if force || cache.needs_csv() {
    let path = ctx.download(id, Transfer::Csv)?;
    let stored = cache.store_asset(&path)?;
    info!(review = id, path = %stored.display(), "Stored notes export");
  }
  if force || cache.needs_zip() {
    let path = ctx.download(id, Transfer::Sketches)?;
    let stored = cache.store_asset(&path)?;
    info!(review = id, path = %stored.display(), "Stored sketches");
  }
  Ok(())
}

/// Download media for every live item whose cached copy is missing or older
/// than its upload.
pub fn sync_review_media<S: ReviewSource>(ctx: &mut SyncContext<S>, id: &str) -> Result<()> {
  let items = ctx.source_mut().review_items(id)?;

  for item in &items {
    let mut item_cache = ctx.cache().item(id, &item.id);
    item_cache.set_data(item.clone());

    if !item_cache.needs_media() {
      debug!(review = id, item = %item.id, "Media up to date");
      if !item_cache.exists() {
        item_cache.store()?;
      }
      continue;
    }

    let path = download_media(ctx, id, item)?;
    let stored = item_cache.store_media(&path)?;
    item_cache.store()?;
    info!(review = id, item = %item.id, size = %item.size, path = %stored.display(), "Stored media");
  }
  Ok(())
}

fn download_media<S: ReviewSource>(
  ctx: &mut SyncContext<S>,
  review_id: &str,
  item: &ReviewItem,
) -> Result<std::path::PathBuf> {
  match ctx.download(review_id, Transfer::Original(item)) {
    Ok(path) => Ok(path),
    Err(SyncError::DownloadNotDetected(waited)) if ctx.download_config().transcoded_fallback => {
      warn!(
        review = review_id,
        item = %item.id,
        waited = ?waited,
        "Original never started, falling back to transcoded copy"
      );
      ctx.download(review_id, Transfer::Transcoded(item))
    }
    Err(e) => Err(e),
  }
}
