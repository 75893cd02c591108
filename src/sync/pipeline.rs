//! End-to-end sync runs built from the driver and the per-entity steps.

use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

use super::context::SyncContext;
use super::driver::{run_step, with_retries, StepReport};
use super::steps::{sync_project, sync_review_data, sync_review_files, sync_review_media};
use crate::cache::ReviewCache;
use crate::error::{Result, SyncError};
use crate::source::ReviewSource;

/// One per-review stage of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
  Data,
  Files,
  Media,
}

impl Step {
  pub const ALL: [Step; 3] = [Step::Data, Step::Files, Step::Media];

  pub fn name(self) -> &'static str {
    match self {
      Step::Data => "data",
      Step::Files => "files",
      Step::Media => "media",
    }
  }

  fn is_stale(self, review: &ReviewCache) -> bool {
    match self {
      Step::Data => review.needs_data_sync(),
      Step::Files => review.needs_files(),
      Step::Media => review.needs_media(),
    }
  }
}

impl fmt::Display for Step {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for Step {
  type Err = String;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    Step::ALL
      .into_iter()
      .find(|step| step.name() == s.to_ascii_lowercase())
      .ok_or_else(|| format!("unknown step {:?}, expected data, files or media", s))
  }
}

/// Outcome of a whole run.
#[derive(Debug, Default)]
pub struct SyncReport {
  /// Reviews considered by the run
  pub reviews: usize,
  pub steps: Vec<StepReport>,
}

impl SyncReport {
  pub fn is_clean(&self) -> bool {
    self.steps.iter().all(StepReport::is_clean)
  }

  pub fn step(&self, name: &str) -> Option<&StepReport> {
    self.steps.iter().find(|s| s.step == name)
  }
}

impl fmt::Display for SyncReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} reviews", self.reviews)?;
    for step in &self.steps {
      write!(f, "\n{}", step)?;
    }
    Ok(())
  }
}

/// Bring every enumerated review up to date, touching only what is stale.
///
/// Enumerates the project, then runs the data, files and media steps in that
/// order, each over the reviews whose cache says the step is needed at the
/// time the step starts. A second run without source changes transfers nothing.
pub fn complete_sync<S: ReviewSource>(ctx: &mut SyncContext<S>) -> Result<SyncReport> {
  ctx.start_session()?;
  let ids = with_retries(ctx, "enumerate", sync_project)?;
  run_steps(ctx, ids, &Step::ALL, false)
}

/// Run `steps` over every enumerated review regardless of review-level
/// staleness. Files are downloaded again; media still only for stale items.
pub fn sync_all_reviews<S: ReviewSource>(
  ctx: &mut SyncContext<S>,
  steps: &[Step],
) -> Result<SyncReport> {
  ctx.start_session()?;
  let ids = with_retries(ctx, "enumerate", sync_project)?;
  run_steps(ctx, ids, steps, true)
}

/// Staleness-filtered steps over the reviews already in the cache, without
/// enumerating the project.
pub fn sync_from_cache<S: ReviewSource>(ctx: &mut SyncContext<S>) -> Result<SyncReport> {
  ctx.start_session()?;
  let ids = ctx.cache().review_ids()?;
  info!(reviews = ids.len(), "Syncing reviews found in cache");
  run_steps(ctx, ids, &Step::ALL, false)
}

fn run_steps<S: ReviewSource>(
  ctx: &mut SyncContext<S>,
  ids: Vec<String>,
  steps: &[Step],
  force: bool,
) -> Result<SyncReport> {
  let mut report = SyncReport {
    reviews: ids.len(),
    steps: Vec::new(),
  };

  for &step in Step::ALL.iter().filter(|s| steps.contains(s)) {
    let queue = if force {
      ids.clone()
    } else {
      stale_ids(ctx, &ids, step)?
    };
    info!(step = step.name(), queued = queue.len(), "Running step");

    let step_report = match step {
      Step::Data => run_step(ctx, step.name(), queue, |ctx, id| sync_review_data(ctx, id))?,
      Step::Files => run_step(ctx, step.name(), queue, |ctx, id| {
        sync_review_files(ctx, id, force)
      })?,
      Step::Media => run_step(ctx, step.name(), queue, |ctx, id| sync_review_media(ctx, id))?,
    };
    report.steps.push(step_report);
  }
  Ok(report)
}

/// Ids among `ids` whose cached review needs `step`. Unreadable caches are
/// left alone rather than synced over.
fn stale_ids<S: ReviewSource>(
  ctx: &SyncContext<S>,
  ids: &[String],
  step: Step,
) -> Result<Vec<String>> {
  let mut stale = Vec::new();
  for id in ids {
    match ctx.cache().open_review(id) {
      Ok(review) if step.is_stale(&review) => stale.push(id.clone()),
      Ok(_) => {}
      Err(e @ SyncError::CacheRead { .. }) => {
        warn!(review = %id, error = %e, "Skipping unreadable review cache");
      }
      Err(e) => return Err(e),
    }
  }
  Ok(stale)
}
