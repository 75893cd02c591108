//! Retry-driven synchronization of a review source into the entity cache.

mod context;
mod driver;
mod pipeline;
mod steps;

pub use context::SyncContext;
pub use driver::{run_step, with_retries, Failure, StepReport};
pub use pipeline::{complete_sync, sync_all_reviews, sync_from_cache, Step, SyncReport};
pub use steps::{sync_project, sync_review_data, sync_review_files, sync_review_media};
