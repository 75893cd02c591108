//! Incremental, resumable mirror of a review project into a local cache.
//!
//! A [`source::ReviewSource`] exposes the project and triggers file
//! transfers; [`download`] detects when a transfer has landed; [`cache`]
//! persists every entity and answers staleness questions; [`sync`] drives
//! the retry loops that bring the cache up to date.

pub mod cache;
pub mod config;
pub mod download;
pub mod error;
pub mod filesize;
pub mod logging;
pub mod model;
pub mod source;
pub mod sync;

pub use error::{Result, SyncError};
