//! Detection of source-triggered file transfers into the download directory.

mod detector;
mod watch;

pub use detector::{Detector, FailureKind, NewEntry, Observation, TransferState};
pub use watch::{remove_dir_contents, ActiveDownload, DownloadRequest};
