//! Portage - continuous directory-to-object-store synchronization.
//!
//! Portage watches a local directory for files matching a glob pattern and
//! hands each settled file to an external durable stream pipeline, which
//! performs the actual upload out-of-band and reports outcomes on a status
//! stream. Portage then reconciles: confirmed files are deleted locally,
//! failed files are re-offered on a later scan.
//!
//! The crate is built around two cooperating loops sharing one
//! [`ProcessedSet`]: the [`FolderScanner`] discovers candidates and replaces
//! the set with each scan's snapshot, while the [`StatusProcessor`] consumes
//! outcome events and removes failed entries so they become eligible again.
//! [`DirectoryUploader`] owns both and the pipeline streams.

pub mod config;
pub mod scan;
pub mod status;
pub mod tracker;
pub mod uploader;

pub use config::UploaderConfig;
pub use scan::{ActiveFileRule, FolderScanner, NewestByMtime, ScanOutcome, ScannedEntry};
pub use status::StatusProcessor;
pub use tracker::ProcessedSet;
pub use uploader::{DirectoryUploader, RESTART_COOLDOWN};
