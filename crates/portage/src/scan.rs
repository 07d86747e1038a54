//! Scanner loop: discover settled files and offer them to the pipeline.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use portage_protocol::{file_url, S3ExportTask, StreamClient};

use crate::config::UploaderConfig;
use crate::tracker::ProcessedSet;

/// Backoff before re-checking a scan directory that is missing or unusable.
const DIRECTORY_RETRY_BACKOFF: Duration = Duration::from_secs(60);

/// One file matched by the pattern, with the metadata the scanner sorts by.
#[derive(Debug, Clone)]
pub struct ScannedEntry {
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Decides which candidate is still being written and must not be offered.
///
/// The rule receives the matches sorted ascending by modification time and
/// returns the index of the active file, if any. The index must be within
/// `sorted`; out-of-bounds indices are ignored and every match is treated as
/// settled. Pluggable so environments with different settling signals (size
/// stability, lock files) can swap the heuristic without touching the loop.
pub trait ActiveFileRule: Send + Sync {
    fn select_active(&self, sorted: &[ScannedEntry]) -> Option<usize>;
}

/// Default rule: the most recently modified match is presumed active. A file
/// becomes eligible the moment a match with a later mtime appears.
pub struct NewestByMtime;

impl ActiveFileRule for NewestByMtime {
    fn select_active(&self, sorted: &[ScannedEntry]) -> Option<usize> {
        sorted.len().checked_sub(1)
    }
}

/// Result of a single scan iteration.
#[derive(Debug, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The directory was scanned; `submitted` tasks were appended.
    Scanned { submitted: usize },
    /// The scan directory is missing or lacks rwx access; nothing was done.
    DirectoryUnavailable,
}

/// The scanner half of the synchronizer.
pub struct FolderScanner {
    config: Arc<UploaderConfig>,
    client: Arc<dyn StreamClient>,
    tracker: ProcessedSet,
    active_rule: Box<dyn ActiveFileRule>,
}

impl FolderScanner {
    pub fn new(
        config: Arc<UploaderConfig>,
        client: Arc<dyn StreamClient>,
        tracker: ProcessedSet,
    ) -> Self {
        Self {
            config,
            client,
            tracker,
            active_rule: Box::new(NewestByMtime),
        }
    }

    /// Replace the active-file heuristic.
    pub fn with_active_rule(mut self, rule: Box<dyn ActiveFileRule>) -> Self {
        self.active_rule = rule;
        self
    }

    /// One scan iteration. Bounded single-pass entry point used by tests;
    /// [`run`](Self::run) calls this forever.
    pub async fn scan_once(&self) -> Result<ScanOutcome> {
        let base_dir = scan_base_dir(&self.config.pattern);
        let usable = base_dir.map(directory_usable).unwrap_or(false);
        if !usable {
            error!(
                pattern = %self.config.pattern,
                "scan path is not a directory, does not exist, or lacks rwx access"
            );
            return Ok(ScanOutcome::DirectoryUnavailable);
        }

        info!(pattern = %self.config.pattern, "scanning folder for change");
        let mut entries = enumerate_sorted(&self.config.pattern)?;
        match self.active_rule.select_active(&entries) {
            Some(index) if index < entries.len() => {
                let active = entries.remove(index);
                info!(path = %active.path.display(), "current active file");
            }
            Some(index) => {
                warn!(
                    index,
                    matches = entries.len(),
                    "active-file rule returned an out-of-range index; treating all matches as settled"
                );
            }
            None => {}
        }

        let candidates: Vec<String> = entries
            .iter()
            .map(|entry| entry.path.to_string_lossy().into_owned())
            .collect();
        let delta = self.tracker.difference(&candidates);
        if delta.is_empty() {
            info!("no new files to transfer");
        }

        let mut submitted = 0;
        for file in &delta {
            let file_name = Path::new(file)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let key = self.config.object_key(&file_name);
            let task = S3ExportTask::new(file_url(file), &self.config.bucket, &key);
            let payload = match task.to_validated_json() {
                Ok(payload) => payload,
                Err(err) => {
                    // The file stays in the snapshot applied below, so it is
                    // never offered again until the process restarts. That is
                    // the documented policy for unserializable tasks, not an
                    // accident.
                    warn!(
                        file = %file,
                        bucket = %self.config.bucket,
                        key = %key,
                        error = %err,
                        "task validation failed; file will not be uploaded until restart"
                    );
                    continue;
                }
            };
            let sequence = self
                .client
                .append(&self.config.stream_name(), payload)
                .await
                .with_context(|| format!("appending upload task for {file}"))?;
            info!(%sequence, file = %file, "appended upload task to stream");
            submitted += 1;
        }

        // The new baseline is the listing observed this iteration, minus the
        // active file, regardless of what was tracked before.
        self.tracker.replace(candidates);
        Ok(ScanOutcome::Scanned { submitted })
    }

    /// Scan forever. Iteration errors are logged and survive; only the task
    /// being dropped ends the loop.
    pub async fn run(self) {
        info!("scanner loop started");
        loop {
            match self.scan_once().await {
                Ok(ScanOutcome::Scanned { .. }) => {
                    tokio::time::sleep(self.config.scan_interval).await;
                }
                Ok(ScanOutcome::DirectoryUnavailable) => {
                    tokio::time::sleep(DIRECTORY_RETRY_BACKOFF).await;
                }
                Err(err) => {
                    error!("scan iteration failed: {err:#}");
                    tokio::time::sleep(self.config.scan_interval).await;
                }
            }
        }
    }
}

/// Parent directory of the glob pattern, i.e. the directory being watched.
fn scan_base_dir(pattern: &str) -> Option<&Path> {
    Path::new(pattern)
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
}

/// The scan directory must be listable (read + search) and writable, since
/// confirmed files are deleted from it.
fn directory_usable(dir: &Path) -> bool {
    if !dir.is_dir() {
        return false;
    }
    if fs::read_dir(dir).is_err() {
        return false;
    }
    match fs::metadata(dir) {
        Ok(metadata) => !metadata.permissions().readonly(),
        Err(_) => false,
    }
}

/// All files matching the pattern, sorted ascending by modification time.
fn enumerate_sorted(pattern: &str) -> Result<Vec<ScannedEntry>> {
    let matches = glob::glob(pattern).context("invalid glob pattern")?;
    let mut entries = Vec::new();
    for item in matches {
        let path = match item {
            Ok(path) => path,
            Err(err) => {
                warn!(error = %err, "skipping unreadable match");
                continue;
            }
        };
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) => {
                // The file may have been deleted between globbing and stat.
                warn!(path = %path.display(), error = %err, "skipping match without metadata");
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata
            .modified()
            .with_context(|| format!("reading mtime of {}", path.display()))?;
        entries.push(ScannedEntry { path, modified });
    }
    entries.sort_by_key(|entry| entry.modified);
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn entry(path: &str, secs: u64) -> ScannedEntry {
        ScannedEntry {
            path: PathBuf::from(path),
            modified: SystemTime::UNIX_EPOCH + Duration::from_secs(secs),
        }
    }

    #[test]
    fn newest_by_mtime_picks_the_last_sorted_entry() {
        let rule = NewestByMtime;
        assert_eq!(rule.select_active(&[]), None);

        let sorted = vec![entry("/a", 1), entry("/b", 2), entry("/c", 3)];
        assert_eq!(rule.select_active(&sorted), Some(2));
    }

    #[test]
    fn base_dir_is_the_pattern_parent() {
        assert_eq!(
            scan_base_dir("/var/spool/portage/*.csv"),
            Some(Path::new("/var/spool/portage"))
        );
        // A bare file pattern has no parent directory to check.
        assert_eq!(scan_base_dir("*.csv"), None);
    }

    #[test]
    fn wildcard_parent_is_not_usable() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("testdir");
        fs::create_dir(&nested).unwrap();

        // Parent segment containing the wildcard is not itself a directory.
        let pattern = format!("{}/test*/data.csv", dir.path().display());
        let base = scan_base_dir(&pattern).unwrap();
        assert!(!directory_usable(base));
    }

    #[test]
    fn enumerate_sorts_by_mtime() {
        let dir = tempfile::tempdir().unwrap();
        for (name, secs) in [("b.csv", 200), ("a.csv", 100), ("c.csv", 300)] {
            let path = dir.path().join(name);
            fs::write(&path, name).unwrap();
            filetime::set_file_mtime(&path, filetime::FileTime::from_unix_time(secs, 0)).unwrap();
        }
        let pattern = format!("{}/*.csv", dir.path().display());
        let entries = enumerate_sorted(&pattern).unwrap();
        let names: Vec<_> = entries
            .iter()
            .map(|e| e.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.csv", "b.csv", "c.csv"]);
    }

    #[test]
    fn enumerate_skips_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("folder.csv")).unwrap();
        fs::write(dir.path().join("real.csv"), "x").unwrap();

        let pattern = format!("{}/*.csv", dir.path().display());
        let entries = enumerate_sorted(&pattern).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].path.ends_with("real.csv"));
    }
}
