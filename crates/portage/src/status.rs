//! Status processor loop: reconcile upload outcomes reported by the pipeline.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, error, info};

use portage_protocol::{
    file_url_to_path, ReadOptions, StatusMessage, StreamClient, StreamError, UploadStatus,
    FILE_URL_SCHEME,
};

use crate::config::UploaderConfig;
use crate::tracker::ProcessedSet;

/// Read at least one and at most this many statuses per poll.
const STATUS_BATCH_MAX: usize = 5;

/// How long one poll waits for the minimum batch before reporting empty.
const STATUS_READ_TIMEOUT: Duration = Duration::from_millis(1000);

/// The status-consuming half of the synchronizer.
///
/// Keeps a cursor over the status stream and applies each outcome exactly
/// once: Success deletes the local file, Failure/Canceled un-tracks the file
/// so the next scan re-offers it.
pub struct StatusProcessor {
    config: Arc<UploaderConfig>,
    client: Arc<dyn StreamClient>,
    tracker: ProcessedSet,
    next_seq: u64,
}

impl StatusProcessor {
    pub fn new(
        config: Arc<UploaderConfig>,
        client: Arc<dyn StreamClient>,
        tracker: ProcessedSet,
    ) -> Self {
        Self {
            config,
            client,
            tracker,
            next_seq: 0,
        }
    }

    /// Next sequence number the processor will ask the stream for.
    pub fn cursor(&self) -> u64 {
        self.next_seq
    }

    /// One poll iteration: read a bounded batch and apply it in order.
    /// Returns the number of events applied; an empty poll is not an error.
    pub async fn process_once(&mut self) -> Result<usize> {
        debug!(start = self.next_seq, "reading messages from status stream");
        let options = ReadOptions {
            desired_start_sequence: self.next_seq,
            min_count: 1,
            max_count: STATUS_BATCH_MAX,
            read_timeout: STATUS_READ_TIMEOUT,
        };
        let messages = match self
            .client
            .read(&self.config.status_stream_name(), &options)
            .await
        {
            Ok(messages) => messages,
            // Nothing arrived within the read timeout. Not a fault.
            Err(StreamError::NotEnoughMessages) => return Ok(0),
            Err(err) => return Err(err).context("reading status stream"),
        };

        let mut applied = 0;
        for message in &messages {
            let status = StatusMessage::from_json(&message.payload)
                .with_context(|| format!("decoding status at sequence {}", message.sequence))?;
            self.apply(&status).await?;
            // Advance only after the event is fully applied: earlier events
            // of this batch stay consumed if a later one errors out, and the
            // failing event itself is re-read on the next poll.
            self.next_seq = message.sequence + 1;
            applied += 1;
        }
        Ok(applied)
    }

    async fn apply(&self, status: &StatusMessage) -> Result<()> {
        let url = status.file_url();
        match status.status {
            UploadStatus::Success => {
                info!(%url, "file uploaded; removing local copy");
                let path = file_url_to_path(url)
                    .with_context(|| format!("resolving local path of {url}"))?;
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {}
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {
                        // Already gone, e.g. a replayed status for a file
                        // deleted on an earlier poll.
                        debug!(path = %path.display(), "local file already removed");
                    }
                    Err(err) => {
                        return Err(err)
                            .with_context(|| format!("removing {}", path.display()));
                    }
                }
            }
            UploadStatus::InProgress => {
                info!(%url, "file upload in progress");
            }
            UploadStatus::Failure | UploadStatus::Canceled => {
                error!(
                    %url,
                    status = %status.status,
                    detail = status.message.as_deref().unwrap_or(""),
                    "upload did not complete; file will be offered again"
                );
                let identity = url.strip_prefix(FILE_URL_SCHEME).unwrap_or(url);
                if !self.tracker.remove(identity) {
                    debug!(identity = %identity, "failed file was not tracked");
                }
            }
        }
        Ok(())
    }

    /// Poll forever. Iteration errors are logged and survive; only the task
    /// being dropped ends the loop.
    pub async fn run(mut self) {
        info!("status processor loop started");
        loop {
            match self.process_once().await {
                Ok(0) => {}
                Ok(applied) => debug!(applied, "applied status events"),
                Err(err) => error!("status iteration failed: {err:#}"),
            }
            tokio::time::sleep(self.config.status_interval()).await;
        }
    }
}
