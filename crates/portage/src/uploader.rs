//! Synchronizer orchestration: owns the streams, the tracker, and both loops.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use portage_protocol::{
    ExportDefinition, S3ExportTaskExecutorConfig, StatusConfig, StatusLevel, StreamClient,
    StreamDefinition, StreamError, StrategyOnFull,
};

use crate::config::UploaderConfig;
use crate::scan::FolderScanner;
use crate::status::StatusProcessor;
use crate::tracker::ProcessedSet;

/// Cooldown the supervising caller waits before rebuilding a failed
/// synchronizer from scratch.
pub const RESTART_COOLDOWN: Duration = Duration::from_secs(60);

/// Watches one directory pattern and keeps it synchronized with one bucket.
///
/// Construction prepares the pipeline streams; [`run`](Self::run) drives the
/// scanner and status processor concurrently. The tracker starts empty on
/// every construction: a restart re-derives truth from the next directory
/// listing plus whatever the pipeline still remembers.
pub struct DirectoryUploader {
    config: Arc<UploaderConfig>,
    client: Arc<dyn StreamClient>,
    tracker: ProcessedSet,
}

impl DirectoryUploader {
    /// Set up the pipeline streams and build the synchronizer.
    ///
    /// Any streams left behind by a previous run are deleted first so every
    /// start is fresh. Transfers that were still queued are cancelled and
    /// re-offered by the first scan; acknowledgements lost with the status
    /// stream mean the file is transferred again. Both are acceptable.
    pub async fn new(config: UploaderConfig, client: Arc<dyn StreamClient>) -> Result<Self> {
        let config = Arc::new(config);

        for name in [config.status_stream_name(), config.stream_name()] {
            match client.delete_stream(&name).await {
                Ok(()) | Err(StreamError::NotFound(_)) => {}
                Err(err) => {
                    return Err(err).with_context(|| format!("deleting stream {name}"));
                }
            }
        }

        client
            .create_stream(&StreamDefinition::new(
                config.status_stream_name(),
                StrategyOnFull::OverwriteOldest,
            ))
            .await
            .context("creating status stream")?;

        let export = ExportDefinition {
            s3_task_executor: vec![S3ExportTaskExecutorConfig {
                identifier: format!("S3TaskExecutor{}", config.stream_name()),
                status_config: Some(StatusConfig {
                    status_level: StatusLevel::Info,
                    status_stream_name: config.status_stream_name(),
                }),
            }],
        };
        client
            .create_stream(
                &StreamDefinition::new(config.stream_name(), StrategyOnFull::OverwriteOldest)
                    .with_export(export),
            )
            .await
            .context("creating data stream")?;

        info!(
            stream = %config.stream_name(),
            status_stream = %config.status_stream_name(),
            "pipeline streams ready"
        );

        Ok(Self {
            config,
            client,
            tracker: ProcessedSet::new(),
        })
    }

    /// Handle to the shared tracker.
    pub fn tracker(&self) -> ProcessedSet {
        self.tracker.clone()
    }

    /// Build the scanner half, sharing this synchronizer's tracker.
    pub fn scanner(&self) -> FolderScanner {
        FolderScanner::new(
            self.config.clone(),
            self.client.clone(),
            self.tracker.clone(),
        )
    }

    /// Build the status-processing half, sharing this synchronizer's tracker.
    pub fn status_processor(&self) -> StatusProcessor {
        StatusProcessor::new(
            self.config.clone(),
            self.client.clone(),
            self.tracker.clone(),
        )
    }

    /// Run both loops concurrently until either terminates.
    ///
    /// Returning at the first termination is deliberate fail-fast: one loop
    /// dying is a whole-synchronizer failure. The surviving task is abandoned
    /// rather than cancelled; the caller discards the instance and rebuilds
    /// after [`RESTART_COOLDOWN`].
    pub async fn run(&self) -> Result<()> {
        let scan_task = tokio::spawn(self.scanner().run());
        let status_task = tokio::spawn(self.status_processor().run());
        tokio::select! {
            res = scan_task => res.context("scanner loop terminated")?,
            res = status_task => res.context("status processor loop terminated")?,
        }
        Ok(())
    }

    /// Release the pipeline connection. Call once after [`run`](Self::run)
    /// returns.
    pub async fn close(&self) -> Result<()> {
        self.client.close().await.context("closing pipeline client")
    }
}
