//! Payload types shared with the upload pipeline.
//!
//! These mirror the pipeline's wire schema: the pipeline executes the export
//! tasks appended to a data stream and publishes a status message per task to
//! a companion status stream. Portage owns neither encoding; it serializes
//! tasks on the way in and deserializes statuses on the way out.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ProtocolError;

/// URL scheme used for tracked file identities.
pub const FILE_URL_SCHEME: &str = "file://";

/// Build the canonical `file://` identity for a local path string.
pub fn file_url(path: &str) -> String {
    format!("{FILE_URL_SCHEME}{path}")
}

/// Recover the local filesystem path from a `file://` identity.
pub fn file_url_to_path(url: &str) -> Result<PathBuf, ProtocolError> {
    url.strip_prefix(FILE_URL_SCHEME)
        .filter(|rest| !rest.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| ProtocolError::NotAFileUrl(url.to_string()))
}

// ============================================================================
// Canonical Enums
// ============================================================================

/// Outcome of an export task as reported by the pipeline.
/// This is the CANONICAL definition - use this everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UploadStatus {
    /// The pipeline has started executing the task
    InProgress,
    /// The file reached the object store
    Success,
    /// The pipeline gave up on the task
    Failure,
    /// The task was cancelled (e.g. its stream was deleted)
    Canceled,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::InProgress => "InProgress",
            UploadStatus::Success => "Success",
            UploadStatus::Failure => "Failure",
            UploadStatus::Canceled => "Canceled",
        }
    }

    /// Terminal statuses end the pipeline's responsibility for the task.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadStatus::Success | UploadStatus::Failure | UploadStatus::Canceled
        )
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for UploadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "InProgress" => Ok(UploadStatus::InProgress),
            "Success" => Ok(UploadStatus::Success),
            "Failure" => Ok(UploadStatus::Failure),
            "Canceled" => Ok(UploadStatus::Canceled),
            _ => Err(format!("Invalid upload status: '{}'", s)),
        }
    }
}

/// Severity attached to status messages by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatusLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// Kind of event a status message refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum EventType {
    #[default]
    S3Task,
}

/// What a stream does when it reaches its size limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyOnFull {
    /// Drop the oldest entries to make room (default for portage streams)
    #[default]
    OverwriteOldest,
    /// Refuse new appends until entries age out
    RejectNew,
}

// ============================================================================
// Export Task
// ============================================================================

/// One file transfer request, appended to the data stream.
///
/// `input_url` doubles as the tracked file identity: the status message for
/// this task echoes the whole task back, which is how outcomes are correlated
/// with local files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3ExportTask {
    /// `file://` URL of the local file to upload
    pub input_url: String,
    /// Destination bucket
    pub bucket: String,
    /// Destination object key
    pub key: String,
}

impl S3ExportTask {
    pub fn new(
        input_url: impl Into<String>,
        bucket: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            input_url: input_url.into(),
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Check the task against the pipeline's schema constraints.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if !self.input_url.starts_with(FILE_URL_SCHEME)
            || self.input_url.len() == FILE_URL_SCHEME.len()
        {
            return Err(ProtocolError::Validation(format!(
                "input_url must be a non-empty {FILE_URL_SCHEME} URL, got '{}'",
                self.input_url
            )));
        }
        if self.bucket.is_empty() {
            return Err(ProtocolError::Validation("bucket must not be empty".into()));
        }
        if self.key.is_empty() || self.key == "/" {
            return Err(ProtocolError::Validation(format!(
                "key must name an object, got '{}'",
                self.key
            )));
        }
        Ok(())
    }

    /// Validate, then serialize to the pipeline's JSON encoding.
    pub fn to_validated_json(&self) -> Result<Vec<u8>, ProtocolError> {
        self.validate()?;
        Ok(serde_json::to_vec(self)?)
    }
}

// ============================================================================
// Status Messages
// ============================================================================

/// Context echoed back with each status message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusContext {
    /// The task this status refers to
    pub s3_export_task: S3ExportTask,
    /// Sequence number the task occupied on the data stream
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sequence_number: Option<u64>,
}

/// One outcome report read from the status stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessage {
    pub event_type: EventType,
    pub status_level: StatusLevel,
    pub status: UploadStatus,
    pub status_context: StatusContext,
    /// Free-text detail, populated on failures
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timestamp_epoch_ms: Option<i64>,
}

impl StatusMessage {
    /// Decode a status message from a raw stream payload.
    pub fn from_json(payload: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// The tracked file identity this status refers to.
    pub fn file_url(&self) -> &str {
        &self.status_context.s3_export_task.input_url
    }
}

// ============================================================================
// Stream Management
// ============================================================================

/// Where the pipeline should publish statuses for exported tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusConfig {
    pub status_level: StatusLevel,
    pub status_stream_name: String,
}

/// Configuration of one S3 task executor attached to a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3ExportTaskExecutorConfig {
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status_config: Option<StatusConfig>,
}

/// Export wiring for a stream: who executes its entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDefinition {
    pub s3_task_executor: Vec<S3ExportTaskExecutorConfig>,
}

/// Definition used to create a stream on the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDefinition {
    pub name: String,
    pub strategy_on_full: StrategyOnFull,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub export_definition: Option<ExportDefinition>,
}

impl StreamDefinition {
    pub fn new(name: impl Into<String>, strategy_on_full: StrategyOnFull) -> Self {
        Self {
            name: name.into(),
            strategy_on_full,
            export_definition: None,
        }
    }

    pub fn with_export(mut self, export: ExportDefinition) -> Self {
        self.export_definition = Some(export);
        self
    }
}

// ============================================================================
// Reads
// ============================================================================

/// Options for a bounded read from a status stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOptions {
    /// First sequence number the caller is interested in
    pub desired_start_sequence: u64,
    /// Fewer available messages than this within the timeout is reported as
    /// `StreamError::NotEnoughMessages`, which callers treat as an empty batch
    pub min_count: usize,
    pub max_count: usize,
    pub read_timeout: Duration,
}

/// A payload read back from a stream, with its position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencedMessage {
    pub sequence: u64,
    pub payload: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_url_round_trip() {
        let url = file_url("/var/spool/a.csv");
        assert_eq!(url, "file:///var/spool/a.csv");
        assert_eq!(
            file_url_to_path(&url).unwrap(),
            PathBuf::from("/var/spool/a.csv")
        );
    }

    #[test]
    fn file_url_rejects_other_schemes() {
        assert!(file_url_to_path("s3://bucket/key").is_err());
        assert!(file_url_to_path("file://").is_err());
    }

    #[test]
    fn task_validation() {
        let task = S3ExportTask::new("file:///tmp/a.csv", "bucket", "logs/a.csv");
        assert!(task.validate().is_ok());

        let no_bucket = S3ExportTask::new("file:///tmp/a.csv", "", "logs/a.csv");
        assert!(matches!(
            no_bucket.validate(),
            Err(ProtocolError::Validation(_))
        ));

        let bad_url = S3ExportTask::new("/tmp/a.csv", "bucket", "logs/a.csv");
        assert!(bad_url.validate().is_err());

        let no_key = S3ExportTask::new("file:///tmp/a.csv", "bucket", "");
        assert!(no_key.validate().is_err());
    }

    #[test]
    fn status_message_round_trip() {
        let task = S3ExportTask::new("file:///tmp/a.csv", "bucket", "logs/a.csv");
        let status = StatusMessage {
            event_type: EventType::S3Task,
            status_level: StatusLevel::Info,
            status: UploadStatus::Failure,
            status_context: StatusContext {
                s3_export_task: task,
                sequence_number: Some(7),
            },
            message: Some("access denied".into()),
            timestamp_epoch_ms: Some(1),
        };
        let bytes = serde_json::to_vec(&status).unwrap();
        let decoded = StatusMessage::from_json(&bytes).unwrap();
        assert_eq!(decoded, status);
        assert_eq!(decoded.file_url(), "file:///tmp/a.csv");
    }

    #[test]
    fn status_message_wire_field_names() {
        let task = S3ExportTask::new("file:///tmp/a.csv", "bucket", "logs/a.csv");
        let json = serde_json::to_value(&task).unwrap();
        assert!(json.get("inputUrl").is_some());

        let status = StatusMessage {
            event_type: EventType::S3Task,
            status_level: StatusLevel::Info,
            status: UploadStatus::Success,
            status_context: StatusContext {
                s3_export_task: task,
                sequence_number: None,
            },
            message: None,
            timestamp_epoch_ms: None,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "Success");
        assert_eq!(json["statusLevel"], "INFO");
        assert!(json.get("message").is_none());
    }

    #[test]
    fn upload_status_parse() {
        assert_eq!(
            "Canceled".parse::<UploadStatus>().unwrap(),
            UploadStatus::Canceled
        );
        assert!("Done".parse::<UploadStatus>().is_err());
        assert!(UploadStatus::Success.is_terminal());
        assert!(!UploadStatus::InProgress.is_terminal());
    }
}
