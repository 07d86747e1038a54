//! Portage pipeline protocol.
//!
//! Payload types for the upload pipeline's streams, the [`StreamClient`]
//! trait through which portage consumes the pipeline, and the socket
//! transport used by the portage binary.

pub mod client;
pub mod error;
pub mod remote;
pub mod types;

pub use client::StreamClient;
pub use error::{ProtocolError, StreamError, StreamErrorKind};
pub use remote::{PipelineRequest, PipelineResponse, RemoteStreamClient};
pub use types::{
    file_url, file_url_to_path, EventType, ExportDefinition, ReadOptions, S3ExportTask,
    S3ExportTaskExecutorConfig, SequencedMessage, StatusConfig, StatusContext, StatusLevel,
    StatusMessage, StrategyOnFull, StreamDefinition, UploadStatus, FILE_URL_SCHEME,
};
