//! Test doubles for the upload pipeline.
//!
//! [`MemoryStreamClient`] is a faithful in-process implementation of
//! [`StreamClient`]: sequence numbers, `NotEnoughMessages`, and idempotent
//! management behave like the real pipeline, minus the network and the actual
//! S3 transfer. [`MemoryPipelineServer`] exposes a `MemoryStreamClient` over
//! the socket transport so `RemoteStreamClient` can be exercised end to end.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::debug;

use portage_protocol::{
    EventType, PipelineRequest, PipelineResponse, ReadOptions, S3ExportTask, SequencedMessage,
    StatusContext, StatusLevel, StatusMessage, StreamClient, StreamDefinition, StreamError,
    UploadStatus,
};

// ============================================================================
// In-memory stream client
// ============================================================================

#[derive(Debug)]
struct StreamState {
    definition: StreamDefinition,
    next_sequence: u64,
    messages: Vec<SequencedMessage>,
}

/// In-memory [`StreamClient`] with the real client's observable semantics.
#[derive(Default)]
pub struct MemoryStreamClient {
    streams: Mutex<HashMap<String, StreamState>>,
    closed: AtomicBool,
}

impl MemoryStreamClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn ensure_open(&self) -> Result<(), StreamError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StreamError::Closed);
        }
        Ok(())
    }

    /// Everything appended to a stream so far, for assertions.
    pub fn messages(&self, stream: &str) -> Vec<SequencedMessage> {
        self.streams
            .lock()
            .unwrap()
            .get(stream)
            .map(|state| state.messages.clone())
            .unwrap_or_default()
    }

    /// Number of payloads appended to a stream so far.
    pub fn message_count(&self, stream: &str) -> usize {
        self.messages(stream).len()
    }

    /// Definition a stream was created with, for assertions on export wiring.
    pub fn stream_definition(&self, stream: &str) -> Option<StreamDefinition> {
        self.streams
            .lock()
            .unwrap()
            .get(stream)
            .map(|state| state.definition.clone())
    }

    /// Names of the streams currently existing.
    pub fn stream_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.streams.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl StreamClient for MemoryStreamClient {
    async fn create_stream(&self, definition: &StreamDefinition) -> Result<(), StreamError> {
        self.ensure_open()?;
        let mut streams = self.streams.lock().unwrap();
        if streams.contains_key(&definition.name) {
            return Err(StreamError::AlreadyExists(definition.name.clone()));
        }
        streams.insert(
            definition.name.clone(),
            StreamState {
                definition: definition.clone(),
                next_sequence: 0,
                messages: Vec::new(),
            },
        );
        Ok(())
    }

    async fn delete_stream(&self, name: &str) -> Result<(), StreamError> {
        self.ensure_open()?;
        self.streams
            .lock()
            .unwrap()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StreamError::NotFound(name.to_string()))
    }

    async fn append(&self, stream: &str, payload: Vec<u8>) -> Result<u64, StreamError> {
        self.ensure_open()?;
        let mut streams = self.streams.lock().unwrap();
        let state = streams
            .get_mut(stream)
            .ok_or_else(|| StreamError::NotFound(stream.to_string()))?;
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.messages.push(SequencedMessage { sequence, payload });
        Ok(sequence)
    }

    async fn read(
        &self,
        stream: &str,
        options: &ReadOptions,
    ) -> Result<Vec<SequencedMessage>, StreamError> {
        self.ensure_open()?;
        if options.max_count == 0 || options.min_count > options.max_count {
            return Err(StreamError::InvalidRequest(format!(
                "min_count {} / max_count {}",
                options.min_count, options.max_count
            )));
        }
        let streams = self.streams.lock().unwrap();
        let state = streams
            .get(stream)
            .ok_or_else(|| StreamError::NotFound(stream.to_string()))?;
        let available: Vec<SequencedMessage> = state
            .messages
            .iter()
            .filter(|message| message.sequence >= options.desired_start_sequence)
            .take(options.max_count)
            .cloned()
            .collect();
        // The in-memory pipeline never waits: a short batch is reported
        // immediately instead of after the read timeout.
        if available.len() < options.min_count {
            return Err(StreamError::NotEnoughMessages);
        }
        Ok(available)
    }

    async fn close(&self) -> Result<(), StreamError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Status message builders
// ============================================================================

/// Build a status message the way the pipeline reports one.
pub fn status_message(
    status: UploadStatus,
    task: S3ExportTask,
    detail: Option<&str>,
) -> StatusMessage {
    StatusMessage {
        event_type: EventType::S3Task,
        status_level: match status {
            UploadStatus::Failure | UploadStatus::Canceled => StatusLevel::Error,
            _ => StatusLevel::Info,
        },
        status,
        status_context: StatusContext {
            s3_export_task: task,
            sequence_number: None,
        },
        message: detail.map(str::to_string),
        timestamp_epoch_ms: Some(chrono::Utc::now().timestamp_millis()),
    }
}

/// Serialized form of [`status_message`], ready to append to a status stream.
pub fn status_payload(status: UploadStatus, task: S3ExportTask, detail: Option<&str>) -> Vec<u8> {
    serde_json::to_vec(&status_message(status, task, detail))
        .expect("status message serializes")
}

// ============================================================================
// Socket-facing pipeline server
// ============================================================================

/// Serves a [`MemoryStreamClient`] over the newline-delimited JSON transport.
pub struct MemoryPipelineServer {
    addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl MemoryPipelineServer {
    /// Bind an ephemeral local port and start serving.
    pub async fn start(client: Arc<MemoryStreamClient>) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((socket, peer)) => {
                        debug!(%peer, "pipeline connection accepted");
                        let client = client.clone();
                        tokio::spawn(async move {
                            if let Err(err) = serve_connection(socket, client).await {
                                debug!(%peer, error = %err, "pipeline connection ended");
                            }
                        });
                    }
                    Err(err) => {
                        debug!(error = %err, "pipeline accept failed");
                        break;
                    }
                }
            }
        });
        Ok(Self { addr, accept_task })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for MemoryPipelineServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve_connection(socket: TcpStream, client: Arc<MemoryStreamClient>) -> io::Result<()> {
    let (read_half, mut write_half) = socket.into_split();
    let mut lines = BufReader::new(read_half).lines();
    while let Some(line) = lines.next_line().await? {
        let response = match serde_json::from_str::<PipelineRequest>(&line) {
            Ok(request) => dispatch(&client, request).await,
            Err(err) => PipelineResponse::Error {
                kind: portage_protocol::StreamErrorKind::InvalidRequest,
                message: format!("malformed request: {err}"),
            },
        };
        let mut encoded = serde_json::to_vec(&response).expect("response serializes");
        encoded.push(b'\n');
        write_half.write_all(&encoded).await?;
        write_half.flush().await?;
    }
    Ok(())
}

async fn dispatch(client: &MemoryStreamClient, request: PipelineRequest) -> PipelineResponse {
    match request {
        PipelineRequest::CreateStream { definition } => {
            PipelineResponse::from_result(client.create_stream(&definition).await)
        }
        PipelineRequest::DeleteStream { name } => {
            PipelineResponse::from_result(client.delete_stream(&name).await)
        }
        PipelineRequest::Append { stream, payload } => {
            match client.append(&stream, payload).await {
                Ok(sequence) => PipelineResponse::Sequence { sequence },
                Err(err) => PipelineResponse::Error {
                    kind: err.kind(),
                    message: err.to_string(),
                },
            }
        }
        PipelineRequest::Read { stream, options } => {
            match client.read(&stream, &options).await {
                Ok(messages) => PipelineResponse::Messages { messages },
                Err(err) => PipelineResponse::Error {
                    kind: err.kind(),
                    message: err.to_string(),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn read_options(start: u64, min: usize, max: usize) -> ReadOptions {
        ReadOptions {
            desired_start_sequence: start,
            min_count: min,
            max_count: max,
            read_timeout: Duration::from_millis(1000),
        }
    }

    #[tokio::test]
    async fn append_assigns_increasing_sequences() {
        let client = MemoryStreamClient::new();
        client
            .create_stream(&StreamDefinition::new(
                "s",
                portage_protocol::StrategyOnFull::OverwriteOldest,
            ))
            .await
            .unwrap();
        assert_eq!(client.append("s", b"a".to_vec()).await.unwrap(), 0);
        assert_eq!(client.append("s", b"b".to_vec()).await.unwrap(), 1);
        assert_eq!(client.message_count("s"), 2);
    }

    #[tokio::test]
    async fn read_honors_start_min_and_max() {
        let client = MemoryStreamClient::new();
        client
            .create_stream(&StreamDefinition::new(
                "s",
                portage_protocol::StrategyOnFull::OverwriteOldest,
            ))
            .await
            .unwrap();
        for payload in [b"a", b"b", b"c"] {
            client.append("s", payload.to_vec()).await.unwrap();
        }

        let batch = client.read("s", &read_options(1, 1, 5)).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].sequence, 1);

        let capped = client.read("s", &read_options(0, 1, 2)).await.unwrap();
        assert_eq!(capped.len(), 2);

        assert!(matches!(
            client.read("s", &read_options(3, 1, 5)).await,
            Err(StreamError::NotEnoughMessages)
        ));
    }

    #[tokio::test]
    async fn delete_missing_stream_reports_not_found() {
        let client = MemoryStreamClient::new();
        assert!(matches!(
            client.delete_stream("nope").await,
            Err(StreamError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn closed_client_rejects_operations() {
        let client = MemoryStreamClient::new();
        client.close().await.unwrap();
        assert!(matches!(
            client.append("s", Vec::new()).await,
            Err(StreamError::Closed)
        ));
    }
}
