//! Socket transport for [`StreamClient`].
//!
//! The pipeline daemon listens on a TCP endpoint and speaks newline-delimited
//! JSON: one request per line, one response per line, in order. This module
//! carries the request/response envelope and a client that adapts it to the
//! [`StreamClient`] trait.

use std::io;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;
use tracing::debug;

use crate::client::StreamClient;
use crate::error::{StreamError, StreamErrorKind};
use crate::types::{ReadOptions, SequencedMessage, StreamDefinition};

/// One request line sent to the pipeline daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PipelineRequest {
    CreateStream { definition: StreamDefinition },
    DeleteStream { name: String },
    Append { stream: String, payload: Vec<u8> },
    Read { stream: String, options: ReadOptions },
}

/// One response line received from the pipeline daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PipelineResponse {
    Ok,
    Sequence {
        sequence: u64,
    },
    Messages {
        messages: Vec<SequencedMessage>,
    },
    Error {
        kind: StreamErrorKind,
        message: String,
    },
}

impl PipelineResponse {
    /// Build the response for a plain `Result`.
    pub fn from_result(result: Result<(), StreamError>) -> Self {
        match result {
            Ok(()) => PipelineResponse::Ok,
            Err(err) => PipelineResponse::Error {
                kind: err.kind(),
                message: err.to_string(),
            },
        }
    }
}

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

/// [`StreamClient`] over a TCP connection to the pipeline daemon.
///
/// Requests are serialized on a single connection; the pipeline answers in
/// order, so one in-flight request at a time is enough for portage's two
/// loops.
pub struct RemoteStreamClient {
    conn: Mutex<Option<Connection>>,
}

impl RemoteStreamClient {
    /// Connect to the pipeline daemon.
    pub async fn connect(endpoint: impl ToSocketAddrs) -> Result<Self, StreamError> {
        let stream = TcpStream::connect(endpoint).await.map_err(transport)?;
        stream.set_nodelay(true).map_err(transport)?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            conn: Mutex::new(Some(Connection {
                reader: BufReader::new(read_half),
                writer: write_half,
            })),
        })
    }

    async fn call(&self, request: &PipelineRequest) -> Result<PipelineResponse, StreamError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(StreamError::Closed)?;

        let mut line = serde_json::to_vec(request)
            .map_err(|err| StreamError::Transport(format!("encoding request: {err}")))?;
        line.push(b'\n');
        conn.writer.write_all(&line).await.map_err(transport)?;
        conn.writer.flush().await.map_err(transport)?;

        let mut response = String::new();
        let read = conn.reader.read_line(&mut response).await.map_err(transport)?;
        if read == 0 {
            return Err(StreamError::Transport(
                "pipeline closed the connection".into(),
            ));
        }
        let response: PipelineResponse = serde_json::from_str(response.trim_end())
            .map_err(|err| StreamError::Transport(format!("decoding response: {err}")))?;
        if let PipelineResponse::Error { kind, message } = response {
            return Err(StreamError::from_kind(kind, message));
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl StreamClient for RemoteStreamClient {
    async fn create_stream(&self, definition: &StreamDefinition) -> Result<(), StreamError> {
        match self
            .call(&PipelineRequest::CreateStream {
                definition: definition.clone(),
            })
            .await?
        {
            PipelineResponse::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn delete_stream(&self, name: &str) -> Result<(), StreamError> {
        match self
            .call(&PipelineRequest::DeleteStream {
                name: name.to_string(),
            })
            .await?
        {
            PipelineResponse::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn append(&self, stream: &str, payload: Vec<u8>) -> Result<u64, StreamError> {
        match self
            .call(&PipelineRequest::Append {
                stream: stream.to_string(),
                payload,
            })
            .await?
        {
            PipelineResponse::Sequence { sequence } => Ok(sequence),
            other => Err(unexpected(other)),
        }
    }

    async fn read(
        &self,
        stream: &str,
        options: &ReadOptions,
    ) -> Result<Vec<SequencedMessage>, StreamError> {
        match self
            .call(&PipelineRequest::Read {
                stream: stream.to_string(),
                options: options.clone(),
            })
            .await?
        {
            PipelineResponse::Messages { messages } => Ok(messages),
            other => Err(unexpected(other)),
        }
    }

    async fn close(&self) -> Result<(), StreamError> {
        let mut guard = self.conn.lock().await;
        if let Some(mut conn) = guard.take() {
            debug!("closing pipeline connection");
            let _ = conn.writer.shutdown().await;
        }
        Ok(())
    }
}

fn transport(err: io::Error) -> StreamError {
    StreamError::Transport(err.to_string())
}

fn unexpected(response: PipelineResponse) -> StreamError {
    StreamError::Transport(format!("unexpected pipeline response: {response:?}"))
}
