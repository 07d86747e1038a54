//! The stream client seam between portage and the upload pipeline.

use async_trait::async_trait;

use crate::error::StreamError;
use crate::types::{ReadOptions, SequencedMessage, StreamDefinition};

/// Durable queue abstraction offered by the upload pipeline.
///
/// Appends are executed out-of-band by the pipeline according to the stream's
/// export definition; outcomes come back on the configured status stream.
/// Implementations must be safe to share across tasks.
#[async_trait]
pub trait StreamClient: Send + Sync {
    /// Create a stream. Creating a stream that already exists is an error;
    /// callers wanting a fresh start delete first.
    async fn create_stream(&self, definition: &StreamDefinition) -> Result<(), StreamError>;

    /// Delete a stream and everything queued on it. Returns
    /// [`StreamError::NotFound`] if the stream does not exist; callers that
    /// only care about the end state treat that as success.
    async fn delete_stream(&self, name: &str) -> Result<(), StreamError>;

    /// Append a payload to a stream, returning its sequence number.
    async fn append(&self, stream: &str, payload: Vec<u8>) -> Result<u64, StreamError>;

    /// Read a bounded batch of messages in sequence order.
    ///
    /// Returns [`StreamError::NotEnoughMessages`] when fewer than
    /// `options.min_count` messages became available within the read timeout;
    /// this is a benign outcome, not a fault.
    async fn read(
        &self,
        stream: &str,
        options: &ReadOptions,
    ) -> Result<Vec<SequencedMessage>, StreamError>;

    /// Release the connection. Further calls fail with [`StreamError::Closed`].
    async fn close(&self) -> Result<(), StreamError>;
}
