//! Streaming multipart/form-data encoder for uploads
//!
//! A producer task writes the encoded body into a bounded channel that backs
//! the outgoing request, so content is never materialised in memory. Its
//! terminal status arrives on a oneshot channel once the pipe is closed.

use super::ByteStream;
use bytes::Bytes;
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;
use uuid::Uuid;

/// Chunks buffered between producer and request before the producer waits
const PIPE_DEPTH: usize = 8;

const RECEIVER_GONE: &str = "request body receiver dropped";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("opening form entry failed: {0}")]
    OpenEntry(String),

    #[error("copying content failed: {0}")]
    Copy(String),

    #[error("closing multipart body failed: {0}")]
    Close(String),
}

impl EncodeError {
    /// The request side hung up before the producer finished
    pub fn is_receiver_gone(&self) -> bool {
        match self {
            EncodeError::OpenEntry(m) | EncodeError::Copy(m) | EncodeError::Close(m) => {
                m == RECEIVER_GONE
            }
        }
    }
}

type Chunk = std::io::Result<Bytes>;

pub struct MultipartBody {
    pub content_type: String,
    pub body: reqwest::Body,
    /// Bytes of content copied, or where the producer failed
    pub status: oneshot::Receiver<Result<u64, EncodeError>>,
}

impl MultipartBody {
    /// Spawn the producer for a single `file` form entry
    pub fn encode(content: ByteStream, filename: &str) -> Self {
        let boundary = Uuid::new_v4().simple().to_string();
        let (stream, status) = spawn_producer(content, filename, &boundary);

        Self {
            content_type: format!("{}; boundary={}", mime::MULTIPART_FORM_DATA, boundary),
            body: reqwest::Body::wrap_stream(stream),
            status,
        }
    }

    /// Wait for the producer's terminal status
    pub async fn finish(status: oneshot::Receiver<Result<u64, EncodeError>>) -> Result<u64, EncodeError> {
        status
            .await
            .unwrap_or_else(|_| Err(EncodeError::Close("producer ended without status".to_string())))
    }
}

fn spawn_producer(
    content: ByteStream,
    filename: &str,
    boundary: &str,
) -> (ReceiverStream<Chunk>, oneshot::Receiver<Result<u64, EncodeError>>) {
    let (tx, rx) = mpsc::channel(PIPE_DEPTH);
    let (status_tx, status_rx) = oneshot::channel();

    let head = entry_header(boundary, filename);
    let tail = Bytes::from(format!("\r\n--{boundary}--\r\n"));

    tokio::spawn(async move {
        let status = produce(content, head, tail, &tx).await;
        if let Err(e) = &status {
            debug!(error = %e, "Multipart producer stopped");
        }
        // Closing the pipe ends the request body; only after every write.
        drop(tx);
        let _ = status_tx.send(status);
    });

    (ReceiverStream::new(rx), status_rx)
}

async fn produce(
    mut content: ByteStream,
    head: Bytes,
    tail: Bytes,
    tx: &mpsc::Sender<Chunk>,
) -> Result<u64, EncodeError> {
    tx.send(Ok(head))
        .await
        .map_err(|_| EncodeError::OpenEntry(RECEIVER_GONE.to_string()))?;

    let mut copied = 0u64;
    while let Some(chunk) = content.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                let message = e.to_string();
                // Fail the request too, so a truncated entry is never stored
                let _ = tx.send(Err(e)).await;
                return Err(EncodeError::Copy(message));
            }
        };

        copied += chunk.len() as u64;
        tx.send(Ok(chunk))
            .await
            .map_err(|_| EncodeError::Copy(RECEIVER_GONE.to_string()))?;
    }

    tx.send(Ok(tail))
        .await
        .map_err(|_| EncodeError::Close(RECEIVER_GONE.to_string()))?;

    Ok(copied)
}

fn entry_header(boundary: &str, filename: &str) -> Bytes {
    // The node query-unescapes part filenames
    let escaped: String = url::form_urlencoded::byte_serialize(filename.as_bytes()).collect();

    Bytes::from(format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"{escaped}\"\r\n\
         Content-Type: {}\r\n\r\n",
        mime::APPLICATION_OCTET_STREAM
    ))
}
