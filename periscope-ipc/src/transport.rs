//! Frame codec for the request and response streams
//!
//! Frames are newline-delimited JSON envelopes. `send_frame` flushes but
//! never closes the stream: the receiving side reads exactly one frame
//! and relies on the flush, not on end-of-stream.

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::IpcError;
use crate::protocol::{MessageEnvelope, PROTOCOL_VERSION};

/// Serialize one envelope onto the stream and flush it
pub async fn send_frame<W, T>(writer: &mut W, envelope: &MessageEnvelope<T>) -> Result<(), IpcError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut frame = serde_json::to_vec(envelope)?;
    frame.push(b'\n');

    writer.write_all(&frame).await?;
    writer.flush().await?;

    Ok(())
}

/// Block until one complete envelope is available or the stream closes
pub async fn recv_frame<R, T>(reader: &mut R) -> Result<MessageEnvelope<T>, IpcError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut buffered = BufReader::new(reader);
    let mut line = String::new();

    buffered.read_line(&mut line).await?;
    if line.is_empty() {
        return Err(IpcError::ConnectionClosed);
    }

    let envelope: MessageEnvelope<T> = serde_json::from_str(line.trim_end())?;

    if !envelope.is_compatible() {
        return Err(IpcError::VersionMismatch {
            expected: PROTOCOL_VERSION,
            actual: envelope.protocol_version,
        });
    }

    Ok(envelope)
}
