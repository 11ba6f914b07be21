//! Newline-delimited JSON frame codec.
//!
//! Each frame is one JSON object followed by `\n`:
//!
//! ```text
//! {"cmd":"PING","args":[]}
//! {"status":"OK","message":"PONG"}
//! ```
//!
//! The codec is generic over tokio's buffered I/O traits so it works on TCP
//! halves as well as in-memory duplex streams.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::TransportError;
use crate::wire::{Command, Response};

/// Writes one frame and flushes it.
pub async fn write_frame<W, T>(writer: &mut W, frame: &T) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut bytes = serde_json::to_vec(frame)?;
    bytes.push(b'\n');
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame, using `line` as scratch space.
///
/// Returns [`TransportError::Eof`] when the peer has closed the stream.
pub async fn read_frame<R, T>(reader: &mut R, line: &mut String) -> Result<T, TransportError>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    line.clear();
    let bytes_read = reader.read_line(line).await?;
    if bytes_read == 0 {
        return Err(TransportError::Eof);
    }
    Ok(serde_json::from_str(line.trim_end())?)
}

/// Writes a command frame.
pub async fn write_command<W>(writer: &mut W, command: &Command) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    write_frame(writer, command).await
}

/// Reads a result frame.
pub async fn read_response<R>(reader: &mut R, line: &mut String) -> Result<Response, TransportError>
where
    R: AsyncBufRead + Unpin,
{
    read_frame(reader, line).await
}
