//! Message framing shared by both channels
//!
//! No length prefix: each side writes one message and shuts down its write
//! half; the reader takes everything up to end-of-stream, bounded.

use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest control-channel message accepted (manifests with embedded data can be large)
pub const MAX_CONTROL_MESSAGE: usize = 16 * 1024 * 1024;

/// Largest data-channel response accepted
pub const MAX_DATA_RESPONSE: usize = 1024 * 1024;

/// Largest data-channel request accepted (64 hex chars plus slack for a newline)
pub const MAX_DATA_REQUEST: usize = 128;

/// How long a server gives one inbound connection before dropping it
pub const DEFAULT_REQUEST_DEADLINE: Duration = Duration::from_secs(10);

/// Read to end-of-stream, failing with `InvalidData` past `limit` bytes.
pub async fn read_to_end_bounded<R>(reader: &mut R, limit: usize) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let read = (&mut *reader)
        .take(limit as u64 + 1)
        .read_to_end(&mut buf)
        .await?;
    if read > limit {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("message exceeds {limit} bytes"),
        ));
    }
    Ok(buf)
}

/// Write one whole message, then close the write half.
pub async fn write_and_close<W>(writer: &mut W, message: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(message).await?;
    writer.flush().await?;
    writer.shutdown().await
}
