//! Async line transport over a pair of pipes.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::trace;

use crate::error::ProtocolError;

/// One control line out, one control line in.
///
/// Wraps a worker's stdin/stdout (or an in-memory duplex in tests). Every
/// sent line is flushed immediately; a read of zero bytes is reported as
/// [`ProtocolError::ChannelClosed`].
pub struct LineChannel<R, W> {
    reader: BufReader<R>,
    writer: W,
    buf: String,
}

impl<R, W> LineChannel<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            buf: String::new(),
        }
    }

    /// Write `line` plus a newline and flush.
    pub async fn send_line(&mut self, line: &str) -> Result<(), ProtocolError> {
        if line.contains(['\n', '\r']) {
            return Err(ProtocolError::Unencodable(
                "control line contains a newline".to_string(),
            ));
        }
        trace!(line = %line, "Sending control line");
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Read the next line with its terminator stripped.
    pub async fn recv_line(&mut self) -> Result<String, ProtocolError> {
        self.buf.clear();
        let bytes_read = self.reader.read_line(&mut self.buf).await?;
        if bytes_read == 0 {
            return Err(ProtocolError::ChannelClosed);
        }
        let line = self.buf.trim_end_matches(['\r', '\n']).to_string();
        trace!(line = %line, "Received control line");
        Ok(line)
    }

    /// [`recv_line`](Self::recv_line) bounded by `limit`.
    pub async fn recv_line_timeout(&mut self, limit: Duration) -> Result<String, ProtocolError> {
        match tokio::time::timeout(limit, self.recv_line()).await {
            Ok(result) => result,
            Err(_) => Err(ProtocolError::Timeout),
        }
    }
}
