//! Line-delimited JSON framing over stdin/stdout
//!
//! One JSON-RPC message per line. Reads use a bounded wait so the server loop regains
//! control on an idle pipe; writes are serialized so concurrent responses never interleave.

use std::{io, sync::Arc, time::Duration};

use serde_json::Value;
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines},
    sync::Mutex,
};
use tracing::{trace, warn};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to read from input stream: {0}")]
    Read(#[source] io::Error),
    #[error("failed to write to output stream: {0}")]
    Write(#[source] io::Error),
    #[error("failed to serialize response: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    Line(String),
    /// Nothing complete arrived within the wait, or the line was blank or undecodable.
    Idle,
    Closed,
}

pub struct LineReader<R> {
    lines: Lines<BufReader<R>>,
}

impl<R> LineReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
        }
    }

    /// Waits at most `wait` for the next line. `Lines::next_line` is cancel safe, so a
    /// line that is only partially buffered when the wait expires is kept for the next call.
    pub async fn next(&mut self, wait: Duration) -> Result<ReadOutcome, TransportError> {
        let next_line = match tokio::time::timeout(wait, self.lines.next_line()).await {
            Err(_) => return Ok(ReadOutcome::Idle),
            Ok(next_line) => next_line,
        };

        match next_line {
            Ok(Some(line)) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    return Ok(ReadOutcome::Idle);
                }
                trace!(len = trimmed.len(), "read message");
                Ok(ReadOutcome::Line(trimmed.to_string()))
            }
            Ok(None) => Ok(ReadOutcome::Closed),
            Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                warn!(error = %err, "discarding undecodable input line");
                Ok(ReadOutcome::Idle)
            }
            Err(err) => Err(TransportError::Read(err)),
        }
    }
}

/// Shared handle to the output stream. Each `send` writes one complete line and flushes.
pub struct ResponseWriter<W> {
    inner: Arc<Mutex<W>>,
}

impl<W> Clone for ResponseWriter<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W> ResponseWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    pub async fn send(&self, message: &Value) -> Result<(), TransportError> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        trace!(len = line.len(), "writing message");

        let mut writer = self.inner.lock().await;
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(TransportError::Write)?;
        writer.flush().await.map_err(TransportError::Write)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    const WAIT: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn reads_trimmed_lines_until_eof() {
        let input: &[u8] = b"  {\"a\":1}  \nsecond\n";
        let mut reader = LineReader::new(input);

        assert_eq!(
            reader.next(WAIT).await.expect("read"),
            ReadOutcome::Line("{\"a\":1}".to_string())
        );
        assert_eq!(
            reader.next(WAIT).await.expect("read"),
            ReadOutcome::Line("second".to_string())
        );
        assert_eq!(reader.next(WAIT).await.expect("read"), ReadOutcome::Closed);
    }

    #[tokio::test]
    async fn blank_lines_are_idle() {
        let input: &[u8] = b"\n   \n";
        let mut reader = LineReader::new(input);

        assert_eq!(reader.next(WAIT).await.expect("read"), ReadOutcome::Idle);
        assert_eq!(reader.next(WAIT).await.expect("read"), ReadOutcome::Idle);
        assert_eq!(reader.next(WAIT).await.expect("read"), ReadOutcome::Closed);
    }

    #[tokio::test]
    async fn idle_pipe_times_out_without_losing_partial_line() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut reader = LineReader::new(server);

        client.write_all(b"{\"partial\":").await.expect("write");
        assert_eq!(
            reader.next(Duration::from_millis(50)).await.expect("read"),
            ReadOutcome::Idle
        );

        client.write_all(b"true}\n").await.expect("write");
        assert_eq!(
            reader.next(WAIT).await.expect("read"),
            ReadOutcome::Line("{\"partial\":true}".to_string())
        );
    }

    #[tokio::test]
    async fn invalid_utf8_line_is_discarded() {
        let input: &[u8] = b"\xff\xfe\n{\"ok\":true}\n";
        let mut reader = LineReader::new(input);

        assert_eq!(reader.next(WAIT).await.expect("read"), ReadOutcome::Idle);
        assert_eq!(
            reader.next(WAIT).await.expect("read"),
            ReadOutcome::Line("{\"ok\":true}".to_string())
        );
    }

    #[tokio::test]
    async fn writer_emits_one_line_per_message() {
        let (server, mut client) = tokio::io::duplex(1024);
        let writer = ResponseWriter::new(server);

        writer.send(&json!({ "id": 1 })).await.expect("send");
        writer.clone().send(&json!({ "id": 2 })).await.expect("send");
        drop(writer);

        let mut output = String::new();
        client.read_to_string(&mut output).await.expect("read output");
        assert_eq!(output, "{\"id\":1}\n{\"id\":2}\n");
    }
}
