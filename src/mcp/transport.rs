//! Newline-delimited JSON framing.
//!
//! One JSON-RPC message per line, UTF-8, no length prefix. `serde_json`
//! never emits raw newlines, so a serialised message is always a single
//! line. On stdio the peer writes to our stdin and reads our stdout; stderr
//! stays free for logs.
//!
//! [`LineTransport`] is generic over any async reader/writer pair: the
//! process's own stdio, a spawned child's pipes, or in-memory pipes in
//! tests.

use std::io;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

/// A line-framed JSON-RPC transport over a reader/writer pair.
pub struct LineTransport<R, W> {
    /// Buffered reader for incoming lines.
    reader: BufReader<R>,
    /// Sink for outgoing lines.
    writer: W,
}

/// The transport over the process's own stdin/stdout.
pub type StdioTransport = LineTransport<tokio::io::Stdin, tokio::io::Stdout>;

impl StdioTransport {
    /// Creates a transport over stdin/stdout.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a transport over the given streams.
    #[must_use]
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    /// Reads the next message line.
    ///
    /// Returns `None` at EOF. The trailing newline (and a preceding `\r`)
    /// is stripped.
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` if the line is not UTF-8. The line is consumed
    /// either way, so the caller may keep reading. Any other error comes
    /// from the reader.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut frame = Vec::new();
        if self.reader.read_until(b'\n', &mut frame).await? == 0 {
            return Ok(None);
        }

        if frame.last() == Some(&b'\n') {
            frame.pop();
            if frame.last() == Some(&b'\r') {
                frame.pop();
            }
        }

        String::from_utf8(frame)
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Serialises any JSON-RPC message onto one line and flushes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` if serialisation fails, or the writer's error.
    pub async fn write_message<T: Serialize + ?Sized>(&mut self, message: &T) -> io::Result<()> {
        let mut frame = serde_json::to_vec(message)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        debug_assert!(!frame.contains(&b'\n'), "serde_json never emits raw newlines");
        frame.push(b'\n');

        self.writer.write_all(&frame).await?;
        self.writer.flush().await
    }

    /// Shuts down the write half.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown fails.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.writer.shutdown().await
    }
}
