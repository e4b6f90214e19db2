//! Message channel framing
//!
//! Messages travel as one JSON object per line. A parent writes to the
//! child's stdin and reads the child's stdout; the child does the reverse.
//! Logging therefore has to go to stderr in every corral process.

use crate::error::{CorralError, Result};
use crate::message::Message;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter,
};
use tracing::warn;

/// Longest line a reader accepts; longer lines are discarded
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Encode a message as a single newline-terminated line
pub fn encode_line(message: &Message) -> Result<String> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

/// Writing half of a message channel
pub struct MessageWriter<W> {
    inner: BufWriter<W>,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    /// Wrap an async byte sink
    pub fn new(inner: W) -> Self {
        Self {
            inner: BufWriter::new(inner),
        }
    }

    /// Write one message and flush it to the peer
    pub async fn send(&mut self, message: &Message) -> Result<()> {
        let line = encode_line(message)?;
        self.inner
            .write_all(line.as_bytes())
            .await
            .map_err(|e| CorralError::Channel(format!("failed to write {}: {}", message.event, e)))?;
        self.inner
            .flush()
            .await
            .map_err(|e| CorralError::Channel(format!("failed to flush {}: {}", message.event, e)))?;
        Ok(())
    }
}

impl<W> std::fmt::Debug for MessageWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageWriter").finish_non_exhaustive()
    }
}

/// Reading half of a message channel
pub struct MessageReader<R> {
    inner: BufReader<R>,
    line: Vec<u8>,
    max_line_bytes: usize,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    /// Wrap an async byte source
    pub fn new(inner: R) -> Self {
        Self::with_max_line_bytes(inner, MAX_LINE_BYTES)
    }

    /// Wrap an async byte source, discarding lines longer than `max_line_bytes`
    pub fn with_max_line_bytes(inner: R, max_line_bytes: usize) -> Self {
        Self {
            inner: BufReader::new(inner),
            line: Vec::new(),
            max_line_bytes,
        }
    }

    /// Receive the next message.
    ///
    /// Returns `Ok(None)` once the peer closes its end. Blank, oversized,
    /// non-UTF-8 and otherwise undecodable lines are skipped with a warning,
    /// since a hosted service printing to stdout must not take the channel down.
    pub async fn recv(&mut self) -> Result<Option<Message>> {
        loop {
            self.line.clear();
            let limit = self.max_line_bytes as u64 + 1;
            let read = (&mut self.inner)
                .take(limit)
                .read_until(b'\n', &mut self.line)
                .await?;
            if read == 0 {
                return Ok(None);
            }

            if self.line.last() != Some(&b'\n') && self.line.len() > self.max_line_bytes {
                warn!(
                    "Dropping channel line longer than {} bytes",
                    self.max_line_bytes
                );
                self.skip_rest_of_line().await?;
                continue;
            }

            let line = self.line.trim_ascii();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_slice::<Message>(line) {
                Ok(message) => return Ok(Some(message)),
                Err(e) => warn!(
                    "Dropping malformed channel line ({}): {}",
                    e,
                    String::from_utf8_lossy(line)
                ),
            }
        }
    }

    async fn skip_rest_of_line(&mut self) -> Result<()> {
        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                return Ok(());
            }
            match available.iter().position(|b| *b == b'\n') {
                Some(pos) => {
                    self.inner.consume(pos + 1);
                    return Ok(());
                }
                None => {
                    let len = available.len();
                    self.inner.consume(len);
                }
            }
        }
    }
}

impl<R> std::fmt::Debug for MessageReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageReader").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Event;
    use serde_json::json;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_messages_cross_a_duplex_pipe() {
        let (near, far) = tokio::io::duplex(1024);
        let mut writer = MessageWriter::new(near);
        let mut reader = MessageReader::new(far);

        writer.send(&Message::ready(json!({"ok": true}))).await.unwrap();
        writer.send(&Message::close()).await.unwrap();
        drop(writer);

        let first = reader.recv().await.unwrap().unwrap();
        assert_eq!(first.kind(), Some(Event::Ready));
        assert_eq!(first.data, Some(json!({"ok": true})));

        let second = reader.recv().await.unwrap().unwrap();
        assert_eq!(second.kind(), Some(Event::Close));

        assert!(reader.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_garbage_lines_are_skipped() {
        let (mut near, far) = tokio::io::duplex(1024);
        let mut reader = MessageReader::new(far);

        near.write_all(b"hello from a chatty service\n\n{\"event\":\"teardown\"}\n")
            .await
            .unwrap();
        drop(near);

        let message = reader.recv().await.unwrap().unwrap();
        assert_eq!(message.kind(), Some(Event::Teardown));
        assert!(reader.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_binary_noise_does_not_close_the_channel() {
        let (mut near, far) = tokio::io::duplex(1024);
        let mut reader = MessageReader::new(far);

        near.write_all(b"\xff\xfe binary noise\n{\"event\":\"ready\"}\n")
            .await
            .unwrap();
        drop(near);

        let message = reader.recv().await.unwrap().unwrap();
        assert_eq!(message.kind(), Some(Event::Ready));
        assert!(reader.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_lines_are_discarded() {
        let (mut near, far) = tokio::io::duplex(4096);
        let mut reader = MessageReader::with_max_line_bytes(far, 32);

        let mut input = vec![b'x'; 200];
        input.push(b'\n');
        input.extend_from_slice(b"{\"event\":\"close\"}\n");
        near.write_all(&input).await.unwrap();
        drop(near);

        let message = reader.recv().await.unwrap().unwrap();
        assert_eq!(message.kind(), Some(Event::Close));
        assert!(reader.recv().await.unwrap().is_none());
    }
}
