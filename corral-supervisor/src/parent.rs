//! Child-side end of the message channel

use corral_core::{Message, MessageReader, MessageWriter};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::warn;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Link from a launched child back to the process that launched it
pub struct ParentLink {
    reader: MessageReader<BoxedReader>,
    writer: MessageWriter<BoxedWriter>,
}

impl ParentLink {
    /// Link over arbitrary byte streams
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: MessageReader::new(Box::new(reader) as BoxedReader),
            writer: MessageWriter::new(Box::new(writer) as BoxedWriter),
        }
    }

    /// Link over this process's stdin/stdout, as set up by the process spawner
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }

    /// Start forwarding incoming messages; the receiver closes when the parent goes away
    pub(crate) fn split(self) -> (MessageWriter<BoxedWriter>, mpsc::UnboundedReceiver<Message>) {
        let Self { mut reader, writer } = self;
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            loop {
                match reader.recv().await {
                    Ok(Some(message)) => {
                        if tx.send(message).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Lost message channel to parent: {}", e);
                        break;
                    }
                }
            }
        });
        (writer, rx)
    }
}

impl std::fmt::Debug for ParentLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParentLink").finish_non_exhaustive()
    }
}
