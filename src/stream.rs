//! Byte stream abstractions: the transport-agnostic [`InputStream`] /
//! [`OutputStream`] traits consumed by the frame codec and channel, and
//! an in-memory [`Pipe`] implementation used by tests and the demo
//! binary.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Error;

/// A readable half of a transport. `read(size)` reads up to `size`
/// bytes. Concrete transports that define an orderly empty-read-on-close
/// may return `Ok(Bytes::new())`; [`Pipe`] does not — a closed pipe
/// always surfaces [`Error::Io`] on the next read that would otherwise
/// block, matching spec.md's "read after writer close fails" property.
#[async_trait]
pub trait InputStream: Send {
    async fn read(&mut self, size: usize) -> Result<Bytes, Error>;
    async fn close(&mut self) -> Result<(), Error>;
}

/// A writable half of a transport.
#[async_trait]
pub trait OutputStream: Send {
    async fn write(&mut self, bytes: Bytes) -> Result<(), Error>;
    async fn close(&mut self) -> Result<(), Error>;
}

/// An in-process bounded FIFO used to pair up two endpoint channels in
/// tests without a real transport. Reader and writer halves are
/// obtained from [`Pipe::channel`].
pub struct Pipe;

impl Pipe {
    pub const CHUNK_SIZE: usize = crate::config::DEFAULT_PIPE_CHUNK_BYTES;

    /// Creates a connected reader/writer pair chunked at
    /// [`Pipe::CHUNK_SIZE`]. `capacity` bounds how many chunks may be
    /// in flight before a writer blocks.
    pub fn channel(capacity: usize) -> (PipeReader, PipeWriter) {
        Self::channel_with_chunk_size(capacity, Self::CHUNK_SIZE)
    }

    /// Like [`Pipe::channel`], but with a caller-supplied chunk size —
    /// how [`ChannelConfig::pipe_chunk_bytes`](crate::config::ChannelConfig::pipe_chunk_bytes)
    /// reaches a concrete `Pipe` instance.
    pub fn channel_with_chunk_size(capacity: usize, chunk_size: usize) -> (PipeReader, PipeWriter) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            PipeReader {
                rx,
                pending: Bytes::new(),
            },
            PipeWriter {
                tx: Some(tx),
                chunk_size,
            },
        )
    }
}

/// The reading half of a [`Pipe`].
pub struct PipeReader {
    rx: mpsc::Receiver<Bytes>,
    /// Bytes received but not yet handed back, because the last caller
    /// asked for fewer than a full chunk.
    pending: Bytes,
}

impl PipeReader {
    pub fn is_closed(&self) -> bool {
        self.pending.is_empty() && self.rx.is_closed()
    }
}

#[async_trait]
impl InputStream for PipeReader {
    async fn read(&mut self, size: usize) -> Result<Bytes, Error> {
        if self.pending.is_empty() {
            self.pending = self
                .rx
                .recv()
                .await
                .ok_or_else(|| Error::Io("pipe writer closed".to_string()))?;
        }
        let take = size.min(self.pending.len());
        Ok(self.pending.split_to(take))
    }

    async fn close(&mut self) -> Result<(), Error> {
        self.rx.close();
        Ok(())
    }
}

/// The writing half of a [`Pipe`].
#[derive(Clone)]
pub struct PipeWriter {
    tx: Option<mpsc::Sender<Bytes>>,
    chunk_size: usize,
}

impl PipeWriter {
    pub fn is_closed(&self) -> bool {
        match &self.tx {
            Some(tx) => tx.is_closed(),
            None => true,
        }
    }
}

#[async_trait]
impl OutputStream for PipeWriter {
    async fn write(&mut self, bytes: Bytes) -> Result<(), Error> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| Error::Io("pipe writer closed".to_string()))?;
        // Split into chunks so a single oversized write behaves like
        // several transport-level writes, matching the configured chunk
        // size for any reader driving it one read() at a time.
        for chunk in bytes.chunks(self.chunk_size) {
            tx.send(Bytes::copy_from_slice(chunk))
                .await
                .map_err(|_| Error::Io("pipe reader closed".to_string()))?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), Error> {
        // Dropping the sender disconnects the receiver, so the peer's
        // next read() observes Error::Io instead of blocking forever.
        self.tx = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trip_small_payload() {
        let (mut reader, mut writer) = Pipe::channel(8);
        writer.write(Bytes::from_static(b"hello")).await.unwrap();
        let got = reader.read(5).await.unwrap();
        assert_eq!(got, Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn read_after_writer_dropped_fails() {
        let (mut reader, writer) = Pipe::channel(8);
        drop(writer);
        let err = reader.read(1).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn read_after_writer_closed_fails() {
        let (mut reader, mut writer) = Pipe::channel(8);
        writer.close().await.unwrap();
        let err = reader.read(1).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn write_after_close_fails() {
        let (_reader, mut writer) = Pipe::channel(8);
        writer.close().await.unwrap();
        let err = writer.write(Bytes::from_static(b"x")).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn channel_with_chunk_size_honors_configured_chunk() {
        let (mut reader, mut writer) = Pipe::channel_with_chunk_size(16, 4);
        let payload = Bytes::from_static(b"0123456789");
        let handle = tokio::spawn(async move {
            writer.write(payload).await.unwrap();
        });
        let mut received = Vec::new();
        while received.len() < 10 {
            received.extend_from_slice(&reader.read(4).await.unwrap());
        }
        handle.await.unwrap();
        assert_eq!(received, b"0123456789");
    }

    #[tokio::test]
    async fn write_after_reader_dropped_fails() {
        let (reader, mut writer) = Pipe::channel(1);
        drop(reader);
        let err = writer.write(Bytes::from_static(b"x")).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn large_payload_splits_into_chunks_transparently() {
        let (mut reader, mut writer) = Pipe::channel(16);
        let payload = vec![7u8; Pipe::CHUNK_SIZE * 2 + 10];
        let to_send = Bytes::from(payload.clone());
        let handle = tokio::spawn(async move {
            writer.write(to_send).await.unwrap();
        });
        let mut received = Vec::new();
        while received.len() < payload.len() {
            received.extend_from_slice(&reader.read(Pipe::CHUNK_SIZE).await.unwrap());
        }
        handle.await.unwrap();
        assert_eq!(received, payload);
    }
}
