//! A man-in-the-middle relay for integration tests: pumps raw bytes
//! from one stream half to another, optionally handing every chunk to
//! a monitor closure before relaying it onward.
//!
//! This operates below the frame codec, directly on
//! [`InputStream`]/[`OutputStream`] halves, exactly where the original
//! `MakeDataPump`/`MakeDataMonitor` test helpers sat — a channel built
//! on top of the pumped streams is none the wiser, which is what makes
//! this useful for testing whether encrypted traffic resists
//! interception and plaintext traffic does not (spec.md §8 S2/S3).

use std::sync::{Arc, Mutex};

use crate::stream::{InputStream, OutputStream, Pipe};

/// Captures every chunk a pump relays, labelled by the pump's `label`,
/// for assertions after the test's traffic has settled.
#[derive(Clone, Default)]
pub struct Monitor {
    captured: Arc<Mutex<Vec<u8>>>,
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, chunk: &[u8]) {
        self.captured.lock().unwrap().extend_from_slice(chunk);
    }

    pub fn captured(&self) -> Vec<u8> {
        self.captured.lock().unwrap().clone()
    }
}

/// Spawns a task that relays bytes from `input` to `output` until
/// either side closes, handing every chunk to `monitor` (if any)
/// before forwarding it. Mirrors `MakeDataPump`'s close propagation:
/// a failed read closes `output`, a failed write closes `input`.
pub fn spawn_pump(
    label: impl Into<String>,
    mut input: Box<dyn InputStream>,
    mut output: Box<dyn OutputStream>,
    monitor: Option<Monitor>,
) -> tokio::task::JoinHandle<()> {
    let label = label.into();
    tokio::spawn(async move {
        tracing::debug!(label = %label, "pump started");
        loop {
            let chunk = match input.read(Pipe::CHUNK_SIZE).await {
                Ok(chunk) if !chunk.is_empty() => chunk,
                _ => {
                    tracing::debug!(label = %label, "pump source closed");
                    let _ = output.close().await;
                    break;
                }
            };
            if let Some(monitor) = &monitor {
                monitor.record(&chunk);
            }
            if output.write(chunk).await.is_err() {
                tracing::debug!(label = %label, "pump sink closed");
                let _ = input.close().await;
                break;
            }
        }
        tracing::debug!(label = %label, "pump terminated");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn pump_relays_and_records_every_chunk() {
        let (reader_in, mut writer_in) = Pipe::channel(8);
        let (mut reader_out, writer_out) = Pipe::channel(8);
        let monitor = Monitor::new();

        let handle = spawn_pump("mitm", Box::new(reader_in), Box::new(writer_out), Some(monitor.clone()));

        writer_in.write(Bytes::from_static(b"intercept me")).await.unwrap();
        let relayed = reader_out.read(32).await.unwrap();
        assert_eq!(relayed, Bytes::from_static(b"intercept me"));
        assert_eq!(monitor.captured(), b"intercept me");

        drop(writer_in);
        handle.await.unwrap();
    }
}
