//! The base endpoint channel: a framed, pausable, optionally-encrypted
//! duplex wrapper around one [`InputStream`]/[`OutputStream`] pair.
//!
//! A concrete transport (BLE, Bluetooth classic, Wi-Fi LAN, WebRTC)
//! plugs in via [`ChannelBehavior`] — composition instead of the
//! inheritance hierarchy the original implementation used (see
//! DESIGN.md's Open Question notes).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info};

use crate::crypto::EncryptionCodec;
use crate::error::Error;
use crate::frame::{read_frame, write_frame};
use crate::medium::{DisconnectionReason, Medium};
use crate::stream::{InputStream, OutputStream};

/// The composition point a concrete transport implements instead of
/// subclassing a base channel type.
pub trait ChannelBehavior {
    /// The physical transport family this channel rides on.
    fn medium(&self) -> Medium;

    /// Transport-specific teardown (closing sockets, releasing radio
    /// handles, etc). Called once, after both stream halves have
    /// already been asked to close.
    fn close_impl(&self) {}
}

/// A `ChannelBehavior` for tests and the demo binary that carries no
/// transport-specific state beyond a fixed [`Medium`].
pub struct SimpleBehavior(pub Medium);

impl ChannelBehavior for SimpleBehavior {
    fn medium(&self) -> Medium {
        self.0
    }
}

struct PauseGate {
    paused: AtomicBool,
    notify: Notify,
}

impl PauseGate {
    fn new() -> Self {
        PauseGate {
            paused: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Blocks until the gate is open or `closed` becomes true.
    async fn wait_until_open(&self, closed: &AtomicBool) {
        while self.paused.load(Ordering::SeqCst) && !closed.load(Ordering::SeqCst) {
            self.notify.notified().await;
        }
    }

    fn wake_all(&self) {
        self.notify.notify_waiters();
    }
}

/// A framed, pausable, optionally-encrypted duplex channel over one
/// endpoint connection. See spec.md §4.5 for the state machine this
/// implements: Plaintext/Encrypted, each with a Paused sub-state, and
/// Closed terminal from any state.
pub struct BaseEndpointChannel<B: ChannelBehavior> {
    endpoint_id: String,
    behavior: B,
    max_frame_bytes: u32,

    input: Mutex<Box<dyn InputStream>>,
    output: Mutex<Box<dyn OutputStream>>,

    read_gate: PauseGate,
    write_gate: PauseGate,

    codec: Mutex<Option<EncryptionCodec>>,

    closed: AtomicBool,
    close_reason: Mutex<Option<DisconnectionReason>>,
}

impl<B: ChannelBehavior> BaseEndpointChannel<B> {
    pub fn new(
        endpoint_id: impl Into<String>,
        behavior: B,
        input: Box<dyn InputStream>,
        output: Box<dyn OutputStream>,
        max_frame_bytes: u32,
    ) -> Self {
        BaseEndpointChannel {
            endpoint_id: endpoint_id.into(),
            behavior,
            max_frame_bytes,
            input: Mutex::new(input),
            output: Mutex::new(output),
            read_gate: PauseGate::new(),
            write_gate: PauseGate::new(),
            codec: Mutex::new(None),
            closed: AtomicBool::new(false),
            close_reason: Mutex::new(None),
        }
    }

    pub fn endpoint_id(&self) -> &str {
        &self.endpoint_id
    }

    pub fn medium(&self) -> Medium {
        self.behavior.medium()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// `"<MEDIUM>"` in plaintext, `"ENCRYPTED_<MEDIUM>"` once a codec
    /// is installed.
    pub async fn get_type(&self) -> String {
        let medium = self.behavior.medium();
        if self.codec.lock().await.is_some() {
            format!("ENCRYPTED_{medium}")
        } else {
            medium.to_string()
        }
    }

    /// Writes one payload as a frame, waiting out any pause first.
    /// Encrypts the payload first if a codec has been installed.
    pub async fn write(&self, payload: &[u8]) -> Result<(), Error> {
        self.write_gate.wait_until_open(&self.closed).await;
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let mut output = self.output.lock().await;
        let mut codec = self.codec.lock().await;
        if let Some(codec) = codec.as_mut() {
            let ciphertext = codec.encrypt(payload)?;
            write_frame(&mut **output, &ciphertext, self.max_frame_bytes).await
        } else {
            write_frame(&mut **output, payload, self.max_frame_bytes).await
        }
    }

    /// Reads one frame, waiting out any pause first. Decrypts the
    /// frame first if a codec has been installed.
    pub async fn read(&self) -> Result<Bytes, Error> {
        self.read_gate.wait_until_open(&self.closed).await;
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let mut input = self.input.lock().await;
        let frame = read_frame(&mut **input, self.max_frame_bytes).await?;
        let mut codec = self.codec.lock().await;
        if let Some(codec) = codec.as_mut() {
            let plaintext_len = frame.len().saturating_sub(EncryptionCodec::TAG_LEN) as u32;
            let plaintext = codec.decrypt(&frame, plaintext_len)?;
            Ok(Bytes::from(plaintext))
        } else {
            Ok(frame)
        }
    }

    /// Writes a frame bypassing the codec, used by the handshake
    /// runner, which always speaks plaintext regardless of whether a
    /// *later* `enable_encryption` call might race it (it cannot: the
    /// handshake always completes, one way or another, before anyone
    /// has a context to install).
    pub async fn write_plain(&self, payload: &Bytes) -> Result<(), Error> {
        self.write_gate.wait_until_open(&self.closed).await;
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let mut output = self.output.lock().await;
        write_frame(&mut **output, payload, self.max_frame_bytes).await
    }

    pub async fn read_plain(&self) -> Result<Bytes, Error> {
        self.read_gate.wait_until_open(&self.closed).await;
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let mut input = self.input.lock().await;
        read_frame(&mut **input, self.max_frame_bytes).await
    }

    /// Installs the encryption codec produced by a completed
    /// handshake. Locks `write` before `read`, a fixed order that
    /// prevents deadlock against any caller that might one day lock
    /// them in the opposite order, and guarantees no frame straddles
    /// the plaintext/ciphertext boundary.
    pub async fn enable_encryption(&self, codec: EncryptionCodec) {
        let _write_guard = self.output.lock().await;
        let _read_guard = self.input.lock().await;
        *self.codec.lock().await = Some(codec);
        info!(endpoint_id = %self.endpoint_id, "encryption enabled");
    }

    /// Blocks new reads/writes from proceeding past the gate. Returns
    /// immediately; operations already past the gate check are not
    /// interrupted.
    pub fn pause(&self) {
        debug!(endpoint_id = %self.endpoint_id, "paused");
        self.read_gate.pause();
        self.write_gate.pause();
    }

    /// Releases the gate and wakes any operation blocked on it.
    pub fn resume(&self) {
        debug!(endpoint_id = %self.endpoint_id, "resumed");
        self.read_gate.resume();
        self.write_gate.resume();
    }

    /// Idempotent close: only the first caller records `reason`, runs
    /// `close_impl`, closes both stream halves, and wakes every parked
    /// reader/writer so they observe `closed` and fail with
    /// `Error::Closed`.
    pub async fn close(&self, reason: DisconnectionReason) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        *self.close_reason.lock().await = Some(reason);
        self.behavior.close_impl();
        let _ = self.input.lock().await.close().await;
        let _ = self.output.lock().await.close().await;
        self.read_gate.wake_all();
        self.write_gate.wake_all();
        info!(endpoint_id = %self.endpoint_id, reason = %reason, "channel closed");
    }

    pub async fn close_reason(&self) -> Option<DisconnectionReason> {
        *self.close_reason.lock().await
    }
}

/// Convenience constructor used by tests and the demo binary: wraps a
/// behavior/stream pair in the `Arc` that `HandshakeRunner` and
/// callbacks require.
pub fn new_channel<B: ChannelBehavior>(
    endpoint_id: impl Into<String>,
    behavior: B,
    input: Box<dyn InputStream>,
    output: Box<dyn OutputStream>,
    max_frame_bytes: u32,
) -> Arc<BaseEndpointChannel<B>> {
    Arc::new(BaseEndpointChannel::new(
        endpoint_id,
        behavior,
        input,
        output,
        max_frame_bytes,
    ))
}
