//! A framed, optionally-encrypted bidirectional endpoint channel for a
//! peer-to-peer nearby-connections runtime.
//!
//! A [`channel::BaseEndpointChannel`] wraps one [`stream::InputStream`]/
//! [`stream::OutputStream`] pair with length-prefixed framing
//! ([`frame`]), an optional per-frame AEAD codec
//! ([`crypto::EncryptionCodec`]) installed once a
//! [`handshake_runner::HandshakeRunner`] completes a mutually
//! authenticated Diffie-Hellman handshake ([`crypto::handshake`]), and
//! a pause/resume gate. [`environment`] simulates the surrounding
//! radio environment (BLE/Bluetooth/Wi-Fi LAN/WebRTC discovery
//! registries) for tests and the demo binary.

pub mod channel;
pub mod config;
pub mod crypto;
pub mod environment;
pub mod error;
pub mod frame;
pub mod handshake_runner;
pub mod medium;
pub mod stream;
pub mod testing;

pub use channel::{BaseEndpointChannel, ChannelBehavior};
pub use config::ChannelConfig;
pub use crypto::{ConnectionContext, EncryptionCodec};
pub use error::Error;
pub use medium::{DisconnectionReason, Medium};
pub use stream::{InputStream, OutputStream, Pipe};
