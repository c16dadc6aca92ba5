//! Encryption primitives: the UKEY2-style handshake ([`handshake`]) and
//! the per-frame AEAD codec it hands off to ([`codec`]).

pub mod codec;
pub mod handshake;

pub use codec::EncryptionCodec;
pub use handshake::{ConnectionContext, HandshakeRole};
