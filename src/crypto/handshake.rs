//! A UKEY2-style, commit-then-reveal Diffie-Hellman handshake.
//!
//! The four wire messages below are driven by [`crate::handshake_runner`]
//! over a channel's *unencrypted* read/write path (see spec.md §4.4).
//! This module only contains the pure state transitions and key
//! derivation; it performs no I/O itself.
//!
//! Shape: the client commits to its ephemeral public key before the
//! server reveals its own (preventing the server from biasing its key
//! choice after seeing the client's), then both sides derive a pair of
//! directional keys plus a human-comparable auth token via
//! HKDF-SHA256 over the X25519 shared secret. A final confirmation tag
//! lets the client detect a handshake that silently failed on the
//! server's side before declaring success.

use bytes::{Bytes, BytesMut};
use hkdf::Hkdf;
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use x25519_dalek::{EphemeralSecret, PublicKey};

use crate::error::Error;

const NONCE_LEN: usize = 32;
const HKDF_INFO_CLIENT_TO_SERVER: &[u8] = b"nearby-channel c2s";
const HKDF_INFO_SERVER_TO_CLIENT: &[u8] = b"nearby-channel s2c";
const HKDF_INFO_AUTH_TOKEN: &[u8] = b"nearby-channel auth";
const HKDF_INFO_CONFIRMATION: &[u8] = b"nearby-channel confirm";

/// Which side of the handshake this runner is driving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeRole {
    Client,
    Server,
}

/// The keys and auth token produced by a completed handshake, ready to
/// be handed to [`crate::crypto::EncryptionCodec::new`].
#[derive(Clone)]
pub struct ConnectionContext {
    pub send_key: [u8; 32],
    pub recv_key: [u8; 32],
    pub auth_token: String,
    pub raw_auth_token: Bytes,
}

pub struct ClientInit {
    pub commitment: [u8; 32],
}

pub struct ServerInit {
    pub server_public: [u8; 32],
    pub server_nonce: [u8; 32],
}

pub struct ClientFinish {
    pub client_public: [u8; 32],
    pub client_nonce: [u8; 32],
}

pub struct ServerDone {
    pub confirmation: [u8; 32],
}

macro_rules! fixed_size_message {
    ($name:ident, $len:expr, encode($self:ident) $encode:block, decode($bytes:ident) $decode:block) => {
        impl $name {
            pub const WIRE_LEN: usize = $len;

            pub fn to_bytes(&$self) -> Bytes {
                $encode
            }

            pub fn from_bytes($bytes: &[u8]) -> Result<Self, Error> {
                if $bytes.len() != Self::WIRE_LEN {
                    return Err(Error::Protocol(format!(
                        "expected {} byte handshake message, got {}",
                        Self::WIRE_LEN,
                        $bytes.len()
                    )));
                }
                $decode
            }
        }
    };
}

fixed_size_message!(
    ClientInit, 32,
    encode(self) { Bytes::copy_from_slice(&self.commitment) },
    decode(bytes) {
        let mut commitment = [0u8; 32];
        commitment.copy_from_slice(bytes);
        Ok(ClientInit { commitment })
    }
);

fixed_size_message!(
    ServerInit, 64,
    encode(self) {
        let mut out = BytesMut::with_capacity(64);
        out.extend_from_slice(&self.server_public);
        out.extend_from_slice(&self.server_nonce);
        out.freeze()
    },
    decode(bytes) {
        let mut server_public = [0u8; 32];
        let mut server_nonce = [0u8; 32];
        server_public.copy_from_slice(&bytes[..32]);
        server_nonce.copy_from_slice(&bytes[32..]);
        Ok(ServerInit { server_public, server_nonce })
    }
);

fixed_size_message!(
    ClientFinish, 64,
    encode(self) {
        let mut out = BytesMut::with_capacity(64);
        out.extend_from_slice(&self.client_public);
        out.extend_from_slice(&self.client_nonce);
        out.freeze()
    },
    decode(bytes) {
        let mut client_public = [0u8; 32];
        let mut client_nonce = [0u8; 32];
        client_public.copy_from_slice(&bytes[..32]);
        client_nonce.copy_from_slice(&bytes[32..]);
        Ok(ClientFinish { client_public, client_nonce })
    }
);

fixed_size_message!(
    ServerDone, 32,
    encode(self) { Bytes::copy_from_slice(&self.confirmation) },
    decode(bytes) {
        let mut confirmation = [0u8; 32];
        confirmation.copy_from_slice(bytes);
        Ok(ServerDone { confirmation })
    }
);

/// Client-side state held between `SEND_CLIENT_INIT` and
/// `SEND_CLIENT_FINISH`.
pub struct ClientHandshake {
    secret: EphemeralSecret,
    public: PublicKey,
    nonce: [u8; NONCE_LEN],
}

/// Server-side state held between receiving `ClientInit` and
/// receiving `ClientFinish`.
pub struct ServerHandshake {
    secret: EphemeralSecret,
    public: PublicKey,
    nonce: [u8; NONCE_LEN],
    client_commitment: [u8; 32],
}

/// Starts the client side: generates an ephemeral keypair and nonce,
/// and commits to them without revealing either.
pub fn client_start() -> (ClientHandshake, ClientInit) {
    let secret = EphemeralSecret::random_from_rng(OsRng);
    let public = PublicKey::from(&secret);
    let nonce: [u8; NONCE_LEN] = rand::random();
    let commitment = commit(public.as_bytes(), &nonce);
    (
        ClientHandshake {
            secret,
            public,
            nonce,
        },
        ClientInit { commitment },
    )
}

/// Starts the server side upon receiving [`ClientInit`]: generates its
/// own ephemeral keypair and nonce and replies with [`ServerInit`].
pub fn server_start(client_init: &ClientInit) -> (ServerHandshake, ServerInit) {
    let secret = EphemeralSecret::random_from_rng(OsRng);
    let public = PublicKey::from(&secret);
    let nonce: [u8; NONCE_LEN] = rand::random();
    (
        ServerHandshake {
            secret,
            public,
            nonce,
            client_commitment: client_init.commitment,
        },
        ServerInit {
            server_public: *public.as_bytes(),
            server_nonce: nonce,
        },
    )
}

/// Completes the client side upon receiving [`ServerInit`]: reveals the
/// client's public key/nonce, derives the connection context, and
/// returns the [`ClientFinish`] message to send.
pub fn client_finish(
    client: ClientHandshake,
    server_init: &ServerInit,
) -> (ClientFinish, ConnectionContext) {
    let server_public = PublicKey::from(server_init.server_public);
    let shared = client.secret.diffie_hellman(&server_public);
    let context = derive_context(
        shared.as_bytes(),
        &client.nonce,
        &server_init.server_nonce,
        HandshakeRole::Client,
    );
    (
        ClientFinish {
            client_public: *client.public.as_bytes(),
            client_nonce: client.nonce,
        },
        context,
    )
}

/// Completes the server side upon receiving [`ClientFinish`]: verifies
/// the earlier commitment, derives the connection context, and returns
/// a [`ServerDone`] confirmation tag bound to the full transcript.
pub fn server_finish(
    server: ServerHandshake,
    client_finish: &ClientFinish,
) -> Result<(ServerDone, ConnectionContext), Error> {
    let expected = commit(&client_finish.client_public, &client_finish.client_nonce);
    if expected != server.client_commitment {
        return Err(Error::Protocol(
            "client commitment does not match revealed key/nonce".to_string(),
        ));
    }
    let client_public = PublicKey::from(client_finish.client_public);
    let shared = server.secret.diffie_hellman(&client_public);
    let context = derive_context(
        shared.as_bytes(),
        &client_finish.client_nonce,
        &server.nonce,
        HandshakeRole::Server,
    );
    let confirmation = confirmation_tag(
        &context,
        &client_finish.client_public,
        server.public.as_bytes(),
        &client_finish.client_nonce,
        &server.nonce,
    );
    Ok((ServerDone { confirmation }, context))
}

/// Verifies the server's confirmation tag against the client's own
/// derived context, completing `WAIT_DONE`. A mismatch means the
/// server derived a different context (or never really completed the
/// handshake) and the client must treat the handshake as failed.
pub fn client_verify_done(
    context: &ConnectionContext,
    client_public: &[u8; 32],
    server_public: &[u8; 32],
    client_nonce: &[u8; 32],
    server_nonce: &[u8; 32],
    server_done: &ServerDone,
) -> Result<(), Error> {
    let expected = confirmation_tag(
        context,
        client_public,
        server_public,
        client_nonce,
        server_nonce,
    );
    if expected == server_done.confirmation {
        Ok(())
    } else {
        Err(Error::Protocol(
            "server handshake confirmation mismatch".to_string(),
        ))
    }
}

fn commit(public: &[u8; 32], nonce: &[u8; NONCE_LEN]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(public);
    hasher.update(nonce);
    hasher.finalize().into()
}

fn derive_context(
    shared_secret: &[u8; 32],
    client_nonce: &[u8; NONCE_LEN],
    server_nonce: &[u8; NONCE_LEN],
    role: HandshakeRole,
) -> ConnectionContext {
    let mut salt = Vec::with_capacity(NONCE_LEN * 2);
    salt.extend_from_slice(client_nonce);
    salt.extend_from_slice(server_nonce);

    let hk = Hkdf::<Sha256>::new(Some(&salt), shared_secret);

    let mut client_to_server = [0u8; 32];
    hk.expand(HKDF_INFO_CLIENT_TO_SERVER, &mut client_to_server)
        .expect("32 bytes is a valid HKDF-SHA256 output length");

    let mut server_to_client = [0u8; 32];
    hk.expand(HKDF_INFO_SERVER_TO_CLIENT, &mut server_to_client)
        .expect("32 bytes is a valid HKDF-SHA256 output length");

    let mut raw_auth_token = [0u8; 32];
    hk.expand(HKDF_INFO_AUTH_TOKEN, &mut raw_auth_token)
        .expect("32 bytes is a valid HKDF-SHA256 output length");

    let (send_key, recv_key) = match role {
        HandshakeRole::Client => (client_to_server, server_to_client),
        HandshakeRole::Server => (server_to_client, client_to_server),
    };

    ConnectionContext {
        send_key,
        recv_key,
        auth_token: hex::encode(raw_auth_token),
        raw_auth_token: Bytes::copy_from_slice(&raw_auth_token),
    }
}

fn confirmation_tag(
    context: &ConnectionContext,
    client_public: &[u8; 32],
    server_public: &[u8; 32],
    client_nonce: &[u8; 32],
    server_nonce: &[u8; 32],
) -> [u8; 32] {
    // Bind the confirmation key (itself HKDF-derived, not the raw
    // shared secret) to the full handshake transcript, so a tag match
    // proves both sides reached the same context for *this* exchange.
    let mut salt = Vec::with_capacity(NONCE_LEN * 2);
    salt.extend_from_slice(client_nonce);
    salt.extend_from_slice(server_nonce);
    let hk = Hkdf::<Sha256>::new(Some(&salt), &context.raw_auth_token);
    let mut confirmation_key = [0u8; 32];
    hk.expand(HKDF_INFO_CONFIRMATION, &mut confirmation_key)
        .expect("32 bytes is a valid HKDF-SHA256 output length");

    let mut hasher = Sha256::new();
    hasher.update(confirmation_key);
    hasher.update(client_public);
    hasher.update(server_public);
    hasher.update(client_nonce);
    hasher.update(server_nonce);
    hasher.finalize().into()
}
