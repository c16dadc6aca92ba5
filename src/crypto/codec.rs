//! Per-frame AEAD encryption, applied on top of the plain length-prefix
//! framing in [`crate::frame`] once a handshake hands over a
//! [`ConnectionContext`](super::ConnectionContext).

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};

use crate::error::Error;

use super::handshake::ConnectionContext;

/// Encrypts/decrypts individual frame payloads with ChaCha20-Poly1305,
/// using independent monotonically increasing nonce counters per
/// direction so the two peers never reuse a nonce under the same key.
///
/// The nonce is 4 zero bytes followed by the big-endian counter; the
/// counter is bound into the ciphertext as part of the nonce itself
/// (standard AEAD construction) and the frame's plaintext length is
/// passed as associated data, so a frame cannot be truncated, padded,
/// or reordered against a different length without detection.
pub struct EncryptionCodec {
    cipher: ChaCha20Poly1305,
    recv_cipher: ChaCha20Poly1305,
    send_nonce: u64,
    recv_nonce: u64,
}

impl EncryptionCodec {
    /// ChaCha20-Poly1305 appends a 16-byte authentication tag to every
    /// ciphertext; callers that need the plaintext length before
    /// decrypting (to pass as associated data) can recover it as
    /// `ciphertext.len() - TAG_LEN`.
    pub const TAG_LEN: usize = 16;

    pub fn new(context: &ConnectionContext) -> Self {
        let send_key = Key::from_slice(&context.send_key);
        let recv_key = Key::from_slice(&context.recv_key);
        EncryptionCodec {
            cipher: ChaCha20Poly1305::new(send_key),
            recv_cipher: ChaCha20Poly1305::new(recv_key),
            send_nonce: 0,
            recv_nonce: 0,
        }
    }

    /// Encrypts one frame's plaintext payload for sending. Advances the
    /// send nonce counter; callers must send frames in the order this
    /// method is invoked.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        let nonce_bytes = nonce_for(self.send_nonce);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let aad = (plaintext.len() as u32).to_be_bytes();
        let ciphertext = self
            .cipher
            .encrypt(
                nonce,
                chacha20poly1305::aead::Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|_| Error::Decrypt("frame encryption failed".to_string()))?;
        self.send_nonce = self
            .send_nonce
            .checked_add(1)
            .expect("nonce space exhausted after 2^64 frames");
        Ok(ciphertext)
    }

    /// Decrypts one frame's ciphertext, verifying it was produced for
    /// the next expected nonce and declared plaintext length. Advances
    /// the receive nonce counter only on success, so a single corrupt
    /// frame does not desynchronize recovery from a higher layer that
    /// chooses to retry.
    pub fn decrypt(&mut self, ciphertext: &[u8], plaintext_len: u32) -> Result<Vec<u8>, Error> {
        let nonce_bytes = nonce_for(self.recv_nonce);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let aad = plaintext_len.to_be_bytes();
        let plaintext = self
            .recv_cipher
            .decrypt(
                nonce,
                chacha20poly1305::aead::Payload {
                    msg: ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| Error::Decrypt("frame decryption failed or frame out of order".to_string()))?;
        self.recv_nonce = self
            .recv_nonce
            .checked_add(1)
            .expect("nonce space exhausted after 2^64 frames");
        Ok(plaintext)
    }
}

fn nonce_for(counter: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[4..].copy_from_slice(&counter.to_be_bytes());
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::handshake::{client_finish, client_start, server_finish, server_start};

    fn paired_codecs() -> (EncryptionCodec, EncryptionCodec) {
        let (client, client_init) = client_start();
        let (server, server_init) = server_start(&client_init);
        let (finish, client_ctx) = client_finish(client, &server_init);
        let (_done, server_ctx) = server_finish(server, &finish).unwrap();
        (EncryptionCodec::new(&client_ctx), EncryptionCodec::new(&server_ctx))
    }

    #[test]
    fn round_trip_through_matching_codecs() {
        let (mut client_codec, mut server_codec) = paired_codecs();
        let plaintext = b"hello from the client";
        let ciphertext = client_codec.encrypt(plaintext).unwrap();
        let decrypted = server_codec
            .decrypt(&ciphertext, plaintext.len() as u32)
            .unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn frames_must_be_decrypted_in_order() {
        let (mut client_codec, mut server_codec) = paired_codecs();
        let first = client_codec.encrypt(b"first").unwrap();
        let second = client_codec.encrypt(b"second").unwrap();

        // Decrypting out of nonce order fails: server_codec's recv
        // counter is still at 0 but `second` was sealed under nonce 1.
        assert!(server_codec.decrypt(&second, 6).is_err());
        assert!(server_codec.decrypt(&first, 5).is_ok());
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let (mut client_codec, mut server_codec) = paired_codecs();
        let mut ciphertext = client_codec.encrypt(b"integrity please").unwrap();
        *ciphertext.last_mut().unwrap() ^= 0xFF;
        assert!(server_codec.decrypt(&ciphertext, 17).is_err());
    }

    #[test]
    fn mismatched_associated_length_fails_to_decrypt() {
        let (mut client_codec, mut server_codec) = paired_codecs();
        let ciphertext = client_codec.encrypt(b"twelve bytes").unwrap();
        assert!(server_codec.decrypt(&ciphertext, 999).is_err());
    }
}
