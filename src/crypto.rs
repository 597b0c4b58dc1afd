//! One-shot key exchange followed by authenticated encryption of each batch
//! with a monotonic per-direction nonce counter.
//!
//! Keeps the classic X25519 exchange and a 24-byte nonce layout, but uses
//! `XChaCha20Poly1305` so a strictly increasing counter, not a random draw,
//! is the only source of nonce material (see DESIGN.md).

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::CryptoError;

pub const PUBLIC_KEY_LEN: usize = 32;
const NONCE_LEN: usize = 24;

/// Local keypair plus, once the handshake completes, the peer's public key
/// and the precomputed shared symmetric key.
pub struct SessionKeys {
    secret: StaticSecret,
    pub public: PublicKey,
    shared: Option<[u8; 32]>,
}

impl SessionKeys {
    /// Generate a fresh keypair from a cryptographic RNG.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public, shared: None }
    }

    /// Derive the 32-byte shared symmetric key from (local secret, peer
    /// public). Rejects any length other than 32 bytes with `BadPublicKey`.
    pub fn complete(&mut self, peer_public: &[u8]) -> Result<(), CryptoError> {
        if peer_public.len() != PUBLIC_KEY_LEN {
            return Err(CryptoError::BadPublicKey(peer_public.len()));
        }
        let mut buf = [0u8; PUBLIC_KEY_LEN];
        buf.copy_from_slice(peer_public);
        let peer = PublicKey::from(buf);
        let shared_secret = self.secret.diffie_hellman(&peer);
        self.shared = Some(*shared_secret.as_bytes());
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.shared.is_some()
    }
}

/// Encrypts outbound batches with a strictly monotonic nonce counter;
/// decrypts inbound ones. One `Crypto` is built per session after
/// `SessionKeys::complete`, and owns its own outbound counter — the two
/// directions of a call use independent counters under the same shared
/// key, so a replay in one direction can never collide with the other's.
pub struct Crypto {
    cipher: XChaCha20Poly1305,
    outbound_counter: u64,
}

impl Crypto {
    pub fn new(keys: &SessionKeys) -> Self {
        let shared = keys.shared.expect("SessionKeys::complete must run before Crypto::new");
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&shared));
        Self { cipher, outbound_counter: 0 }
    }

    fn nonce_for(counter: u64) -> XNonce {
        let mut bytes = [0u8; NONCE_LEN];
        bytes[0..8].copy_from_slice(&counter.to_be_bytes());
        *XNonce::from_slice(&bytes)
    }

    /// Seal `plaintext` under the current counter, then advance the
    /// counter. Output is `nonce(24) || ciphertext||tag`.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if self.outbound_counter == u64::MAX {
            return Err(CryptoError::NonceWrap);
        }
        let nonce = Self::nonce_for(self.outbound_counter);
        self.outbound_counter += 1;

        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CryptoError::AuthFailed)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(nonce.as_ref());
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Require at least 24 bytes; open the remainder with the shared key
    /// and the embedded nonce.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if data.len() < NONCE_LEN {
            return Err(CryptoError::TooShort(data.len()));
        }
        let nonce = XNonce::from_slice(&data[..NONCE_LEN]);
        self.cipher
            .decrypt(nonce, &data[NONCE_LEN..])
            .map_err(|_| CryptoError::AuthFailed)
    }

    #[cfg(test)]
    pub fn outbound_counter(&self) -> u64 {
        self.outbound_counter
    }
}

/// Generate `len` random bytes using the same RNG as key generation. Used
/// by higher layers that need filler material (e.g. tests).
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    OsRng.fill_bytes(&mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paired_crypto() -> (Crypto, Crypto) {
        let mut a = SessionKeys::generate();
        let mut b = SessionKeys::generate();
        let a_pub = a.public.to_bytes();
        let b_pub = b.public.to_bytes();
        a.complete(&b_pub).unwrap();
        b.complete(&a_pub).unwrap();
        (Crypto::new(&a), Crypto::new(&b))
    }

    #[test]
    fn handshake_derives_identical_shared_keys() {
        let mut a = SessionKeys::generate();
        let mut b = SessionKeys::generate();
        let a_pub = a.public.to_bytes();
        let b_pub = b.public.to_bytes();
        a.complete(&b_pub).unwrap();
        b.complete(&a_pub).unwrap();
        assert_eq!(a.shared, b.shared);
    }

    #[test]
    fn bad_public_key_length_is_rejected() {
        let mut a = SessionKeys::generate();
        assert!(matches!(a.complete(&[0u8; 31]), Err(CryptoError::BadPublicKey(31))));
        assert!(matches!(a.complete(&[0u8; 33]), Err(CryptoError::BadPublicKey(33))));
    }

    #[test]
    fn round_trip_encrypt_decrypt() {
        let (mut a, b) = paired_crypto();
        let msg = b"hello, peer";
        let sealed = a.encrypt(msg).unwrap();
        let opened = b.decrypt(&sealed).unwrap();
        assert_eq!(opened, msg);
    }

    #[test]
    fn nonce_prefix_is_strictly_increasing() {
        let (mut a, _b) = paired_crypto();
        let mut last: i128 = -1;
        for _ in 0..50 {
            let sealed = a.encrypt(b"frame").unwrap();
            let counter = u64::from_be_bytes(sealed[0..8].try_into().unwrap()) as i128;
            assert!(counter > last, "nonce counter must strictly increase");
            last = counter;
        }
    }

    #[test]
    fn flipped_bit_in_ciphertext_fails_auth_counter_still_advanced() {
        let (mut a, b) = paired_crypto();
        let mut sealed = a.encrypt(b"hello").unwrap();
        assert_eq!(a.outbound_counter(), 1);
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(matches!(b.decrypt(&sealed), Err(CryptoError::AuthFailed)));
        assert_eq!(a.outbound_counter(), 1);
    }

    #[test]
    fn short_input_is_rejected() {
        let (_a, b) = paired_crypto();
        assert!(matches!(b.decrypt(&[0u8; 10]), Err(CryptoError::TooShort(10))));
    }
}
