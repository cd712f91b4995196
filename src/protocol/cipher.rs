//! Optional AES-256-CBC encryption of whole frame buffers.
//!
//! The key and IV are derived with PBKDF2-HMAC-SHA1 (1000 rounds) from a
//! passphrase and a fixed 16-byte salt. The default passphrase is a constant
//! baked into every client; the server derives the identical key, so the
//! derivation must stay bit-for-bit stable. This is a shared-secret scheme,
//! not real key management — treat it as obfuscation unless the deployment
//! overrides the passphrase on both ends.

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use sha1::Sha1;

use crate::error::ClientError;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Well-known passphrase compiled into stock clients. The historical typo
/// ("Encrypion") is part of the wire contract and must not be corrected.
pub const DEFAULT_PASSPHRASE: &str = "BytesSentOverNetworkEncrypionDecryptionPassword";

/// Fixed key-derivation salt, shared with the server.
pub const KEY_SALT: [u8; 16] = [
    127, 117, 25, 56, 59, 100, 36, 11, 84, 67, 96, 10, 24, 111, 112, 38,
];

const PBKDF2_ROUNDS: u32 = 1000;

/// Encrypts and decrypts frame buffers. Acts as the identity when disabled.
#[derive(Debug, Clone)]
pub struct CipherLayer {
    enabled: bool,
    key: [u8; 32],
    iv: [u8; 16],
}

impl Default for CipherLayer {
    fn default() -> Self {
        Self::disabled()
    }
}

impl CipherLayer {
    /// A layer that passes bytes through untouched.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            key: [0; 32],
            iv: [0; 16],
        }
    }

    /// Derives key material from `passphrase` and enables encryption.
    ///
    /// The first 32 bytes of PBKDF2 output become the AES key, the next 16
    /// the IV, matching the server's derivation order.
    pub fn from_passphrase(passphrase: &str) -> Self {
        let mut okm = [0u8; 48];
        pbkdf2::pbkdf2_hmac::<Sha1>(passphrase.as_bytes(), &KEY_SALT, PBKDF2_ROUNDS, &mut okm);

        let mut key = [0u8; 32];
        let mut iv = [0u8; 16];
        key.copy_from_slice(&okm[..32]);
        iv.copy_from_slice(&okm[32..]);

        Self {
            enabled: true,
            key,
            iv,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Encrypts a whole frame buffer. Empty input and disabled layers pass
    /// through unchanged.
    pub fn encrypt(&self, bytes: &[u8]) -> Vec<u8> {
        if !self.enabled || bytes.is_empty() {
            return bytes.to_vec();
        }
        Aes256CbcEnc::new((&self.key).into(), (&self.iv).into())
            .encrypt_padded_vec_mut::<Pkcs7>(bytes)
    }

    /// Decrypts a whole frame buffer.
    ///
    /// Fails on ciphertext that is not a whole number of blocks or carries
    /// bad padding; during stream reassembly that simply means more bytes
    /// are still in flight.
    pub fn decrypt(&self, bytes: &[u8]) -> Result<Vec<u8>, ClientError> {
        if !self.enabled || bytes.is_empty() {
            return Ok(bytes.to_vec());
        }
        Aes256CbcDec::new((&self.key).into(), (&self.iv).into())
            .decrypt_padded_vec_mut::<Pkcs7>(bytes)
            .map_err(|_| ClientError::Cipher("invalid ciphertext or padding".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_layer_is_identity() {
        let layer = CipherLayer::disabled();
        let bytes = b"anything at all \0<EOF>\0".to_vec();

        assert_eq!(layer.encrypt(&bytes), bytes);
        assert_eq!(layer.decrypt(&bytes).unwrap(), bytes);
    }

    #[test]
    fn empty_input_passes_through() {
        let layer = CipherLayer::from_passphrase(DEFAULT_PASSPHRASE);
        assert!(layer.encrypt(&[]).is_empty());
        assert!(layer.decrypt(&[]).unwrap().is_empty());
    }

    #[test]
    fn round_trip() {
        let layer = CipherLayer::from_passphrase(DEFAULT_PASSPHRASE);

        for len in [1usize, 15, 16, 17, 8192] {
            let plain = (0..len).map(|i| i as u8).collect::<Vec<_>>();
            let cipher = layer.encrypt(&plain);
            assert_ne!(cipher, plain);
            assert_eq!(layer.decrypt(&cipher).unwrap(), plain);
        }
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = CipherLayer::from_passphrase("secret");
        let b = CipherLayer::from_passphrase("secret");
        assert_eq!(a.encrypt(b"x"), b.encrypt(b"x"));
    }

    #[test]
    fn wrong_passphrase_never_recovers_plaintext() {
        let cipher = CipherLayer::from_passphrase(DEFAULT_PASSPHRASE).encrypt(b"payload");
        let other = CipherLayer::from_passphrase("some other secret");

        // Unpadding usually fails outright; if it happens to succeed the
        // bytes are still garbage.
        match other.decrypt(&cipher) {
            Ok(plain) => assert_ne!(plain, b"payload"),
            Err(e) => assert!(matches!(e, ClientError::Cipher(_))),
        }
    }

    #[test]
    fn partial_ciphertext_fails_decryption() {
        let layer = CipherLayer::from_passphrase(DEFAULT_PASSPHRASE);
        let cipher = layer.encrypt(&[7u8; 64]);
        assert!(layer.decrypt(&cipher[..cipher.len() - 5]).is_err());
    }
}
