//! AES KEK provider: wraps a DEK with AES-256-GCM under a configured
//! 32-byte key and a fresh 12-byte random nonce per wrap. The nonce is
//! returned as the `iv` so the unwrap path can reconstruct the cipher.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};

use crate::dek::Dek;
use crate::error::CryptoError;
use crate::provider::{KekProvider, WrappedDek};

const NONCE_LEN: usize = 12;

pub struct AesKekProvider {
    cipher: Aes256Gcm,
    fingerprint: String,
}

impl AesKekProvider {
    pub fn new(key: [u8; 32]) -> Self {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        let fingerprint = fingerprint_of(&key);
        Self { cipher, fingerprint }
    }

    pub fn from_hex(hex_key: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(hex_key).map_err(|e| CryptoError::HexDecode(e.to_string()))?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| CryptoError::InvalidKey(format!("expected 32 bytes, got {}", v.len())))?;
        Ok(Self::new(key))
    }
}

/// SHA-256 of the raw key, hex-encoded, truncated to 16 hex chars —
/// enough to disambiguate keys in a registry without leaking key
/// material (one-way, and truncation loses no practical collision
/// resistance at this scale).
fn fingerprint_of(key: &[u8; 32]) -> String {
    let digest = Sha256::digest(key);
    hex::encode(&digest[..8])
}

impl KekProvider for AesKekProvider {
    fn kind(&self) -> &'static str {
        "aes"
    }

    fn algorithm_label(&self) -> &'static str {
        "aes-gcm-256"
    }

    fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn wrap_dek(&self, dek: &Dek) -> Result<WrappedDek, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng
            .try_fill_bytes(&mut nonce_bytes)
            .map_err(|e| CryptoError::Rng(e.to_string()))?;
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, dek.as_bytes().as_slice())
            .map_err(|_| CryptoError::DecryptFailed)?;
        Ok(WrappedDek {
            ciphertext,
            iv: nonce_bytes.to_vec(),
            fingerprint: self.fingerprint.clone(),
        })
    }

    fn unwrap_dek(&self, ciphertext: &[u8], iv: &[u8]) -> Result<Dek, CryptoError> {
        if iv.len() != NONCE_LEN {
            return Err(CryptoError::InvalidNonceLength {
                expected: NONCE_LEN,
                actual: iv.len(),
            });
        }
        let nonce = Nonce::from_slice(iv);
        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::DecryptFailed)?;
        let bytes: [u8; 32] = plaintext
            .try_into()
            .map_err(|_| CryptoError::DecryptFailed)?;
        Ok(Dek::from_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> AesKekProvider {
        AesKekProvider::new([0x11; 32])
    }

    #[test]
    fn wrap_then_unwrap_roundtrips() {
        let p = provider();
        let dek = Dek::generate().unwrap();
        let wrapped = p.wrap_dek(&dek).unwrap();
        let unwrapped = p.unwrap_dek(&wrapped.ciphertext, &wrapped.iv).unwrap();
        assert_eq!(unwrapped.as_bytes(), dek.as_bytes());
    }

    #[test]
    fn wrap_uses_fresh_nonce_each_call() {
        let p = provider();
        let dek = Dek::generate().unwrap();
        let a = p.wrap_dek(&dek).unwrap();
        let b = p.wrap_dek(&dek).unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn unwrap_rejects_wrong_nonce_length() {
        let p = provider();
        let dek = Dek::generate().unwrap();
        let wrapped = p.wrap_dek(&dek).unwrap();
        let err = p.unwrap_dek(&wrapped.ciphertext, &wrapped.iv[..8]).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidNonceLength { .. }));
    }

    #[test]
    fn unwrap_rejects_tampered_ciphertext() {
        let p = provider();
        let dek = Dek::generate().unwrap();
        let mut wrapped = p.wrap_dek(&dek).unwrap();
        let last = wrapped.ciphertext.len() - 1;
        wrapped.ciphertext[last] ^= 0xFF;
        let err = p.unwrap_dek(&wrapped.ciphertext, &wrapped.iv).unwrap_err();
        assert!(matches!(err, CryptoError::DecryptFailed));
    }

    #[test]
    fn different_keys_produce_different_fingerprints() {
        let a = AesKekProvider::new([0x11; 32]);
        let b = AesKekProvider::new([0x22; 32]);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn same_key_produces_stable_fingerprint() {
        let a = AesKekProvider::new([0x11; 32]);
        let b = AesKekProvider::new([0x11; 32]);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        let err = AesKekProvider::from_hex("aabb").unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKey(_)));
    }

    #[test]
    fn kind_is_aes() {
        assert_eq!(provider().kind(), "aes");
    }

    #[test]
    fn algorithm_label_is_aes_gcm_256() {
        assert_eq!(provider().algorithm_label(), "aes-gcm-256");
    }
}
