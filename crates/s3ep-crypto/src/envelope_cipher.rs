//! Envelope cipher (C5): single-shot AES-256-GCM over a whole payload,
//! used for small objects and the RSA/AES envelope path. A fresh
//! 12-byte nonce is drawn per call and returned alongside the
//! ciphertext for storage in `aes-iv`.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand_core::{OsRng, RngCore};

use crate::dek::Dek;
use crate::error::CryptoError;

pub const NONCE_LEN: usize = 12;

pub struct EnvelopeCiphertext {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
}

/// Encrypt `plaintext` under `dek` with AES-256-GCM. The returned
/// ciphertext includes the GCM authentication tag (plaintext length +
/// 16 bytes), matching SPEC_FULL §4.2's "ciphertext length equals
/// plaintext length + GCM-tag length" invariant.
pub fn encrypt(dek: &Dek, plaintext: &[u8]) -> Result<EnvelopeCiphertext, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(dek.as_bytes()));
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng
        .try_fill_bytes(&mut nonce_bytes)
        .map_err(|e| CryptoError::Rng(e.to_string()))?;
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::DecryptFailed)?;
    Ok(EnvelopeCiphertext {
        ciphertext,
        nonce: nonce_bytes,
    })
}

/// Decrypt a payload produced by [`encrypt`]. Tag mismatch or corrupt
/// ciphertext surfaces as [`CryptoError::DecryptFailed`] with no
/// further detail, per the proxy's `KEY_MISSING`/`DECRYPT_FAILED`
/// error-kind separation in SPEC_FULL §7.
pub fn decrypt(dek: &Dek, ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if nonce.len() != NONCE_LEN {
        return Err(CryptoError::InvalidNonceLength {
            expected: NONCE_LEN,
            actual: nonce.len(),
        });
    }
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(dek.as_bytes()));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::DecryptFailed)
}
