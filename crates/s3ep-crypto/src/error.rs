//! # Cryptographic Error Types
//!
//! Structured errors for all cryptographic operations in `s3ep-crypto`.
//! Uses `thiserror` for ergonomic error definitions with diagnostic
//! context. `DecryptFailed`/`IntegrityFailed`/`KeyMissing` deliberately
//! carry no inner detail — these cross into per-request HTTP responses
//! (§7) and must never hint at which part of a verification failed.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("rng failure: {0}")]
    Rng(String),

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("invalid nonce/iv length: expected {expected}, got {actual}")]
    InvalidNonceLength { expected: usize, actual: usize },

    /// No provider registered for the object's `kek-fingerprint`, or an
    /// RSA provider asked to unwrap without private key material.
    #[error("required encryption key not available")]
    KeyMissing,

    /// AEAD tag mismatch or corrupt wrapped DEK.
    #[error("decryption failed")]
    DecryptFailed,

    /// HMAC verification failed on a streaming read.
    #[error("integrity verification failed")]
    IntegrityFailed,

    #[error("unknown kek fingerprint: {0}")]
    UnknownFingerprint(String),

    #[error("hex decode error: {0}")]
    HexDecode(String),

    #[error("base64 decode error: {0}")]
    Base64Decode(String),

    #[error("pem decode error: {0}")]
    Pem(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decrypt_failed_message_does_not_leak_detail() {
        assert_eq!(CryptoError::DecryptFailed.to_string(), "decryption failed");
    }

    #[test]
    fn key_missing_message() {
        assert_eq!(
            CryptoError::KeyMissing.to_string(),
            "required encryption key not available"
        );
    }

    #[test]
    fn integrity_failed_message() {
        assert_eq!(
            CryptoError::IntegrityFailed.to_string(),
            "integrity verification failed"
        );
    }

    #[test]
    fn invalid_nonce_length_message() {
        let err = CryptoError::InvalidNonceLength {
            expected: 12,
            actual: 8,
        };
        let msg = err.to_string();
        assert!(msg.contains("12"));
        assert!(msg.contains('8'));
    }

    #[test]
    fn unknown_fingerprint_message_contains_fingerprint() {
        let err = CryptoError::UnknownFingerprint("deadbeef".to_string());
        assert!(err.to_string().contains("deadbeef"));
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let crypto_err: CryptoError = io_err.into();
        assert!(matches!(crypto_err, CryptoError::Io(_)));
    }

    #[test]
    fn all_variants_are_debug() {
        let variants: Vec<CryptoError> = vec![
            CryptoError::Rng("a".to_string()),
            CryptoError::InvalidKey("b".to_string()),
            CryptoError::KeyMissing,
            CryptoError::DecryptFailed,
            CryptoError::IntegrityFailed,
        ];
        for v in variants {
            assert!(!format!("{v:?}").is_empty());
        }
    }
}
