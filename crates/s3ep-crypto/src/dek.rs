//! DEK lifecycle (C4): fresh 256-bit data-encryption keys from a CSPRNG,
//! zeroized on drop. A [`Dek`] is owned exclusively by one request
//! worker for its whole lifetime — generated on write or unwrapped on
//! read, used for exactly one object's cipher operations, then dropped.
//! No sharing, no reference counting, per the "DEK ownership" design
//! note in SPEC_FULL §9.

use rand_core::{OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// A 256-bit data-encryption key. Zeroized on drop; `Debug` never prints
/// key bytes.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Dek([u8; 32]);

impl Dek {
    /// Generate a fresh DEK from the OS CSPRNG. The only failure mode is
    /// RNG unavailability, which the caller must treat as
    /// `InternalError` per SPEC_FULL §4.4 — no fallback RNG is
    /// permitted.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut bytes = [0u8; 32];
        OsRng.try_fill_bytes(&mut bytes)
            .map_err(|e| CryptoError::Rng(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Reconstruct a DEK from raw bytes unwrapped off a KEK (read path).
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Zero DEK, used by the `none` provider's identity unwrap — the
    /// payload path treats this as a signal to skip ciphering entirely
    /// rather than as a usable key.
    pub fn zero() -> Self {
        Self([0u8; 32])
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl std::fmt::Debug for Dek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Dek([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_produces_32_bytes() {
        let dek = Dek::generate().unwrap();
        assert_eq!(dek.as_bytes().len(), 32);
    }

    #[test]
    fn generate_is_random() {
        let a = Dek::generate().unwrap();
        let b = Dek::generate().unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn debug_never_prints_key_material() {
        let dek = Dek::from_bytes([0x42; 32]);
        let debug = format!("{dek:?}");
        assert!(!debug.contains("42"));
        assert_eq!(debug, "Dek([REDACTED])");
    }

    #[test]
    fn zero_dek_is_zero() {
        assert!(Dek::zero().is_zero());
        assert!(!Dek::generate().unwrap().is_zero());
    }

    #[test]
    fn zeroizes_on_drop_without_panic() {
        let dek = Dek::generate().unwrap();
        drop(dek);
    }

    #[test]
    fn from_bytes_roundtrip() {
        let bytes = [7u8; 32];
        let dek = Dek::from_bytes(bytes);
        assert_eq!(dek.as_bytes(), &bytes);
    }
}
