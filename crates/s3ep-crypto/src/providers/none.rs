//! No-op KEK provider: passes the DEK through unwrapped. Exists for
//! local development and migrations where payload encryption stays on
//! but key-wrapping overhead is not wanted. Per SPEC_FULL §4.1 this
//! provider's fingerprint is always the literal `"none"`.

use crate::dek::Dek;
use crate::error::CryptoError;
use crate::provider::{KekProvider, WrappedDek};

pub struct NoneKekProvider;

impl KekProvider for NoneKekProvider {
    fn kind(&self) -> &'static str {
        "none"
    }

    fn algorithm_label(&self) -> &'static str {
        "none"
    }

    fn fingerprint(&self) -> &str {
        "none"
    }

    fn wrap_dek(&self, dek: &Dek) -> Result<WrappedDek, CryptoError> {
        Ok(WrappedDek {
            ciphertext: dek.as_bytes().to_vec(),
            iv: Vec::new(),
            fingerprint: "none".to_string(),
        })
    }

    fn unwrap_dek(&self, ciphertext: &[u8], _iv: &[u8]) -> Result<Dek, CryptoError> {
        let bytes: [u8; 32] = ciphertext
            .try_into()
            .map_err(|_| CryptoError::DecryptFailed)?;
        Ok(Dek::from_bytes(bytes))
    }
}
