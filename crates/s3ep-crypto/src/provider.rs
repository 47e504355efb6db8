//! KEK provider trait (C1). A [`KekProvider`] wraps and unwraps DEKs
//! under a long-lived key-encryption key. One implementation per
//! provider kind (`aes`, `rsa`, `none`); the registry (C2) holds a
//! `Box<dyn KekProvider>` per configured alias.

use crate::dek::Dek;
use crate::error::CryptoError;

/// A wrapped DEK plus the metadata needed to unwrap it again: the IV
/// used (empty for providers that don't need one, e.g. RSA-OAEP) and
/// the fingerprint of the KEK that performed the wrap.
pub struct WrappedDek {
    pub ciphertext: Vec<u8>,
    pub iv: Vec<u8>,
    pub fingerprint: String,
}

/// Wraps and unwraps data-encryption keys under a key-encryption key.
///
/// Implementations must be stateless with respect to the DEK they
/// operate on — all per-call state lives in the `Dek`/`WrappedDek`
/// arguments, never in `self`. This lets one provider instance serve
/// concurrent requests without interior mutability.
pub trait KekProvider: Send + Sync {
    /// Short provider kind, e.g. `"aes"`, `"rsa"`, `"none"`. Stored
    /// alongside the object so reads can select the matching provider
    /// kind's unwrap algorithm even when resolution is by fingerprint.
    fn kind(&self) -> &'static str;

    /// Wire-format wrap-algorithm label written into the
    /// `kek-algorithm` metadata field, e.g. `"aes-gcm-256"`,
    /// `"rsa-oaep-sha256"`, `"none"`. Distinct from [`kind`](Self::kind):
    /// `kind` is the short registry-lookup tag used to pick an
    /// implementation, this is the algorithm identifier other
    /// implementations parse off the stored object.
    fn algorithm_label(&self) -> &'static str;

    /// Stable identifier for the active KEK, written into object
    /// metadata as `kek-fingerprint` so a future read can find the
    /// provider that can unwrap it, even after the active alias has
    /// moved on to a different key.
    fn fingerprint(&self) -> &str;

    /// Encrypt `dek` under this provider's KEK.
    fn wrap_dek(&self, dek: &Dek) -> Result<WrappedDek, CryptoError>;

    /// Decrypt a previously wrapped DEK. `iv` is empty for providers
    /// that don't use one.
    fn unwrap_dek(&self, ciphertext: &[u8], iv: &[u8]) -> Result<Dek, CryptoError>;
}
