//! RSA KEK provider: wraps a DEK with RSA-OAEP-SHA256. No IV — OAEP
//! padding is randomized internally by the `rsa` crate, so the `iv`
//! field of [`WrappedDek`] is always empty for this provider.

use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use crate::dek::Dek;
use crate::error::CryptoError;
use crate::provider::{KekProvider, WrappedDek};

pub struct RsaKekProvider {
    public_key: RsaPublicKey,
    private_key: Option<RsaPrivateKey>,
    fingerprint: String,
}

impl RsaKekProvider {
    /// Public-key-only provider: can wrap but not unwrap. Used for
    /// write-only configurations where the private key lives elsewhere.
    pub fn from_public_pem(pem: &str) -> Result<Self, CryptoError> {
        let public_key =
            RsaPublicKey::from_public_key_pem(pem).map_err(|e| CryptoError::Pem(e.to_string()))?;
        let fingerprint = fingerprint_of(&public_key);
        Ok(Self {
            public_key,
            private_key: None,
            fingerprint,
        })
    }

    /// Full provider from a private key PEM; the public key is derived
    /// from it so wrap and unwrap always agree on the fingerprint.
    pub fn from_private_pem(pem: &str) -> Result<Self, CryptoError> {
        let private_key =
            RsaPrivateKey::from_pkcs8_pem(pem).map_err(|e| CryptoError::Pem(e.to_string()))?;
        let public_key = RsaPublicKey::from(&private_key);
        let fingerprint = fingerprint_of(&public_key);
        Ok(Self {
            public_key,
            private_key: Some(private_key),
            fingerprint,
        })
    }
}

fn fingerprint_of(public_key: &RsaPublicKey) -> String {
    use rsa::traits::PublicKeyParts;
    let mut hasher = Sha256::new();
    hasher.update(public_key.n().to_bytes_be());
    hasher.update(public_key.e().to_bytes_be());
    hex::encode(&hasher.finalize()[..8])
}

impl KekProvider for RsaKekProvider {
    fn kind(&self) -> &'static str {
        "rsa"
    }

    fn algorithm_label(&self) -> &'static str {
        "rsa-oaep-sha256"
    }

    fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn wrap_dek(&self, dek: &Dek) -> Result<WrappedDek, CryptoError> {
        let padding = Oaep::new::<Sha256>();
        let mut rng = rand::thread_rng();
        let ciphertext = self
            .public_key
            .encrypt(&mut rng, padding, dek.as_bytes().as_slice())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(WrappedDek {
            ciphertext,
            iv: Vec::new(),
            fingerprint: self.fingerprint.clone(),
        })
    }

    fn unwrap_dek(&self, ciphertext: &[u8], _iv: &[u8]) -> Result<Dek, CryptoError> {
        let private_key = self.private_key.as_ref().ok_or(CryptoError::KeyMissing)?;
        let padding = Oaep::new::<Sha256>();
        let plaintext = private_key
            .decrypt(padding, ciphertext)
            .map_err(|_| CryptoError::DecryptFailed)?;
        let bytes: [u8; 32] = plaintext
            .try_into()
            .map_err(|_| CryptoError::DecryptFailed)?;
        Ok(Dek::from_bytes(bytes))
    }
}
