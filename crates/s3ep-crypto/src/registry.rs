//! Provider registry (C2): holds every configured [`KekProvider`] by
//! alias, plus the designated active alias used for writes. Reads
//! resolve by fingerprint instead, so rotating the active alias never
//! breaks previously written objects — see SPEC_FULL §4.2 "Provider
//! resolution on rotation".

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::CryptoError;
use crate::provider::KekProvider;

pub struct ProviderRegistry {
    by_alias: HashMap<String, Arc<dyn KekProvider>>,
    by_fingerprint: HashMap<String, Arc<dyn KekProvider>>,
    active_alias: String,
}

impl ProviderRegistry {
    /// Build a registry from `(alias, provider)` pairs plus the alias
    /// to use for writes. Fails if the active alias is absent, if two
    /// aliases collide, or if two providers share a fingerprint — the
    /// latter would make fingerprint-based read resolution ambiguous.
    pub fn build(
        providers: Vec<(String, Arc<dyn KekProvider>)>,
        active_alias: String,
    ) -> Result<Self, CryptoError> {
        let mut by_alias = HashMap::with_capacity(providers.len());
        let mut by_fingerprint = HashMap::with_capacity(providers.len());

        for (alias, provider) in providers {
            if by_alias.contains_key(&alias) {
                return Err(CryptoError::InvalidKey(format!(
                    "duplicate provider alias: {alias}"
                )));
            }
            let fingerprint = provider.fingerprint().to_string();
            if by_fingerprint.contains_key(&fingerprint) {
                return Err(CryptoError::InvalidKey(format!(
                    "duplicate provider fingerprint: {fingerprint}"
                )));
            }
            by_fingerprint.insert(fingerprint, provider.clone());
            by_alias.insert(alias, provider);
        }

        if !by_alias.contains_key(&active_alias) {
            return Err(CryptoError::InvalidKey(format!(
                "active alias {active_alias} does not resolve to a configured provider"
            )));
        }

        Ok(Self {
            by_alias,
            by_fingerprint,
            active_alias,
        })
    }

    /// The provider used for new writes.
    pub fn active(&self) -> Arc<dyn KekProvider> {
        self.by_alias
            .get(&self.active_alias)
            .expect("active_alias invariant checked at construction")
            .clone()
    }

    pub fn by_alias(&self, alias: &str) -> Option<Arc<dyn KekProvider>> {
        self.by_alias.get(alias).cloned()
    }

    /// Resolution path for reads: the fingerprint recorded in an
    /// object's metadata is authoritative regardless of which alias is
    /// currently active.
    pub fn by_fingerprint(&self, fingerprint: &str) -> Result<Arc<dyn KekProvider>, CryptoError> {
        self.by_fingerprint
            .get(fingerprint)
            .cloned()
            .ok_or_else(|| CryptoError::UnknownFingerprint(fingerprint.to_string()))
    }

    pub fn active_alias(&self) -> &str {
        &self.active_alias
    }

    pub fn len(&self) -> usize {
        self.by_alias.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_alias.is_empty()
    }
}
