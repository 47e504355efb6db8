//! Client credential table (§3 "Client credential").
//!
//! Loaded once at startup from configuration; immutable and process-wide
//! thereafter, read-mostly per SPEC_FULL §5's concurrency model.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A single configured client credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientCredential {
    pub access_key_id: String,
    pub secret_key: String,
    pub description: Option<String>,
}

impl ClientCredential {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.access_key_id.len() < 8 {
            return Err(ConfigError::AccessKeyTooShort(self.access_key_id.clone()));
        }
        if self.secret_key.len() < 16 {
            return Err(ConfigError::SecretKeyTooShort(self.access_key_id.clone()));
        }
        Ok(())
    }
}

/// In-memory lookup table from access-key-id to credential.
///
/// Constructed once via [`CredentialTable::build`]; no mutation methods
/// are exposed — rotating credentials means restarting the process with
/// new configuration, per the "no singletons" / immutable-after-startup
/// design note.
#[derive(Debug, Clone)]
pub struct CredentialTable {
    by_access_key: HashMap<String, ClientCredential>,
}

impl CredentialTable {
    /// Build and validate a table from configured credentials.
    ///
    /// Fails if the list is empty, any entry fails its own validation, or
    /// two entries share an access-key-id.
    pub fn build(credentials: Vec<ClientCredential>) -> Result<Self, ConfigError> {
        if credentials.is_empty() {
            return Err(ConfigError::NoClientCredentials);
        }

        let mut by_access_key = HashMap::with_capacity(credentials.len());
        for cred in credentials {
            cred.validate()?;
            if by_access_key.contains_key(&cred.access_key_id) {
                return Err(ConfigError::DuplicateAccessKeyId(cred.access_key_id));
            }
            by_access_key.insert(cred.access_key_id.clone(), cred);
        }

        Ok(Self { by_access_key })
    }

    /// Look up a credential by access-key-id.
    pub fn get(&self, access_key_id: &str) -> Option<&ClientCredential> {
        self.by_access_key.get(access_key_id)
    }

    pub fn len(&self) -> usize {
        self.by_access_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_access_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cred(id: &str, secret: &str) -> ClientCredential {
        ClientCredential {
            access_key_id: id.to_string(),
            secret_key: secret.to_string(),
            description: None,
        }
    }

    #[test]
    fn build_rejects_empty_list() {
        let err = CredentialTable::build(vec![]).unwrap_err();
        assert!(matches!(err, ConfigError::NoClientCredentials));
    }

    #[test]
    fn build_rejects_short_access_key() {
        let err = CredentialTable::build(vec![cred("short", "0123456789abcdef")]).unwrap_err();
        assert!(matches!(err, ConfigError::AccessKeyTooShort(_)));
    }

    #[test]
    fn build_rejects_short_secret() {
        let err = CredentialTable::build(vec![cred("longenoughid", "short")]).unwrap_err();
        assert!(matches!(err, ConfigError::SecretKeyTooShort(_)));
    }

    #[test]
    fn build_rejects_duplicate_access_key() {
        let err = CredentialTable::build(vec![
            cred("longenoughid", "0123456789abcdef"),
            cred("longenoughid", "fedcba9876543210"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateAccessKeyId(_)));
    }

    #[test]
    fn lookup_succeeds_for_known_key() {
        let table =
            CredentialTable::build(vec![cred("longenoughid", "0123456789abcdef")]).unwrap();
        assert!(table.get("longenoughid").is_some());
        assert!(table.get("unknown").is_none());
        assert_eq!(table.len(), 1);
    }
}
