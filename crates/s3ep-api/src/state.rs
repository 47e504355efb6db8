//! Shared application state handed to every Axum handler: the validated
//! configuration, the crypto provider registry, the client credential
//! table, the upstream backend client, and the Prometheus metrics
//! registry.

use std::sync::Arc;

use s3ep_core::{Config, CredentialTable};
use s3ep_crypto::registry::ProviderRegistry;
use s3ep_crypto::CryptoError;

use crate::backend::BackendClient;
use crate::middleware::auth::FailureTracker;
use crate::middleware::metrics::ApiMetrics;
use crate::middleware::rate_limit::RateLimiter;
use crate::multipart_session::MultipartSessionStore;

/// Authentication-related shared state: the per-IP failure tracker
/// seeded from `config.security`.
#[derive(Clone)]
pub struct AuthState {
    pub failures: FailureTracker,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<ProviderRegistry>,
    pub credentials: Arc<CredentialTable>,
    pub backend: Arc<BackendClient>,
    pub metrics: ApiMetrics,
    pub auth: AuthState,
    pub rate_limiter: RateLimiter,
    pub multipart_sessions: MultipartSessionStore,
}

impl AppState {
    pub fn build(config: Config) -> Result<Self, CryptoError> {
        let registry = Arc::new(build_registry(&config)?);
        let credentials = Arc::new(
            CredentialTable::build(config.s3_clients.clone())
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?,
        );
        let backend = Arc::new(BackendClient::new(&config.s3_backend));
        let auth = AuthState {
            failures: FailureTracker::new(
                config.security.max_failed_attempts,
                config.security.unblock_ip_seconds,
            ),
        };
        let rate_limiter = RateLimiter::new(
            config.security.enable_rate_limiting,
            config.security.max_requests_per_minute,
        );

        Ok(Self {
            config: Arc::new(config),
            registry,
            credentials,
            backend,
            metrics: ApiMetrics::new(),
            auth,
            rate_limiter,
            multipart_sessions: MultipartSessionStore::new(),
        })
    }
}

/// Build a [`ProviderRegistry`] from `config.encryption`, constructing
/// one `KekProvider` per configured entry. Mirrors the validation
/// `Config::validate` already performed on the raw shape; this is where
/// the validated shape becomes live provider instances.
fn build_registry(config: &Config) -> Result<ProviderRegistry, CryptoError> {
    use s3ep_core::config::ProviderKind;
    use s3ep_crypto::provider::KekProvider;
    use s3ep_crypto::providers::aes::AesKekProvider;
    use s3ep_crypto::providers::none::NoneKekProvider;
    use s3ep_crypto::providers::rsa::RsaKekProvider;

    let mut providers: Vec<(String, Arc<dyn KekProvider>)> = Vec::new();
    for entry in &config.encryption.providers {
        let provider: Arc<dyn KekProvider> = match entry.kind {
            ProviderKind::Aes => {
                let key_b64 = entry
                    .config
                    .key
                    .as_deref()
                    .ok_or_else(|| CryptoError::InvalidKey(format!("{}: missing key", entry.alias)))?;
                let key_bytes = base64::Engine::decode(
                    &base64::engine::general_purpose::STANDARD,
                    key_b64,
                )
                .map_err(|e| CryptoError::Base64Decode(e.to_string()))?;
                let key: [u8; 32] = key_bytes.try_into().map_err(|v: Vec<u8>| {
                    CryptoError::InvalidKey(format!("expected 32-byte key, got {}", v.len()))
                })?;
                Arc::new(AesKekProvider::new(key))
            }
            ProviderKind::Rsa => {
                if let Some(private_pem) = &entry.config.private_key_pem {
                    Arc::new(RsaKekProvider::from_private_pem(private_pem)?)
                } else {
                    let public_pem = entry.config.public_key_pem.as_deref().ok_or_else(|| {
                        CryptoError::InvalidKey(format!("{}: missing public_key_pem", entry.alias))
                    })?;
                    Arc::new(RsaKekProvider::from_public_pem(public_pem)?)
                }
            }
            ProviderKind::None => Arc::new(NoneKekProvider),
        };
        providers.push((entry.alias.clone(), provider));
    }

    let active_alias = config
        .encryption
        .encryption_method_alias
        .clone()
        .unwrap_or_default();

    ProviderRegistry::build(providers, active_alias)
}

#[cfg(test)]
mod tests {
    use super::*;
    use s3ep_core::config::{BackendConfig, EncryptionConfig, ProviderConfig, ProviderKeyConfig, ProviderKind};
    use s3ep_core::ClientCredential;

    fn base_config() -> Config {
        Config {
            bind_address: "0.0.0.0:8443".to_string(),
            tls: Default::default(),
            shutdown_timeout_seconds: 30,
            log_format: s3ep_core::config::LogFormat::Pretty,
            s3_backend: BackendConfig {
                target_endpoint: "http://localhost:9000".to_string(),
                region: "us-east-1".to_string(),
                access_key_id: "upstream".to_string(),
                secret_key: "upstream-secret-key-0123456789".to_string(),
                use_tls: false,
                insecure_skip_verify: false,
            },
            s3_clients: vec![ClientCredential {
                access_key_id: "clientaccesskey".to_string(),
                secret_key: "clientsecretkey0123456789".to_string(),
                description: None,
            }],
            security: Default::default(),
            encryption: EncryptionConfig::default(),
            optimizations: Default::default(),
        }
    }

    #[test]
    fn build_with_none_provider() {
        let mut config = base_config();
        config.encryption.providers = vec![ProviderConfig {
            alias: "primary".to_string(),
            kind: ProviderKind::None,
            config: ProviderKeyConfig::default(),
        }];
        config.encryption.encryption_method_alias = Some("primary".to_string());

        let state = AppState::build(config).unwrap();
        assert_eq!(state.registry.len(), 1);
        assert_eq!(state.credentials.len(), 1);
    }

    #[test]
    fn build_with_aes_provider() {
        let mut config = base_config();
        let key = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, [0x11u8; 32]);
        config.encryption.providers = vec![ProviderConfig {
            alias: "primary".to_string(),
            kind: ProviderKind::Aes,
            config: ProviderKeyConfig {
                key: Some(key),
                public_key_pem: None,
                private_key_pem: None,
            },
        }];
        config.encryption.encryption_method_alias = Some("primary".to_string());

        let state = AppState::build(config).unwrap();
        assert_eq!(state.registry.active().kind(), "aes");
    }

    #[test]
    fn build_fails_on_missing_active_alias() {
        let mut config = base_config();
        config.encryption.providers = vec![ProviderConfig {
            alias: "primary".to_string(),
            kind: ProviderKind::None,
            config: ProviderKeyConfig::default(),
        }];
        config.encryption.encryption_method_alias = Some("does-not-exist".to_string());

        let err = AppState::build(config).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKey(_)));
    }
}
