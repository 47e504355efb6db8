//! Configuration model and layered loader (defaults → TOML file → `S3EP_*`
//! environment overrides), validated once at startup into an immutable
//! [`Config`] value. See SPEC_FULL.md §6 for the recognized option set.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::credential::ClientCredential;
use crate::error::ConfigError;
use crate::metadata::DEFAULT_PREFIX;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;

/// Top-level proxy configuration, as loaded from TOML plus environment
/// overrides. This is the pre-validation shape; call [`Config::validated`]
/// (or load via [`load`]) to get a checked, immutable configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,

    pub s3_backend: BackendConfig,

    #[serde(default)]
    pub s3_clients: Vec<ClientCredential>,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub encryption: EncryptionConfig,

    #[serde(default)]
    pub optimizations: OptimizationsConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub target_endpoint: String,
    #[serde(default = "default_region")]
    pub region: String,
    pub access_key_id: String,
    pub secret_key: String,
    #[serde(default = "default_true")]
    pub use_tls: bool,
    #[serde(default)]
    pub insecure_skip_verify: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "default_clock_skew")]
    pub max_clock_skew_seconds: u32,
    #[serde(default)]
    pub enable_rate_limiting: bool,
    #[serde(default = "default_requests_per_minute")]
    pub max_requests_per_minute: u32,
    #[serde(default = "default_max_failed_attempts")]
    pub max_failed_attempts: u32,
    #[serde(default = "default_unblock_seconds")]
    pub unblock_ip_seconds: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_clock_skew_seconds: default_clock_skew(),
            enable_rate_limiting: false,
            max_requests_per_minute: default_requests_per_minute(),
            max_failed_attempts: default_max_failed_attempts(),
            unblock_ip_seconds: default_unblock_seconds(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncryptionConfig {
    pub encryption_method_alias: Option<String>,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub integrity_verification: bool,
    pub metadata_key_prefix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub alias: String,
    #[serde(rename = "type")]
    pub kind: ProviderKind,
    #[serde(default)]
    pub config: ProviderKeyConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Aes,
    Rsa,
    None,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderKeyConfig {
    /// base64-encoded 256-bit key, for `aes` providers.
    pub key: Option<String>,
    /// PEM-encoded public key, for `rsa` providers.
    pub public_key_pem: Option<String>,
    /// PEM-encoded private key, for `rsa` providers (absent ⇒ write-only).
    pub private_key_pem: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationsConfig {
    #[serde(default = "default_streaming_buffer_size")]
    pub streaming_buffer_size: u64,
    #[serde(default = "default_true")]
    pub enable_adaptive_buffering: bool,
    #[serde(default = "default_streaming_segment_size")]
    pub streaming_segment_size: u64,
    #[serde(default = "default_streaming_threshold")]
    pub streaming_threshold: u64,
}

impl Default for OptimizationsConfig {
    fn default() -> Self {
        Self {
            streaming_buffer_size: default_streaming_buffer_size(),
            enable_adaptive_buffering: true,
            streaming_segment_size: default_streaming_segment_size(),
            streaming_threshold: default_streaming_threshold(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0:8443".to_string()
}
fn default_shutdown_timeout() -> u64 {
    30
}
fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_true() -> bool {
    true
}
fn default_clock_skew() -> u32 {
    900
}
fn default_requests_per_minute() -> u32 {
    1000
}
fn default_max_failed_attempts() -> u32 {
    20
}
fn default_unblock_seconds() -> u32 {
    300
}
fn default_streaming_buffer_size() -> u64 {
    64 * KIB
}
fn default_streaming_segment_size() -> u64 {
    12 * MIB
}
fn default_streaming_threshold() -> u64 {
    5 * MIB
}

impl Config {
    /// Load configuration from a TOML file, apply `S3EP_*` environment
    /// overrides, then validate. Returns the immutable, checked value.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: Config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `S3EP_*` environment variable overrides in place.
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(bind) = std::env::var("S3EP_BIND_ADDRESS") {
            self.bind_address = bind;
        }
        if let Ok(endpoint) = std::env::var("S3EP_BACKEND_ENDPOINT") {
            self.s3_backend.target_endpoint = endpoint;
        }
        if let Ok(skew) = std::env::var("S3EP_MAX_CLOCK_SKEW_SECONDS") {
            self.security.max_clock_skew_seconds =
                skew.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                    var: "S3EP_MAX_CLOCK_SKEW_SECONDS".to_string(),
                    reason: "not a valid u32".to_string(),
                })?;
        }
        Ok(())
    }

    /// Validate all invariants from SPEC_FULL §3 and §6. Consumes `self`
    /// by reference only — this never mutates, it only checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.s3_backend.target_endpoint.trim().is_empty() {
            return Err(ConfigError::MissingUpstreamEndpoint);
        }

        check_range(
            "security.max_clock_skew_seconds",
            self.security.max_clock_skew_seconds as i64,
            0,
            3600,
        )?;
        check_range(
            "security.max_requests_per_minute",
            self.security.max_requests_per_minute as i64,
            1,
            10_000,
        )?;
        check_range(
            "security.max_failed_attempts",
            self.security.max_failed_attempts as i64,
            0,
            1000,
        )?;
        check_range(
            "security.unblock_ip_seconds",
            self.security.unblock_ip_seconds as i64,
            0,
            86_400,
        )?;

        check_range(
            "optimizations.streaming_buffer_size",
            self.optimizations.streaming_buffer_size as i64,
            4 * KIB as i64,
            2 * MIB as i64,
        )?;
        check_range(
            "optimizations.streaming_segment_size",
            self.optimizations.streaming_segment_size as i64,
            5 * MIB as i64,
            5 * GIB as i64,
        )?;
        if self.optimizations.streaming_threshold < MIB {
            return Err(ConfigError::OutOfRange {
                field: "optimizations.streaming_threshold",
                min: MIB as i64,
                max: i64::MAX,
                actual: self.optimizations.streaming_threshold as i64,
            });
        }

        // Credentials are validated by CredentialTable::build at
        // AppState construction time, not here — this just enforces the
        // shape the spec requires is present.
        if self.s3_clients.is_empty() {
            return Err(ConfigError::NoClientCredentials);
        }

        self.validate_providers()
    }

    fn validate_providers(&self) -> Result<(), ConfigError> {
        let providers = &self.encryption.providers;
        if providers.is_empty() {
            return Ok(());
        }

        let mut aliases = std::collections::HashSet::new();
        for provider in providers {
            if !aliases.insert(provider.alias.clone()) {
                return Err(ConfigError::DuplicateProviderAlias(provider.alias.clone()));
            }
            match provider.kind {
                ProviderKind::Aes if provider.config.key.is_none() => {
                    return Err(ConfigError::InvalidProvider {
                        alias: provider.alias.clone(),
                        reason: "aes provider requires config.key".to_string(),
                    });
                }
                ProviderKind::Rsa if provider.config.public_key_pem.is_none() => {
                    return Err(ConfigError::InvalidProvider {
                        alias: provider.alias.clone(),
                        reason: "rsa provider requires config.public_key_pem".to_string(),
                    });
                }
                _ => {}
            }
        }

        match &self.encryption.encryption_method_alias {
            Some(active) if !aliases.contains(active) => {
                Err(ConfigError::UnknownActiveAlias(active.clone()))
            }
            None => Err(ConfigError::UnknownActiveAlias(String::new())),
            Some(_) => Ok(()),
        }
    }

    /// The configured metadata prefix, or the canonical default.
    pub fn metadata_prefix(&self) -> &str {
        self.encryption
            .metadata_key_prefix
            .as_deref()
            .unwrap_or(DEFAULT_PREFIX)
    }
}

fn check_range(field: &'static str, actual: i64, min: i64, max: i64) -> Result<(), ConfigError> {
    if actual < min || actual > max {
        Err(ConfigError::OutOfRange {
            field,
            min,
            max,
            actual,
        })
    } else {
        Ok(())
    }
}
