//! Structured error hierarchy for configuration loading and validation.
//!
//! These errors surface at startup, before any request is served, so they
//! carry operator-facing detail freely — unlike the per-request error types
//! in `s3ep-api`, nothing here is ever echoed to an untrusted client.

use thiserror::Error;

/// Errors raised while loading or validating proxy configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid environment override {var}: {reason}")]
    InvalidEnvOverride { var: String, reason: String },

    #[error("duplicate provider alias: {0}")]
    DuplicateProviderAlias(String),

    #[error("duplicate provider fingerprint: {0}")]
    DuplicateFingerprint(String),

    #[error("active encryption alias {0:?} does not match any configured provider")]
    UnknownActiveAlias(String),

    #[error("at least one s3_clients entry is required")]
    NoClientCredentials,

    #[error("duplicate client access key id: {0}")]
    DuplicateAccessKeyId(String),

    #[error("client access key id {0:?} is too short (minimum 8 characters)")]
    AccessKeyTooShort(String),

    #[error("client secret key for {0:?} is too short (minimum 16 characters)")]
    SecretKeyTooShort(String),

    #[error("{field} must be in range {min}..{max}, got {actual}")]
    OutOfRange {
        field: &'static str,
        min: i64,
        max: i64,
        actual: i64,
    },

    #[error("s3_backend.target_endpoint is required")]
    MissingUpstreamEndpoint,

    #[error("invalid provider config for alias {alias:?}: {reason}")]
    InvalidProvider { alias: String, reason: String },

    #[error("invalid base64 in {field}: {source}")]
    Base64 {
        field: &'static str,
        #[source]
        source: base64::DecodeError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_alias_message_contains_alias() {
        let err = ConfigError::DuplicateProviderAlias("primary".into());
        assert!(err.to_string().contains("primary"));
    }

    #[test]
    fn out_of_range_message_contains_bounds() {
        let err = ConfigError::OutOfRange {
            field: "max_clock_skew_seconds",
            min: 0,
            max: 3600,
            actual: 9000,
        };
        let msg = err.to_string();
        assert!(msg.contains("max_clock_skew_seconds"));
        assert!(msg.contains("9000"));
    }

    #[test]
    fn access_key_too_short_message() {
        let err = ConfigError::AccessKeyTooShort("ab".into());
        assert!(err.to_string().contains("ab"));
    }
}
