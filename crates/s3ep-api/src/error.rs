//! Proxy error type, implementing `axum::response::IntoResponse`.
//!
//! Every variant maps to an HTTP status and an S3-style error code so
//! clients see a response shaped like the real service they think
//! they're talking to. Internal detail (why a decrypt failed, what the
//! backend actually said) is logged via `tracing` but never echoed —
//! see SPEC_FULL §7's error-kind table.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use s3ep_crypto::CryptoError;

/// S3-style XML-ish error body, rendered as JSON here (the client-facing
/// REST surface itself still speaks XML at the route layer; this is the
/// internal representation `IntoResponse` builds from).
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// S3-style machine-readable error code, e.g. `SignatureDoesNotMatch`.
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Error, Debug)]
pub enum ProxyError {
    /// SigV4 signature invalid, unknown access key, or request outside
    /// the clock-skew window (403).
    #[error("authentication failed: {0}")]
    AuthFailure(String),

    /// Per-IP request quota exceeded (503).
    #[error("rate limit exceeded")]
    RateLimited,

    /// Malformed auth header or a client metadata key collides with
    /// the reserved envelope prefix (400).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No provider registered for the object's `kek-fingerprint`, or an
    /// RSA provider asked to decrypt without a private key (422). Never
    /// carries detail beyond the fixed message — see SPEC_FULL §7.
    #[error("required encryption key not available")]
    KeyMissing,

    /// AEAD tag mismatch or corrupt wrapped DEK (422).
    #[error("decryption failed")]
    DecryptFailed,

    /// HMAC mismatch on a streaming read (422).
    #[error("integrity verification failed")]
    IntegrityFailed,

    /// Range read on a streaming-encrypted object, or an unsupported
    /// S3 operation (501).
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Upstream backend returned a 4xx/5xx; propagated with the
    /// upstream's own status rather than translated.
    #[error("backend error: {status}: {message}")]
    BackendError { status: StatusCode, message: String },

    /// RNG failure, unexpected I/O, or any other condition the proxy
    /// cannot attribute to the client or the backend (500).
    #[error("internal error: {0}")]
    InternalError(String),
}

impl ProxyError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::AuthFailure(_) => (StatusCode::FORBIDDEN, "SignatureDoesNotMatch"),
            Self::RateLimited => (StatusCode::SERVICE_UNAVAILABLE, "SlowDown"),
            Self::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "InvalidRequest"),
            Self::KeyMissing => (StatusCode::UNPROCESSABLE_ENTITY, "InvalidRequest"),
            Self::DecryptFailed => (StatusCode::UNPROCESSABLE_ENTITY, "InvalidRequest"),
            Self::IntegrityFailed => (StatusCode::UNPROCESSABLE_ENTITY, "InvalidRequest"),
            Self::NotImplemented(_) => (StatusCode::NOT_IMPLEMENTED, "NotImplemented"),
            Self::BackendError { status, .. } => (*status, "BackendError"),
            Self::InternalError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "InternalError"),
        }
    }
}

impl From<CryptoError> for ProxyError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::KeyMissing => Self::KeyMissing,
            CryptoError::DecryptFailed => Self::DecryptFailed,
            CryptoError::IntegrityFailed => Self::IntegrityFailed,
            CryptoError::UnknownFingerprint(_) => Self::KeyMissing,
            other => Self::InternalError(other.to_string()),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::InternalError(_) => "An internal error occurred".to_string(),
            Self::BackendError { .. } => "The upstream storage backend returned an error".to_string(),
            other => other.to_string(),
        };

        match &self {
            Self::InternalError(_) => tracing::error!(error = %self, "internal proxy error"),
            Self::BackendError { .. } => tracing::warn!(error = %self, "backend error"),
            Self::AuthFailure(_) => tracing::warn!(error = %self, "authentication rejected"),
            Self::KeyMissing | Self::DecryptFailed | Self::IntegrityFailed => {
                tracing::warn!(error = %self, "cryptographic failure on object")
            }
            _ => {}
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn auth_failure_is_403_signature_does_not_match() {
        let err = ProxyError::AuthFailure("bad signature".to_string());
        let (status, code) = err.status_and_code();
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(code, "SignatureDoesNotMatch");
    }

    #[test]
    fn rate_limited_is_503_slow_down() {
        let (status, code) = ProxyError::RateLimited.status_and_code();
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(code, "SlowDown");
    }

    #[test]
    fn key_missing_is_422() {
        let (status, _) = ProxyError::KeyMissing.status_and_code();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn decrypt_failed_is_422() {
        let (status, _) = ProxyError::DecryptFailed.status_and_code();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn integrity_failed_is_422() {
        let (status, _) = ProxyError::IntegrityFailed.status_and_code();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn not_implemented_is_501() {
        let (status, code) = ProxyError::NotImplemented("range read".to_string()).status_and_code();
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        assert_eq!(code, "NotImplemented");
    }

    #[test]
    fn backend_error_propagates_upstream_status() {
        let err = ProxyError::BackendError {
            status: StatusCode::CONFLICT,
            message: "upstream conflict".to_string(),
        };
        let (status, _) = err.status_and_code();
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[test]
    fn crypto_key_missing_converts() {
        let err: ProxyError = CryptoError::KeyMissing.into();
        assert!(matches!(err, ProxyError::KeyMissing));
    }

    #[test]
    fn crypto_unknown_fingerprint_converts_to_key_missing() {
        let err: ProxyError = CryptoError::UnknownFingerprint("deadbeef".to_string()).into();
        assert!(matches!(err, ProxyError::KeyMissing));
    }

    #[test]
    fn crypto_integrity_failed_converts() {
        let err: ProxyError = CryptoError::IntegrityFailed.into();
        assert!(matches!(err, ProxyError::IntegrityFailed));
    }

    async fn response_parts(err: ProxyError) -> (StatusCode, ErrorBody) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        (status, body)
    }

    #[tokio::test]
    async fn internal_error_hides_detail() {
        let (status, body) =
            response_parts(ProxyError::InternalError("rng unavailable: errno 12".to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error.message, "An internal error occurred");
        assert!(!body.error.message.contains("errno"));
    }

    #[tokio::test]
    async fn key_missing_message_is_user_friendly() {
        let (_, body) = response_parts(ProxyError::KeyMissing).await;
        assert_eq!(body.error.message, "required encryption key not available");
    }

    #[tokio::test]
    async fn decrypt_failed_hides_detail() {
        let (_, body) = response_parts(ProxyError::DecryptFailed).await;
        assert_eq!(body.error.message, "decryption failed");
    }
}
