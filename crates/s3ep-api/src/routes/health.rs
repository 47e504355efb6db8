//! Unauthenticated liveness/readiness and version endpoints (SPEC_FULL
//! §6: these two paths never require SigV4).

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    providers_loaded: bool,
    credentials_loaded: bool,
}

/// Readiness check: the proxy can only serve traffic once it has at
/// least one configured encryption provider and at least one client
/// credential. Backend reachability is not probed here (it would make
/// `/health` itself depend on an upstream network call); a backend
/// outage surfaces through normal request failures instead.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Proxy is ready to serve traffic"),
        (status = 503, description = "Provider registry or credential table not loaded"),
    )
)]
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let providers_loaded = !state.registry.is_empty();
    let credentials_loaded = !state.credentials.is_empty();
    let ready = providers_loaded && credentials_loaded;

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthBody {
            status: if ready { "ok" } else { "not-ready" },
            providers_loaded,
            credentials_loaded,
        }),
    )
}

#[derive(Serialize)]
struct VersionBody {
    name: &'static str,
    version: &'static str,
}

#[utoipa::path(
    get,
    path = "/version",
    tag = "health",
    responses((status = 200, description = "Package name and version"))
)]
pub async fn version() -> impl IntoResponse {
    Json(VersionBody {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    fn test_config() -> s3ep_core::Config {
        s3ep_core::Config {
            bind_address: "0.0.0.0:8443".to_string(),
            tls: Default::default(),
            shutdown_timeout_seconds: 30,
            log_format: s3ep_core::config::LogFormat::Pretty,
            s3_backend: s3ep_core::config::BackendConfig {
                target_endpoint: "http://localhost:9000".to_string(),
                region: "us-east-1".to_string(),
                access_key_id: "upstream".to_string(),
                secret_key: "upstream-secret-key-0123456789".to_string(),
                use_tls: false,
                insecure_skip_verify: false,
            },
            s3_clients: vec![s3ep_core::ClientCredential {
                access_key_id: "clientaccesskey".to_string(),
                secret_key: "clientsecretkey0123456789".to_string(),
                description: None,
            }],
            security: Default::default(),
            encryption: s3ep_core::config::EncryptionConfig {
                providers: vec![s3ep_core::config::ProviderConfig {
                    alias: "primary".to_string(),
                    kind: s3ep_core::config::ProviderKind::None,
                    config: s3ep_core::config::ProviderKeyConfig::default(),
                }],
                encryption_method_alias: Some("primary".to_string()),
                ..Default::default()
            },
            optimizations: Default::default(),
        }
    }

    #[tokio::test]
    async fn health_reports_ready_when_providers_and_credentials_loaded() {
        let state = AppState::build(test_config()).unwrap();
        let response = health(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn version_reports_package_metadata() {
        let response = version().await.into_response();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["name"], "s3ep-api");
    }
}
