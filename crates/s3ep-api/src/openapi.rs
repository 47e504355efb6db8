//! # OpenAPI Specification Assembly
//!
//! Assembles all utoipa-documented routes into a single OpenAPI spec,
//! served at `/openapi.json`.
//!
//! The bulk of this proxy's surface — object PUT/GET/HEAD/DELETE and the
//! multipart quartet — carries raw S3 request/response bodies: binary
//! payloads and XML control documents, not JSON. Only the shape that is
//! actually typed (health/version, and the error envelope every route
//! can return) is modeled here, the way a real S3-compatible service's
//! OpenAPI document describes its bucket/object surface in prose and
//! headers rather than JSON schemas.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

/// Assembled OpenAPI spec for the entire API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "s3ep — S3 Encryption Proxy",
        version = env!("CARGO_PKG_VERSION"),
        description = "Transparent client-side envelope/streaming encryption proxy for an S3-compatible backend. Terminates SigV4 from clients, re-signs outbound requests to the upstream bucket, and encrypts/decrypts object bodies in flight.",
        license(name = "Apache-2.0")
    ),
    paths(
        crate::routes::health::health,
        crate::routes::health::version,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "health", description = "Unauthenticated liveness/readiness and version reporting"),
    )
)]
pub struct ApiDoc;

/// Build the OpenAPI router.
///
/// Serves the OpenAPI JSON spec at `/openapi.json`.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json — Return the generated OpenAPI specification.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generates_successfully() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "s3ep — S3 Encryption Proxy");
        assert_eq!(spec.info.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_openapi_spec_has_paths() {
        let spec = ApiDoc::openapi();
        assert!(
            !spec.paths.paths.is_empty(),
            "OpenAPI spec should contain at least one path"
        );
    }

    #[test]
    fn test_openapi_spec_has_health_paths() {
        let spec = ApiDoc::openapi();
        assert!(spec.paths.paths.contains_key("/health"));
        assert!(spec.paths.paths.contains_key("/version"));
    }

    #[test]
    fn test_openapi_spec_has_health_tag() {
        let spec = ApiDoc::openapi();
        let tags = spec.tags.expect("tags present");
        assert!(tags.iter().any(|t| t.name == "health"));
    }

    #[test]
    fn test_openapi_spec_has_error_schemas() {
        let spec = ApiDoc::openapi();
        let components = spec.components.expect("components present");
        assert!(components.schemas.contains_key("ErrorBody"));
        assert!(components.schemas.contains_key("ErrorDetail"));
    }

    #[test]
    fn test_openapi_spec_has_no_old_domain_paths() {
        let spec = ApiDoc::openapi();
        assert!(!spec.paths.paths.contains_key("/v1/entities"));
        assert!(!spec.paths.paths.contains_key("/v1/corridors"));
    }

    #[tokio::test]
    async fn test_openapi_json_handler_returns_spec() {
        let Json(spec) = openapi_json().await;
        assert_eq!(spec.info.title, "s3ep — S3 Encryption Proxy");
    }
}
