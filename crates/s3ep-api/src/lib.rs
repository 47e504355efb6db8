//! # s3ep-api — Axum API services for the S3 encryption proxy
//!
//! Terminates the client-facing S3 REST surface, authenticates each
//! request via SigV4 (C10), drives envelope/streaming encryption on
//! writes and decryption on reads, and re-signs the resulting request
//! against the upstream S3-compatible backend.
//!
//! ## API Surface
//!
//! | Path                              | Module             | Purpose                        |
//! |------------------------------------|---------------------|---------------------------------|
//! | `/health`, `/version`              | [`routes::health`]  | Unauthenticated liveness/version |
//! | `/metrics`                         | [`lib`]             | Prometheus scrape endpoint      |
//! | `/openapi.json`                    | [`openapi`]         | Generated OpenAPI document      |
//! | `/:bucket/:key`                  | [`routes::object`]  | PUT/GET/HEAD/DELETE object      |
//! | `/:bucket/:key?uploads` etc.     | [`routes::multipart`] | Client-driven multipart quartet |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → AuthMiddleware → RateLimitMiddleware → Handler
//! ```
//!
//! Auth runs before rate limiting so unauthenticated requests are
//! rejected without consuming rate-limit quota.
//!
//! ## OpenAPI
//!
//! Generated OpenAPI spec via `utoipa` derive macros, served at
//! `/openapi.json` — see [`openapi`].

pub mod backend;
pub mod error;
pub mod middleware;
pub mod multipart_session;
pub mod openapi;
pub mod pipeline;
pub mod routes;
pub mod sigv4;
pub mod state;

use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::StatusCode;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::{Extension, Router};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::routes::{health, multipart, object};
use crate::state::AppState;

/// Dispatch query string for the object path: a bare `PUT`/`POST`/`DELETE`
/// against `/:bucket/:key` is a single-shot object operation; the same
/// verbs carrying `uploads`/`partNumber`+`uploadId`/`uploadId` are one of
/// the client-driven multipart quartet (SPEC_FULL §6). Axum dispatches on
/// method + path alone, so the query string is inspected inside each of
/// these three entry points rather than via separate routes.
#[derive(Deserialize, Default)]
struct MultipartDispatchQuery {
    uploads: Option<String>,
    #[serde(rename = "partNumber")]
    part_number: Option<u32>,
    #[serde(rename = "uploadId")]
    upload_id: Option<String>,
}

async fn put_dispatch(
    state: State<AppState>,
    path: axum::extract::Path<(String, String)>,
    Query(query): Query<MultipartDispatchQuery>,
    request: axum::extract::Request,
) -> Result<axum::response::Response, crate::error::ProxyError> {
    if query.part_number.is_some() && query.upload_id.is_some() {
        let upload_id = query.upload_id.unwrap();
        let part_number = query.part_number.unwrap();
        return multipart::upload_part(
            state,
            path,
            axum::extract::Query(multipart::PartQuery {
                part_number,
                upload_id,
            }),
            request,
        )
        .await;
    }
    let headers = request.headers().clone();
    object::put_object(state, path, headers, request).await
}

async fn post_dispatch(
    state: State<AppState>,
    path: axum::extract::Path<(String, String)>,
    Query(query): Query<MultipartDispatchQuery>,
    headers: axum::http::HeaderMap,
    request: axum::extract::Request,
) -> Result<axum::response::Response, crate::error::ProxyError> {
    if query.uploads.is_some() {
        return multipart::create_multipart_upload(state, path, headers).await;
    }
    if let Some(upload_id) = query.upload_id {
        return multipart::complete_multipart_upload(
            state,
            path,
            axum::extract::Query(multipart::UploadIdQuery { upload_id }),
            request,
        )
        .await;
    }
    Err(crate::error::ProxyError::InvalidRequest(
        "POST requires ?uploads or ?uploadId".to_string(),
    ))
}

async fn delete_dispatch(
    state: State<AppState>,
    path: axum::extract::Path<(String, String)>,
    Query(query): Query<MultipartDispatchQuery>,
) -> Result<axum::response::Response, crate::error::ProxyError> {
    if let Some(upload_id) = query.upload_id {
        return multipart::abort_multipart_upload(
            state,
            path,
            axum::extract::Query(multipart::UploadIdQuery { upload_id }),
        )
        .await;
    }
    object::delete_object(state, path).await
}

/// Assemble the full application router with all routes and middleware.
///
/// `/health`, `/version`, `/metrics`, and `/openapi.json` are mounted
/// outside the auth middleware so they remain reachable without SigV4
/// credentials.
pub fn app(state: AppState) -> Router {
    let metrics = state.metrics.clone();

    // Body size limit: 5 GiB, matching the largest single PUT this proxy
    // will accept before the client is expected to use the multipart
    // quartet instead (SPEC_FULL §4.7's streaming-segment-size ceiling).
    let api = Router::new()
        .route(
            "/:bucket/:key",
            put(put_dispatch)
                .get(object::get_object)
                .head(object::head_object)
                .post(post_dispatch)
                .delete(delete_dispatch),
        )
        .layer(DefaultBodyLimit::max(5 * 1024 * 1024 * 1024))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit_middleware,
        ))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ))
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(metrics))
        .with_state(state.clone());

    let unauthenticated = Router::new()
        .route("/health", get(health::health))
        .route("/version", get(health::version))
        .route("/metrics", get(metrics_handler))
        .merge(openapi::router())
        .with_state(state);

    Router::new().merge(unauthenticated).merge(api)
}

/// GET /metrics — Prometheus text-format scrape endpoint.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.gather_and_encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "failed to encode Prometheus metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
