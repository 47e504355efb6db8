//! Tower/Axum middleware stack:
//! - [`auth`]: SigV4 request authentication (C10).
//! - [`rate_limit`]: per-IP request throttling.
//! - [`metrics`]: Prometheus-compatible request metrics.
//!
//! Request tracing uses `tower_http::trace::TraceLayer` directly in
//! `lib.rs::app()` rather than a dedicated module.

pub mod auth;
pub mod metrics;
pub mod rate_limit;
