//! API route modules: the S3 REST surface this proxy terminates.
//!
//! - [`health`] — unauthenticated `/health` and `/version`.
//! - [`object`] — single-shot object operations (PUT/GET/HEAD/DELETE).
//! - [`multipart`] — the multipart-upload quartet.

pub mod health;
pub mod multipart;
pub mod object;
