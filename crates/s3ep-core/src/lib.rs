//! # s3ep-core — shared types for the S3 encryption proxy
//!
//! Configuration loading and validation, the envelope metadata codec
//! (C3), and the client credential table. Crypto providers and cipher
//! implementations live in `s3ep-crypto`; the HTTP service lives in
//! `s3ep-api`. This crate has no network or async dependency — it's pure
//! data modeling plus validation, shared by both.

pub mod config;
pub mod credential;
pub mod error;
pub mod metadata;

pub use config::Config;
pub use credential::{ClientCredential, CredentialTable};
pub use error::ConfigError;
pub use metadata::{EnvelopeMetadata, MetadataCodec, MetadataError};
