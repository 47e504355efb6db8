//! # s3ep-cli — CLI for the S3 encryption proxy
//!
//! Provides the `s3ep` command-line interface.
//!
//! ## Subcommands
//!
//! - `s3ep serve` — Load a config file and run the proxy.
//! - `s3ep validate-config` — Parse and validate a config file without
//!   starting the server.
//! - `s3ep fingerprint` — Print the fingerprint of every configured
//!   encryption provider, to confirm which one a stored object's
//!   `kek-fingerprint` metadata resolves to.

pub mod fingerprint;
pub mod serve;
pub mod validate_config;
