//! # s3ep-crypto — envelope encryption primitives for the S3 proxy
//!
//! - [`provider`] — the [`KekProvider`](provider::KekProvider) trait
//!   (C1) and its `aes`/`rsa`/`none` implementations under
//!   [`providers`].
//! - [`registry`] — the provider registry (C2): alias-indexed for
//!   writes, fingerprint-indexed for reads.
//! - [`dek`] — per-object data-encryption key generation and
//!   zeroization (C4).
//! - [`envelope_cipher`] — single-shot AES-256-GCM payload cipher (C5).
//! - [`streaming_cipher`] — segment-aligned AES-256-CTR with optional
//!   HMAC-SHA256 integrity (C6).

pub mod dek;
pub mod envelope_cipher;
pub mod error;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod streaming_cipher;

pub use dek::Dek;
pub use envelope_cipher::EnvelopeCiphertext;
pub use error::CryptoError;
pub use provider::{KekProvider, WrappedDek};
pub use registry::ProviderRegistry;
pub use streaming_cipher::{IntegrityHasher, StreamingCipher};
