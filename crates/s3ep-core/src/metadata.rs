//! Envelope metadata codec (C3).
//!
//! Serializes the fixed set of envelope fields into a prefixed,
//! HTTP-header-safe namespace and parses them back out of a backend
//! object's user metadata. Client-supplied metadata that doesn't match
//! the prefix round-trips unchanged; metadata that collides with a
//! reserved field after prefixing is rejected at upload time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default envelope metadata key prefix. See SPEC_FULL.md open-question
/// resolution: `s3ep-` is the only prefix ever written; `x-s3ep-` is
/// accepted on parse for backward compatibility but never emitted.
pub const DEFAULT_PREFIX: &str = "s3ep-";

/// Legacy prefix accepted on read only.
const LEGACY_PREFIX: &str = "x-s3ep-";

const FIELD_ENCRYPTED_DEK: &str = "encrypted-dek";
const FIELD_KEK_ALGORITHM: &str = "kek-algorithm";
const FIELD_KEK_FINGERPRINT: &str = "kek-fingerprint";
const FIELD_DEK_ALGORITHM: &str = "dek-algorithm";
const FIELD_AES_IV: &str = "aes-iv";
const FIELD_INTEGRITY_TAG: &str = "integrity-tag";
const FIELD_UPLOAD_ID: &str = "upload-id";

/// All reserved (unprefixed) field names, for collision detection.
const RESERVED_FIELDS: &[&str] = &[
    FIELD_ENCRYPTED_DEK,
    FIELD_KEK_ALGORITHM,
    FIELD_KEK_FINGERPRINT,
    FIELD_DEK_ALGORITHM,
    FIELD_AES_IV,
    FIELD_INTEGRITY_TAG,
    FIELD_UPLOAD_ID,
];

/// The label stored in `dek-algorithm` for streaming-mode objects.
/// Its presence (vs. absence) is what distinguishes streaming from
/// envelope on read.
pub const DEK_ALGORITHM_STREAMING: &str = "aes-256-ctr";

/// The fixed envelope metadata fields attached to every encrypted object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeMetadata {
    /// base64 of the KEK-wrapped DEK.
    pub encrypted_dek: String,
    /// Label of the KEK wrap algorithm, e.g. `aes-gcm-256`, `rsa-oaep-sha256`, `none`.
    pub kek_algorithm: String,
    /// Provider fingerprint required to unwrap the DEK.
    pub kek_fingerprint: String,
    /// Present only for streaming-mode objects (value is always
    /// [`DEK_ALGORITHM_STREAMING`]); absent means envelope AES-GCM.
    pub dek_algorithm: Option<String>,
    /// base64 IV/nonce. Envelope objects always carry one; streaming
    /// objects carry the 8-byte segment IV base64-encoded.
    pub aes_iv: Option<String>,
    /// base64 HMAC-SHA256 over ciphertext, present only when integrity
    /// verification is enabled.
    pub integrity_tag: Option<String>,
    /// Backend multipart upload id, present only for streaming objects
    /// (opaque to clients, useful for diagnosing aborted uploads).
    pub upload_id: Option<String>,
}

impl EnvelopeMetadata {
    /// Whether this metadata describes a streaming (AES-CTR) object.
    pub fn is_streaming(&self) -> bool {
        self.dek_algorithm.as_deref() == Some(DEK_ALGORITHM_STREAMING)
    }
}

/// Errors from serializing or parsing envelope metadata.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MetadataError {
    #[error("client metadata key {0:?} collides with a reserved envelope field")]
    ReservedKeyCollision(String),

    #[error("missing required envelope field: {0}")]
    MissingField(&'static str),

    #[error("envelope field {field} has invalid value: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Serializes/parses [`EnvelopeMetadata`] into a prefixed key namespace,
/// merging with and separating out client-supplied metadata.
#[derive(Debug, Clone)]
pub struct MetadataCodec {
    prefix: String,
}

impl MetadataCodec {
    /// Construct a codec with the given prefix (empty string permitted).
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Construct a codec using the canonical default prefix.
    pub fn default_prefix() -> Self {
        Self::new(DEFAULT_PREFIX)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn key(&self, field: &str) -> String {
        format!("{}{field}", self.prefix)
    }

    /// Merge envelope fields and client metadata into a single map keyed
    /// the way the backend expects (already includes the prefix).
    ///
    /// Fails if any client metadata key, once lower-cased, equals a
    /// reserved prefixed key.
    pub fn serialize(
        &self,
        envelope: &EnvelopeMetadata,
        client_metadata: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, String>, MetadataError> {
        for key in client_metadata.keys() {
            let lower = key.to_ascii_lowercase();
            for reserved in RESERVED_FIELDS {
                if lower == self.key(reserved) {
                    return Err(MetadataError::ReservedKeyCollision(key.clone()));
                }
            }
        }

        let mut out = client_metadata.clone();
        out.insert(self.key(FIELD_ENCRYPTED_DEK), envelope.encrypted_dek.clone());
        out.insert(self.key(FIELD_KEK_ALGORITHM), envelope.kek_algorithm.clone());
        out.insert(
            self.key(FIELD_KEK_FINGERPRINT),
            envelope.kek_fingerprint.clone(),
        );
        if let Some(dek_algorithm) = &envelope.dek_algorithm {
            out.insert(self.key(FIELD_DEK_ALGORITHM), dek_algorithm.clone());
        }
        if let Some(iv) = &envelope.aes_iv {
            out.insert(self.key(FIELD_AES_IV), iv.clone());
        }
        if let Some(tag) = &envelope.integrity_tag {
            out.insert(self.key(FIELD_INTEGRITY_TAG), tag.clone());
        }
        if let Some(upload_id) = &envelope.upload_id {
            out.insert(self.key(FIELD_UPLOAD_ID), upload_id.clone());
        }
        Ok(out)
    }

    /// Split backend object metadata into parsed envelope fields (if
    /// present) and the remaining client metadata. An object with no
    /// envelope fields at all returns `Ok((None, client_metadata))` —
    /// that's the `none`-provider pass-through case.
    pub fn parse(
        &self,
        raw: &BTreeMap<String, String>,
    ) -> Result<(Option<EnvelopeMetadata>, BTreeMap<String, String>), MetadataError> {
        let mut fields: BTreeMap<&'static str, String> = BTreeMap::new();
        let mut client_metadata = BTreeMap::new();

        'outer: for (key, value) in raw {
            let lower = key.to_ascii_lowercase();
            for reserved in RESERVED_FIELDS {
                if lower == self.key(reserved) || lower == format!("{LEGACY_PREFIX}{reserved}") {
                    fields.insert(reserved, value.clone());
                    continue 'outer;
                }
            }
            client_metadata.insert(key.clone(), value.clone());
        }

        if fields.is_empty() {
            return Ok((None, client_metadata));
        }

        let encrypted_dek = fields
            .remove(FIELD_ENCRYPTED_DEK)
            .ok_or(MetadataError::MissingField(FIELD_ENCRYPTED_DEK))?;
        let kek_algorithm = fields
            .remove(FIELD_KEK_ALGORITHM)
            .ok_or(MetadataError::MissingField(FIELD_KEK_ALGORITHM))?;
        let kek_fingerprint = fields
            .remove(FIELD_KEK_FINGERPRINT)
            .ok_or(MetadataError::MissingField(FIELD_KEK_FINGERPRINT))?;
        let dek_algorithm = fields.remove(FIELD_DEK_ALGORITHM);
        let aes_iv = fields.remove(FIELD_AES_IV);
        let integrity_tag = fields.remove(FIELD_INTEGRITY_TAG);
        let upload_id = fields.remove(FIELD_UPLOAD_ID);

        let is_streaming = dek_algorithm.as_deref() == Some(DEK_ALGORITHM_STREAMING);
        if !is_streaming && aes_iv.is_none() {
            return Err(MetadataError::MissingField(FIELD_AES_IV));
        }

        Ok((
            Some(EnvelopeMetadata {
                encrypted_dek,
                kek_algorithm,
                kek_fingerprint,
                dek_algorithm,
                aes_iv,
                integrity_tag,
                upload_id,
            }),
            client_metadata,
        ))
    }

    /// Strip all envelope-prefixed keys from a response metadata map.
    /// Used on every GET/HEAD response so clients never observe envelope
    /// fields — the "clean-on-response" invariant from SPEC_FULL §4.3.
    ///
    /// With a non-empty prefix, any key under that prefix (or the legacy
    /// prefix) is stripped. With the empty prefix (SPEC_FULL §6 permits
    /// it), `starts_with("")` would match every key, so that case strips
    /// only the reserved field names themselves.
    pub fn strip(&self, raw: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        raw.iter()
            .filter(|(k, _)| {
                let lower = k.to_ascii_lowercase();
                if self.prefix.is_empty() {
                    !RESERVED_FIELDS.iter().any(|field| lower == *field)
                } else {
                    !lower.starts_with(&self.prefix) && !lower.starts_with(LEGACY_PREFIX)
                }
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_envelope() -> EnvelopeMetadata {
        EnvelopeMetadata {
            encrypted_dek: "d2VjcnlwdA==".to_string(),
            kek_algorithm: "aes-gcm-256".to_string(),
            kek_fingerprint: "abcd1234".to_string(),
            dek_algorithm: None,
            aes_iv: Some("aXY=".to_string()),
            integrity_tag: None,
            upload_id: None,
        }
    }

    #[test]
    fn serialize_uses_default_prefix() {
        let codec = MetadataCodec::default_prefix();
        let out = codec
            .serialize(&sample_envelope(), &BTreeMap::new())
            .unwrap();
        assert_eq!(out.get("s3ep-kek-algorithm").unwrap(), "aes-gcm-256");
        assert_eq!(out.get("s3ep-kek-fingerprint").unwrap(), "abcd1234");
        assert!(!out.contains_key("s3ep-dek-algorithm"));
    }

    #[test]
    fn serialize_streaming_includes_dek_algorithm() {
        let codec = MetadataCodec::default_prefix();
        let mut env = sample_envelope();
        env.dek_algorithm = Some(DEK_ALGORITHM_STREAMING.to_string());
        env.upload_id = Some("upload-123".to_string());
        let out = codec.serialize(&env, &BTreeMap::new()).unwrap();
        assert_eq!(out.get("s3ep-dek-algorithm").unwrap(), DEK_ALGORITHM_STREAMING);
        assert_eq!(out.get("s3ep-upload-id").unwrap(), "upload-123");
    }

    #[test]
    fn serialize_merges_client_metadata() {
        let codec = MetadataCodec::default_prefix();
        let mut client = BTreeMap::new();
        client.insert("app".to_string(), "demo".to_string());
        let out = codec.serialize(&sample_envelope(), &client).unwrap();
        assert_eq!(out.get("app").unwrap(), "demo");
        assert_eq!(out.len(), 5); // 4 envelope fields + 1 client field
    }

    #[test]
    fn serialize_rejects_reserved_collision() {
        let codec = MetadataCodec::default_prefix();
        let mut client = BTreeMap::new();
        client.insert("s3ep-kek-algorithm".to_string(), "evil".to_string());
        let err = codec.serialize(&sample_envelope(), &client).unwrap_err();
        assert!(matches!(err, MetadataError::ReservedKeyCollision(_)));
    }

    #[test]
    fn parse_round_trips_serialize() {
        let codec = MetadataCodec::default_prefix();
        let mut client = BTreeMap::new();
        client.insert("app".to_string(), "demo".to_string());
        let envelope = sample_envelope();
        let raw = codec.serialize(&envelope, &client).unwrap();

        let (parsed, remaining_client) = codec.parse(&raw).unwrap();
        assert_eq!(parsed.unwrap(), envelope);
        assert_eq!(remaining_client.get("app").unwrap(), "demo");
    }

    #[test]
    fn parse_empty_is_none_pass_through() {
        let codec = MetadataCodec::default_prefix();
        let mut client = BTreeMap::new();
        client.insert("app".to_string(), "demo".to_string());
        let (parsed, remaining) = codec.parse(&client).unwrap();
        assert!(parsed.is_none());
        assert_eq!(remaining.get("app").unwrap(), "demo");
    }

    #[test]
    fn parse_accepts_legacy_prefix_read_only() {
        let codec = MetadataCodec::default_prefix();
        let mut raw = BTreeMap::new();
        raw.insert("x-s3ep-encrypted-dek".to_string(), "ZGVr".to_string());
        raw.insert("x-s3ep-kek-algorithm".to_string(), "aes-gcm-256".to_string());
        raw.insert("x-s3ep-kek-fingerprint".to_string(), "fp".to_string());
        raw.insert("x-s3ep-aes-iv".to_string(), "aXY=".to_string());
        let (parsed, _) = codec.parse(&raw).unwrap();
        assert!(parsed.is_some());
    }

    #[test]
    fn parse_missing_required_field_errors() {
        let codec = MetadataCodec::default_prefix();
        let mut raw = BTreeMap::new();
        raw.insert("s3ep-kek-algorithm".to_string(), "aes-gcm-256".to_string());
        let err = codec.parse(&raw).unwrap_err();
        assert!(matches!(err, MetadataError::MissingField(_)));
    }

    #[test]
    fn strip_removes_prefixed_keys() {
        let codec = MetadataCodec::default_prefix();
        let out = codec
            .serialize(&sample_envelope(), &BTreeMap::new())
            .unwrap();
        let cleaned = codec.strip(&out);
        assert!(cleaned.is_empty());
    }

    #[test]
    fn strip_preserves_client_metadata() {
        let codec = MetadataCodec::default_prefix();
        let mut client = BTreeMap::new();
        client.insert("app".to_string(), "demo".to_string());
        let out = codec.serialize(&sample_envelope(), &client).unwrap();
        let cleaned = codec.strip(&out);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned.get("app").unwrap(), "demo");
    }

    #[test]
    fn is_streaming_detection() {
        let mut env = sample_envelope();
        assert!(!env.is_streaming());
        env.dek_algorithm = Some(DEK_ALGORITHM_STREAMING.to_string());
        assert!(env.is_streaming());
    }

    #[test]
    fn empty_prefix_round_trips() {
        let codec = MetadataCodec::new("");
        let out = codec
            .serialize(&sample_envelope(), &BTreeMap::new())
            .unwrap();
        assert!(out.contains_key("kek-algorithm"));
        let (parsed, _) = codec.parse(&out).unwrap();
        assert!(parsed.is_some());
    }

    #[test]
    fn empty_prefix_strip_preserves_client_metadata() {
        let codec = MetadataCodec::new("");
        let mut client = BTreeMap::new();
        client.insert("app".to_string(), "demo".to_string());
        let out = codec.serialize(&sample_envelope(), &client).unwrap();
        let cleaned = codec.strip(&out);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned.get("app").unwrap(), "demo");
    }

    #[test]
    fn empty_prefix_strip_removes_reserved_fields_only() {
        let codec = MetadataCodec::new("");
        let out = codec
            .serialize(&sample_envelope(), &BTreeMap::new())
            .unwrap();
        let cleaned = codec.strip(&out);
        assert!(cleaned.is_empty());
    }
}
