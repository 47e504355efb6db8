//! Single-shot object operations: PUT/GET/HEAD/DELETE `/{bucket}/{key}`.
//!
//! Drives the full encrypt-on-write / decrypt-on-read pipeline: mode
//! selection (C7), envelope or streaming cipher (C5/C6/C8/C9), metadata
//! codec (C3), and provider resolution (C1/C2).

use std::collections::BTreeMap;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http_body_util::BodyExt;

use s3ep_core::metadata::{EnvelopeMetadata, MetadataCodec};
use s3ep_crypto::{envelope_cipher, Dek};

use crate::backend::BackendClient;
use crate::error::ProxyError;
use crate::pipeline::downloader::StreamingDownload;
use crate::pipeline::selector::{self, UploadMode, FORCE_AES_CTR_CONTENT_TYPE, FORCE_AES_GCM_CONTENT_TYPE};
use crate::pipeline::uploader::{self, SegmentSource};
use crate::state::AppState;

const META_PREFIX: &str = "x-amz-meta-";
/// Client metadata key the proxy preserves the client's intended
/// content-type under when a force-cipher sentinel (see
/// [`selector::FORCE_AES_GCM_CONTENT_TYPE`]) has overwritten the
/// `Content-Type` header itself. See SPEC_FULL.md open-question
/// resolution: the sentinel value is diagnostic only, the client's
/// actual content-type isn't recoverable once overwritten, so this just
/// records what was seen.
const ORIGINAL_CONTENT_TYPE_KEY: &str = "original-content-type";

fn client_metadata_from_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for (name, value) in headers {
        if let Some(key) = name.as_str().strip_prefix(META_PREFIX) {
            if let Ok(v) = value.to_str() {
                out.insert(key.to_string(), v.to_string());
            }
        }
    }
    out
}

fn backend_metadata_from_response(response: &reqwest::Response) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for (name, value) in response.headers() {
        if let Some(key) = name.as_str().strip_prefix(META_PREFIX) {
            if let Ok(v) = value.to_str() {
                out.insert(key.to_string(), v.to_string());
            }
        }
    }
    out
}

fn b64_decode(value: &str) -> Result<Vec<u8>, ProxyError> {
    base64::Engine::decode(&base64::engine::general_purpose::STANDARD, value)
        .map_err(|e| ProxyError::InternalError(format!("malformed base64 envelope field: {e}")))
}

fn b64_encode(bytes: impl AsRef<[u8]>) -> String {
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes)
}

/// Wraps an axum request body as a [`SegmentSource`] for the streaming
/// uploader, buffering only one segment at a time.
struct BodySegmentSource {
    body: Body,
    done: bool,
}

#[async_trait::async_trait]
impl SegmentSource for BodySegmentSource {
    async fn read_segment(&mut self, max_len: usize) -> Result<Bytes, ProxyError> {
        if self.done {
            return Ok(Bytes::new());
        }
        let mut buf = Vec::with_capacity(max_len.min(1024 * 1024));
        while buf.len() < max_len {
            let frame = self
                .body
                .frame()
                .await
                .transpose()
                .map_err(|e| ProxyError::InvalidRequest(format!("error reading request body: {e}")))?;
            let Some(frame) = frame else {
                self.done = true;
                break;
            };
            let Some(data) = frame.into_data().ok() else {
                continue;
            };
            buf.extend_from_slice(&data);
        }
        Ok(Bytes::from(buf))
    }
}

pub async fn put_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
    request: axum::extract::Request,
) -> Result<Response, ProxyError> {
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let content_length = headers
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let mut client_metadata = client_metadata_from_headers(&headers);
    if let Some(ct) = &content_type {
        if ct.eq_ignore_ascii_case(FORCE_AES_GCM_CONTENT_TYPE) || ct.eq_ignore_ascii_case(FORCE_AES_CTR_CONTENT_TYPE) {
            client_metadata.insert(ORIGINAL_CONTENT_TYPE_KEY.to_string(), ct.clone());
        }
    }

    let mode = selector::select_upload_mode(
        content_type.as_deref(),
        content_length,
        state.config.optimizations.streaming_segment_size,
    );

    let provider = state.registry.active();
    let prefix = state.config.metadata_prefix();
    let integrity_enabled = state.config.encryption.integrity_verification;

    if provider.kind() == "none" {
        // Pass-through: store the body unmodified and attach no envelope
        // metadata at all, per the identity-transfer invariant.
        let body = request
            .into_body()
            .collect()
            .await
            .map_err(|e| ProxyError::InvalidRequest(format!("error reading request body: {e}")))?
            .to_bytes();
        state
            .backend
            .put_object(&bucket, &key, &client_metadata, body)
            .await?;
        return Ok(StatusCode::OK.into_response());
    }

    match mode {
        UploadMode::Envelope => {
            let body = request
                .into_body()
                .collect()
                .await
                .map_err(|e| ProxyError::InvalidRequest(format!("error reading request body: {e}")))?
                .to_bytes();

            let dek = Dek::generate()?;
            let wrapped = provider.wrap_dek(&dek)?;
            let encrypted = envelope_cipher::encrypt(&dek, &body)?;

            let mut envelope = EnvelopeMetadata {
                encrypted_dek: b64_encode(&wrapped.ciphertext),
                kek_algorithm: provider.algorithm_label().to_string(),
                kek_fingerprint: provider.fingerprint().to_string(),
                dek_algorithm: None,
                aes_iv: Some(b64_encode(encrypted.nonce)),
                integrity_tag: None,
                upload_id: None,
            };
            if !wrapped.iv.is_empty() {
                client_metadata.insert("kek-wrap-iv".to_string(), b64_encode(&wrapped.iv));
            }
            if integrity_enabled {
                let mut hasher = s3ep_crypto::IntegrityHasher::new(&dek)?;
                hasher.update(&encrypted.ciphertext);
                envelope.integrity_tag = Some(b64_encode(hasher.finalize()));
            }

            let codec = MetadataCodec::new(prefix);
            let metadata = codec
                .serialize(&envelope, &client_metadata)
                .map_err(|e| ProxyError::InvalidRequest(e.to_string()))?;

            state
                .backend
                .put_object(&bucket, &key, &metadata, Bytes::from(encrypted.ciphertext))
                .await?;

            Ok(StatusCode::OK.into_response())
        }
        UploadMode::Streaming => {
            let dek = Dek::generate()?;
            let wrapped = provider.wrap_dek(&dek)?;
            if !wrapped.iv.is_empty() {
                client_metadata.insert("kek-wrap-iv".to_string(), b64_encode(&wrapped.iv));
            }
            let encrypted_dek = b64_encode(&wrapped.ciphertext);

            let mut source = BodySegmentSource {
                body: request.into_body(),
                done: false,
            };

            let outcome = uploader::upload_streaming(
                &state.backend,
                &bucket,
                &key,
                &dek,
                &encrypted_dek,
                provider.fingerprint(),
                provider.algorithm_label(),
                integrity_enabled,
                state.config.optimizations.streaming_segment_size,
                &client_metadata,
                prefix,
                &mut source,
            )
            .await?;

            if outcome.upload_id.is_none() {
                // Short read: nothing was ever sent as a part. Fall back
                // to an empty envelope PutObject rather than leaving no
                // object behind at all.
                let encrypted = envelope_cipher::encrypt(&dek, &[])?;
                let envelope = EnvelopeMetadata {
                    encrypted_dek,
                    kek_algorithm: provider.algorithm_label().to_string(),
                    kek_fingerprint: provider.fingerprint().to_string(),
                    dek_algorithm: None,
                    aes_iv: Some(b64_encode(encrypted.nonce)),
                    integrity_tag: None,
                    upload_id: None,
                };
                let codec = MetadataCodec::new(prefix);
                let metadata = codec
                    .serialize(&envelope, &client_metadata)
                    .map_err(|e| ProxyError::InvalidRequest(e.to_string()))?;
                state
                    .backend
                    .put_object(&bucket, &key, &metadata, Bytes::from(encrypted.ciphertext))
                    .await?;
            }

            Ok(StatusCode::OK.into_response())
        }
    }
}

async fn resolve_object(
    state: &AppState,
    response: reqwest::Response,
) -> Result<(Option<EnvelopeMetadata>, BTreeMap<String, String>, Vec<u8>), ProxyError> {
    let raw_metadata = backend_metadata_from_response(&response);
    let ciphertext = response
        .bytes()
        .await
        .map_err(|e| ProxyError::InternalError(format!("reading backend object body: {e}")))?
        .to_vec();

    let codec = MetadataCodec::new(state.config.metadata_prefix());
    let (envelope, client_metadata) = codec
        .parse(&raw_metadata)
        .map_err(|e| ProxyError::InternalError(e.to_string()))?;
    Ok((envelope, client_metadata, ciphertext))
}

async fn decrypt_object(
    state: &AppState,
    envelope: &EnvelopeMetadata,
    client_metadata: &BTreeMap<String, String>,
    ciphertext: Vec<u8>,
) -> Result<Vec<u8>, ProxyError> {
    let wrap_ciphertext = b64_decode(&envelope.encrypted_dek)?;
    let provider = state.registry.by_fingerprint(&envelope.kek_fingerprint)?;
    // The KEK-wrap IV travels alongside client metadata under a
    // non-reserved key rather than a dedicated envelope field, since
    // not every provider needs one (the `none`/`rsa` providers don't).
    let wrap_iv: Vec<u8> = match client_metadata.get("kek-wrap-iv") {
        Some(iv_b64) => b64_decode(iv_b64)?,
        None => Vec::new(),
    };
    let dek = provider.unwrap_dek(&wrap_ciphertext, &wrap_iv)?;

    if envelope.is_streaming() {
        let iv_b64 = envelope
            .aes_iv
            .as_deref()
            .ok_or_else(|| ProxyError::InternalError("streaming object missing aes-iv".to_string()))?;
        let iv_bytes = b64_decode(iv_b64)?;
        let mut iv = [0u8; 8];
        let n = iv_bytes.len().min(8);
        iv[..n].copy_from_slice(&iv_bytes[..n]);

        let expected_tag: Option<[u8; 32]> = match &envelope.integrity_tag {
            Some(tag_b64) => {
                let bytes = b64_decode(tag_b64)?;
                let mut tag = [0u8; 32];
                if bytes.len() != 32 {
                    return Err(ProxyError::IntegrityFailed);
                }
                tag.copy_from_slice(&bytes);
                Some(tag)
            }
            None => None,
        };

        let mut download = StreamingDownload::new(
            &dek,
            &iv,
            state.config.optimizations.streaming_segment_size,
            expected_tag,
        )?;
        let mut plaintext = ciphertext;
        download.decrypt_chunk(&mut plaintext)?;
        download.finish()?;
        Ok(plaintext)
    } else {
        let iv_b64 = envelope
            .aes_iv
            .as_deref()
            .ok_or_else(|| ProxyError::InternalError("envelope object missing aes-iv".to_string()))?;
        let nonce = b64_decode(iv_b64)?;
        let plaintext = envelope_cipher::decrypt(&dek, &ciphertext, &nonce)?;
        Ok(plaintext)
    }
}

pub async fn get_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ProxyError> {
    if headers.contains_key("range") {
        // Range reads over a streaming-encrypted object would require
        // segment-aligned partial decryption; not supported yet.
        return Err(ProxyError::NotImplemented("Range requests".to_string()));
    }

    let response = state.backend.get_object(&bucket, &key).await?;
    let (envelope, client_metadata, ciphertext) = resolve_object(&state, response).await?;

    let plaintext = match &envelope {
        Some(envelope) => decrypt_object(&state, envelope, &client_metadata, ciphertext).await?,
        None => ciphertext,
    };

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        "content-length",
        HeaderValue::from_str(&plaintext.len().to_string()).unwrap(),
    );
    for (k, v) in &client_metadata {
        if k == ORIGINAL_CONTENT_TYPE_KEY || k == "kek-wrap-iv" {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            axum::http::HeaderName::from_bytes(format!("{META_PREFIX}{k}").as_bytes()),
            HeaderValue::from_str(v),
        ) {
            response_headers.insert(name, value);
        }
    }

    Ok((StatusCode::OK, response_headers, Bytes::from(plaintext)).into_response())
}

pub async fn head_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, ProxyError> {
    let response = state.backend.head_object(&bucket, &key).await?;
    let raw_metadata = backend_metadata_from_response(&response);
    let ciphertext_len: u64 = response
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let codec = MetadataCodec::new(state.config.metadata_prefix());
    let (envelope, _) = codec
        .parse(&raw_metadata)
        .map_err(|e| ProxyError::InternalError(e.to_string()))?;

    let plaintext_len = match &envelope {
        None => ciphertext_len,
        Some(envelope) if envelope.is_streaming() => {
            // CTR mode: ciphertext length equals plaintext length.
            ciphertext_len
        }
        Some(_) => ciphertext_len.saturating_sub(16), // envelope AES-GCM tag
    };

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        "content-length",
        HeaderValue::from_str(&plaintext_len.to_string()).unwrap(),
    );
    Ok((StatusCode::OK, response_headers).into_response())
}

pub async fn delete_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, ProxyError> {
    state.backend.delete_object(&bucket, &key).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_metadata_from_headers_strips_prefix() {
        let mut headers = HeaderMap::new();
        headers.insert("x-amz-meta-app", HeaderValue::from_static("demo"));
        headers.insert("content-type", HeaderValue::from_static("text/plain"));
        let metadata = client_metadata_from_headers(&headers);
        assert_eq!(metadata.get("app").unwrap(), "demo");
        assert_eq!(metadata.len(), 1);
    }

    #[test]
    fn b64_round_trips() {
        let encoded = b64_encode(b"hello");
        assert_eq!(b64_decode(&encoded).unwrap(), b"hello");
    }
}
