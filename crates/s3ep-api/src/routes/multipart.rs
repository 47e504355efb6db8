//! The raw multipart-upload quartet (SPEC_FULL §6): `POST ?uploads`,
//! `PUT ?partNumber&uploadId`, `POST ?uploadId` (complete), `DELETE
//! ?uploadId` (abort).
//!
//! Distinct from [`crate::pipeline::uploader`], which the proxy drives
//! internally for a single large `PUT`: this module exists for clients
//! that chunk a large object themselves and issue the S3 multipart
//! verbs directly. Each call here is a separate HTTP request, so the
//! per-upload DEK and streaming IV are held in
//! [`crate::multipart_session::MultipartSessionStore`] between calls —
//! generated at `CreateMultipartUpload`, consumed at
//! `CompleteMultipartUpload`/abort.
//!
//! Integrity verification (SPEC_FULL §4.6) is not attached to uploads
//! driven through this route: S3's multipart protocol allows parts to
//! arrive in any order, so a running HMAC can't be fed in ciphertext
//! order the way [`crate::pipeline::uploader`] feeds it. Objects that
//! need an integrity tag should go through a single PUT large enough to
//! select streaming mode internally (C7/C8), not this quartet.

use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http_body_util::BodyExt;
use rand::RngCore;
use serde::Deserialize;

use s3ep_core::metadata::{EnvelopeMetadata, MetadataCodec, DEK_ALGORITHM_STREAMING};
use s3ep_crypto::{Dek, StreamingCipher};

use crate::backend::UploadedPart;
use crate::error::ProxyError;
use crate::multipart_session::MultipartSession;
use crate::state::AppState;

fn b64_decode(value: &str) -> Result<Vec<u8>, ProxyError> {
    base64::Engine::decode(&base64::engine::general_purpose::STANDARD, value)
        .map_err(|e| ProxyError::InternalError(format!("malformed base64: {e}")))
}

fn b64_encode(bytes: impl AsRef<[u8]>) -> String {
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes)
}

fn client_metadata_from_headers(headers: &axum::http::HeaderMap) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for (name, value) in headers {
        if let Some(key) = name.as_str().strip_prefix("x-amz-meta-") {
            if let Ok(v) = value.to_str() {
                out.insert(key.to_string(), v.to_string());
            }
        }
    }
    out
}

pub async fn create_multipart_upload(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    headers: axum::http::HeaderMap,
) -> Result<Response, ProxyError> {
    let provider = state.registry.active();
    let dek = Dek::generate()?;
    let wrapped = provider.wrap_dek(&dek)?;
    let encrypted_dek = b64_encode(&wrapped.ciphertext);

    let mut iv = [0u8; 8];
    rand::rngs::OsRng.fill_bytes(&mut iv);

    let mut client_metadata = client_metadata_from_headers(&headers);
    if !wrapped.iv.is_empty() {
        client_metadata.insert("kek-wrap-iv".to_string(), b64_encode(&wrapped.iv));
    }

    let envelope = EnvelopeMetadata {
        encrypted_dek: encrypted_dek.clone(),
        kek_algorithm: provider.algorithm_label().to_string(),
        kek_fingerprint: provider.fingerprint().to_string(),
        dek_algorithm: Some(DEK_ALGORITHM_STREAMING.to_string()),
        aes_iv: Some(b64_encode(iv)),
        integrity_tag: None,
        upload_id: None,
    };
    let codec = MetadataCodec::new(state.config.metadata_prefix());
    let metadata = codec
        .serialize(&envelope, &client_metadata)
        .map_err(|e| ProxyError::InvalidRequest(e.to_string()))?;

    let upload_id = state
        .backend
        .create_multipart_upload(&bucket, &key, &metadata)
        .await?;

    state.multipart_sessions.insert(
        upload_id.clone(),
        MultipartSession {
            dek,
            iv,
            encrypted_dek,
            kek_algorithm: provider.algorithm_label().to_string(),
            kek_fingerprint: provider.fingerprint().to_string(),
            bucket,
            key,
            client_metadata,
            part_segment_indices: BTreeMap::new(),
            next_segment_index: 0,
        },
    );

    let body = format!(
        "<InitiateMultipartUploadResult><UploadId>{upload_id}</UploadId></InitiateMultipartUploadResult>"
    );
    Ok((StatusCode::OK, [("content-type", "application/xml")], body).into_response())
}

#[derive(Deserialize)]
pub struct PartQuery {
    #[serde(rename = "partNumber")]
    pub part_number: u32,
    #[serde(rename = "uploadId")]
    pub upload_id: String,
}

pub async fn upload_part(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<PartQuery>,
    request: axum::extract::Request,
) -> Result<Response, ProxyError> {
    let plaintext = request
        .into_body()
        .collect()
        .await
        .map_err(|e| ProxyError::InvalidRequest(format!("error reading part body: {e}")))?
        .to_bytes();

    {
        let session = state
            .multipart_sessions
            .get(&query.upload_id)
            .ok_or_else(|| ProxyError::InvalidRequest("unknown or expired uploadId".to_string()))?;
        if session.bucket != bucket || session.key != key {
            return Err(ProxyError::InvalidRequest(
                "uploadId does not belong to this object".to_string(),
            ));
        }
    }

    let segment_index = state
        .multipart_sessions
        .segment_index_for_part(&query.upload_id, query.part_number)
        .ok_or_else(|| ProxyError::InvalidRequest("unknown or expired uploadId".to_string()))?;

    let mut buf = plaintext.to_vec();
    {
        let session = state
            .multipart_sessions
            .get(&query.upload_id)
            .ok_or_else(|| ProxyError::InvalidRequest("unknown or expired uploadId".to_string()))?;
        let mut cipher = StreamingCipher::new(&session.dek, &session.iv);
        cipher.process_segment(segment_index, &mut buf)?;
    }

    let uploaded = state
        .backend
        .upload_part(&bucket, &key, &query.upload_id, query.part_number, Bytes::from(buf))
        .await?;

    let body = "<PutPartResult></PutPartResult>".to_string();
    Ok((
        StatusCode::OK,
        [("etag", uploaded.etag.as_str())],
        body,
    )
        .into_response())
}

#[derive(Deserialize)]
pub struct UploadIdQuery {
    #[serde(rename = "uploadId")]
    pub upload_id: String,
}

/// A single `<Part>` entry from the client's `CompleteMultipartUpload`
/// request body.
fn parse_requested_parts(xml: &str) -> Vec<(u32, String)> {
    let mut parts = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find("<Part>") {
        let Some(end) = rest[start..].find("</Part>") else {
            break;
        };
        let chunk = &rest[start + "<Part>".len()..start + end];
        let part_number = extract_tag(chunk, "PartNumber").and_then(|s| s.parse().ok());
        let etag = extract_tag(chunk, "ETag");
        if let (Some(number), Some(etag)) = (part_number, etag) {
            parts.push((number, etag));
        }
        rest = &rest[start + end + "</Part>".len()..];
    }
    parts
}

fn extract_tag(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(xml[start..end].to_string())
}

pub async fn complete_multipart_upload(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<UploadIdQuery>,
    request: axum::extract::Request,
) -> Result<Response, ProxyError> {
    let body = request
        .into_body()
        .collect()
        .await
        .map_err(|e| ProxyError::InvalidRequest(format!("error reading complete-upload body: {e}")))?
        .to_bytes();
    let body_str = String::from_utf8_lossy(&body);
    let requested_parts = parse_requested_parts(&body_str);

    let session = state
        .multipart_sessions
        .get(&query.upload_id)
        .ok_or_else(|| ProxyError::InvalidRequest("unknown or expired uploadId".to_string()))?;
    if session.bucket != bucket || session.key != key {
        return Err(ProxyError::InvalidRequest(
            "uploadId does not belong to this object".to_string(),
        ));
    }
    drop(session);

    let parts: Vec<UploadedPart> = requested_parts
        .into_iter()
        .map(|(part_number, etag)| UploadedPart { part_number, etag })
        .collect();

    let result = state
        .backend
        .complete_multipart_upload(&bucket, &key, &query.upload_id, &parts)
        .await;

    if let Err(err) = result {
        state
            .backend
            .abort_multipart_upload(&bucket, &key, &query.upload_id)
            .await;
        state.multipart_sessions.remove(&query.upload_id);
        return Err(err);
    }

    state.multipart_sessions.remove(&query.upload_id);

    let body = format!(
        "<CompleteMultipartUploadResult><Bucket>{bucket}</Bucket><Key>{key}</Key></CompleteMultipartUploadResult>"
    );
    Ok((StatusCode::OK, [("content-type", "application/xml")], body).into_response())
}

pub async fn abort_multipart_upload(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<UploadIdQuery>,
) -> Result<Response, ProxyError> {
    state
        .backend
        .abort_multipart_upload(&bucket, &key, &query.upload_id)
        .await;
    state.multipart_sessions.remove(&query.upload_id);
    Ok(StatusCode::NO_CONTENT.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_requested_parts_reads_number_and_etag() {
        let xml = "<CompleteMultipartUpload><Part><PartNumber>1</PartNumber><ETag>\"abc\"</ETag></Part><Part><PartNumber>2</PartNumber><ETag>\"def\"</ETag></Part></CompleteMultipartUpload>";
        let parts = parse_requested_parts(xml);
        assert_eq!(parts, vec![(1, "\"abc\"".to_string()), (2, "\"def\"".to_string())]);
    }

    #[test]
    fn parse_requested_parts_empty_body_yields_no_parts() {
        assert!(parse_requested_parts("<CompleteMultipartUpload></CompleteMultipartUpload>").is_empty());
    }

    #[test]
    fn b64_round_trips() {
        let encoded = b64_encode(b"dek-bytes");
        assert_eq!(b64_decode(&encoded).unwrap(), b"dek-bytes");
    }
}
