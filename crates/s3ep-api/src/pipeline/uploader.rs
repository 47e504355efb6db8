//! Streaming uploader (C8, SPEC_FULL §4.8): drives the backend's
//! multipart protocol, encrypting one segment at a time with the
//! seekable AES-256-CTR cipher so segment N+1 never needs segment N's
//! plaintext held in memory.

use std::collections::BTreeMap;

use bytes::{Bytes, BytesMut};
use rand::RngCore;

use s3ep_core::metadata::{EnvelopeMetadata, DEK_ALGORITHM_STREAMING};
use s3ep_crypto::{Dek, IntegrityHasher, StreamingCipher};

use crate::backend::{BackendClient, UploadedPart};
use crate::error::ProxyError;

/// What the caller supplies per segment: plaintext bytes read from the
/// client body, or `None` at EOF.
#[async_trait::async_trait]
pub trait SegmentSource: Send {
    /// Reads up to `max_len` bytes. Returns an empty buffer at EOF.
    async fn read_segment(&mut self, max_len: usize) -> Result<Bytes, ProxyError>;
}

pub struct StreamingUploadOutcome {
    pub upload_id: Option<String>,
    pub total_plaintext_len: u64,
}

/// Uploads `source` to `bucket`/`key` as a multipart object, encrypting
/// each segment under `dek` with [`StreamingCipher`]. `encrypted_dek`
/// (already base64-encoded, KEK-wrapped by the caller's resolved
/// `KekProvider`) and `kek_fingerprint`/`kek_algorithm` are attached to
/// the initiation call so an aborted or partially-completed upload
/// still carries provider attribution (per §4.8 step 1).
///
/// Falls back to a single envelope `PutObject` if the source hits EOF
/// before a single segment has been read — the documented short-read
/// downgrade; the caller is responsible for performing that fallback
/// PutObject when `total_plaintext_len == 0` and `upload_id` is `None`.
pub async fn upload_streaming(
    backend: &BackendClient,
    bucket: &str,
    key: &str,
    dek: &Dek,
    encrypted_dek: &str,
    kek_fingerprint: &str,
    kek_algorithm: &str,
    integrity_enabled: bool,
    segment_size: u64,
    client_metadata: &BTreeMap<String, String>,
    metadata_prefix: &str,
    source: &mut dyn SegmentSource,
) -> Result<StreamingUploadOutcome, ProxyError> {
    let segment_size = segment_size.min(usize::MAX as u64) as usize;

    let mut iv = [0u8; 8];
    rand::rngs::OsRng.fill_bytes(&mut iv);

    let envelope = EnvelopeMetadata {
        encrypted_dek: encrypted_dek.to_string(),
        kek_algorithm: kek_algorithm.to_string(),
        kek_fingerprint: kek_fingerprint.to_string(),
        dek_algorithm: Some(DEK_ALGORITHM_STREAMING.to_string()),
        aes_iv: Some(base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            iv,
        )),
        integrity_tag: None,
        upload_id: None,
    };
    let codec = s3ep_core::metadata::MetadataCodec::new(metadata_prefix);
    let metadata = codec
        .serialize(&envelope, client_metadata)
        .map_err(|e| ProxyError::InvalidRequest(e.to_string()))?;

    let upload_id = backend
        .create_multipart_upload(bucket, key, &metadata)
        .await?;

    let mut cipher = StreamingCipher::new(dek, &iv);
    let mut hasher = if integrity_enabled {
        Some(IntegrityHasher::new(dek)?)
    } else {
        None
    };

    let mut parts: Vec<UploadedPart> = Vec::new();
    let mut total_len: u64 = 0;
    let mut segment_index: u64 = 0;
    let mut part_number: u32 = 1;

    loop {
        let plaintext = source.read_segment(segment_size).await?;
        if plaintext.is_empty() {
            break;
        }

        let mut buf = BytesMut::from(&plaintext[..]);
        cipher.process_segment(segment_index, &mut buf)?;
        if let Some(hasher) = hasher.as_mut() {
            hasher.update(&buf);
        }

        let uploaded = backend
            .upload_part(bucket, key, &upload_id, part_number, buf.freeze())
            .await;

        let uploaded = match uploaded {
            Ok(part) => part,
            Err(err) => {
                backend.abort_multipart_upload(bucket, key, &upload_id).await;
                return Err(err);
            }
        };

        parts.push(uploaded);
        total_len += plaintext.len() as u64;
        segment_index += 1;
        part_number += 1;
    }

    if parts.is_empty() {
        backend.abort_multipart_upload(bucket, key, &upload_id).await;
        return Ok(StreamingUploadOutcome {
            upload_id: None,
            total_plaintext_len: 0,
        });
    }

    if let Err(err) = backend
        .complete_multipart_upload(bucket, key, &upload_id, &parts)
        .await
    {
        backend.abort_multipart_upload(bucket, key, &upload_id).await;
        return Err(err);
    }

    if let Some(hasher) = hasher {
        let tag = hasher.finalize();
        let mut final_metadata = metadata;
        final_metadata.insert(
            format!("{metadata_prefix}integrity-tag"),
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, tag),
        );
        backend.replace_metadata(bucket, key, &final_metadata).await?;
    }

    Ok(StreamingUploadOutcome {
        upload_id: Some(upload_id),
        total_plaintext_len: total_len,
    })
}
