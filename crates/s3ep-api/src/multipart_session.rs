//! In-memory state for client-driven multipart uploads (the raw
//! `POST ?uploads` / `PUT ?partNumber&uploadId` / `POST ?uploadId` /
//! `DELETE ?uploadId` quartet from SPEC_FULL §6, as distinct from the
//! uploader-driven multipart the proxy uses internally for a single
//! large PUT — see [`crate::pipeline::uploader`]).
//!
//! A client that streams its own multipart sequence spans several HTTP
//! requests, so the DEK and streaming IV generated at `CreateMultipartUpload`
//! must survive until `CompleteMultipartUpload`. Kept in a `dashmap`, the
//! same concurrent-map dependency already used for per-IP tracking in
//! [`crate::middleware::auth`] and [`crate::middleware::rate_limit`].

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;

use s3ep_crypto::Dek;

/// Tracks one in-flight client-driven multipart upload.
pub struct MultipartSession {
    pub dek: Dek,
    pub iv: [u8; 8],
    pub encrypted_dek: String,
    pub kek_algorithm: String,
    pub kek_fingerprint: String,
    pub bucket: String,
    pub key: String,
    pub client_metadata: BTreeMap<String, String>,
    /// Segment index assigned to each part number, so re-uploading a
    /// part (a client retry) re-encrypts under the same counter block
    /// instead of advancing to a new segment.
    pub part_segment_indices: BTreeMap<u32, u64>,
    pub next_segment_index: u64,
}

#[derive(Clone, Default)]
pub struct MultipartSessionStore {
    sessions: Arc<DashMap<String, MultipartSession>>,
}

impl MultipartSessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
        }
    }

    pub fn insert(&self, upload_id: String, session: MultipartSession) {
        self.sessions.insert(upload_id, session);
    }

    /// Assigns (or recalls) the segment index for `part_number`,
    /// advancing `next_segment_index` only the first time a given part
    /// number is seen.
    pub fn segment_index_for_part(&self, upload_id: &str, part_number: u32) -> Option<u64> {
        let mut session = self.sessions.get_mut(upload_id)?;
        if let Some(&index) = session.part_segment_indices.get(&part_number) {
            return Some(index);
        }
        let index = session.next_segment_index;
        session.part_segment_indices.insert(part_number, index);
        session.next_segment_index += 1;
        Some(index)
    }

    pub fn get(&self, upload_id: &str) -> Option<dashmap::mapref::one::Ref<'_, String, MultipartSession>> {
        self.sessions.get(upload_id)
    }

    pub fn remove(&self, upload_id: &str) -> Option<MultipartSession> {
        self.sessions.remove(upload_id).map(|(_, v)| v)
    }
}
