//! Streaming downloader (C9, SPEC_FULL §4.9): adaptive buffer-size
//! reader over a streaming-encrypted object's backend body, decrypting
//! segment-aligned blocks and verifying an incremental integrity tag
//! before reporting EOF.

const MIN_BUFFER: usize = 4 * 1024;
const MAX_BUFFER: usize = 2 * 1024 * 1024;

const TIER_1_MIB: u64 = 1024 * 1024;
const TIER_50_MIB: u64 = 50 * 1024 * 1024;
const TIER_500_MIB: u64 = 500 * 1024 * 1024;

const BUFFER_UNDER_1_MIB: usize = 16 * 1024;
const BUFFER_1_TO_50_MIB: usize = 64 * 1024;
const BUFFER_50_TO_500_MIB: usize = 256 * 1024;
const BUFFER_OVER_500_MIB: usize = 512 * 1024;

/// Chooses a read-buffer size from an object-size hint (`Content-Length`),
/// per the adaptive policy table in §4.9. When adaptive buffering is
/// disabled, callers should use `configured_size` directly instead of
/// calling this function.
pub fn adaptive_buffer_size(content_length_hint: Option<u64>, configured_floor: usize) -> usize {
    let tiered = match content_length_hint {
        Some(len) if len < TIER_1_MIB => BUFFER_UNDER_1_MIB,
        Some(len) if len < TIER_50_MIB => BUFFER_1_TO_50_MIB,
        Some(len) if len < TIER_500_MIB => BUFFER_50_TO_500_MIB,
        Some(_) => BUFFER_OVER_500_MIB,
        None => BUFFER_1_TO_50_MIB,
    };
    tiered.max(configured_floor).clamp(MIN_BUFFER, MAX_BUFFER)
}

use s3ep_crypto::{CryptoError, Dek, IntegrityHasher, StreamingCipher};

/// Decrypts a streaming-encrypted object's ciphertext incrementally.
/// Callers feed ciphertext chunks in backend-stream order via
/// [`Self::decrypt_chunk`] and must call [`Self::finish`] after the
/// last chunk to verify the integrity tag (if configured) before
/// surfacing EOF to their own caller.
pub struct StreamingDownload {
    cipher: StreamingCipher,
    hasher: Option<IntegrityHasher>,
    segment_size: u64,
    offset: u64,
    expected_tag: Option<[u8; 32]>,
}

impl StreamingDownload {
    /// `segment_size` must match the value the object was uploaded with
    /// — it determines where one segment's counter block ends and the
    /// next's begins.
    pub fn new(
        dek: &Dek,
        iv: &[u8; s3ep_crypto::streaming_cipher::IV_LEN],
        segment_size: u64,
        expected_tag: Option<[u8; 32]>,
    ) -> Result<Self, CryptoError> {
        let hasher = expected_tag.is_some().then(|| IntegrityHasher::new(dek)).transpose()?;
        Ok(Self {
            cipher: StreamingCipher::new(dek, iv),
            hasher,
            segment_size: segment_size.max(1),
            offset: 0,
            expected_tag,
        })
    }

    /// Decrypts `chunk` in place (ciphertext -> plaintext) and feeds it
    /// into the running integrity hash, if configured. `chunk` may span
    /// several segments; each is decrypted under its own counter block.
    pub fn decrypt_chunk(&mut self, chunk: &mut [u8]) -> Result<(), CryptoError> {
        if let Some(hasher) = self.hasher.as_mut() {
            hasher.update(chunk);
        }
        let mut pos = 0usize;
        while pos < chunk.len() {
            let segment_index = self.offset / self.segment_size;
            let offset_in_segment = self.offset % self.segment_size;
            let remaining_in_segment = (self.segment_size - offset_in_segment) as usize;
            let take = remaining_in_segment.min(chunk.len() - pos);
            self.cipher
                .process_segment_at(segment_index, offset_in_segment, &mut chunk[pos..pos + take])?;
            pos += take;
            self.offset += take as u64;
        }
        Ok(())
    }

    /// Verifies the integrity tag (if one was configured) against what
    /// was actually streamed. Must be called once, after the last
    /// chunk, before the caller reports EOF.
    pub fn finish(self) -> Result<(), CryptoError> {
        match (self.hasher, self.expected_tag) {
            (Some(hasher), Some(expected)) => hasher.verify(&expected),
            _ => Ok(()),
        }
    }
}
