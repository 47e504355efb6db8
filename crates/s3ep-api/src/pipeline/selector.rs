//! Upload mode selection (SPEC_FULL §4.7). Chooses between the
//! in-memory envelope cipher (C5) and the segment-streaming cipher
//! (C6) before a single byte of the request body is read.

pub const FORCE_AES_GCM_CONTENT_TYPE: &str = "application/x-s3ep-force-aes-gcm";
pub const FORCE_AES_CTR_CONTENT_TYPE: &str = "application/x-s3ep-force-aes-ctr";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    Envelope,
    Streaming,
}

/// `content_length` is `None` when the client didn't send one (chunked
/// transfer or HTTP/2 without a length); `streaming_segment_size` is
/// `config.optimizations.streaming_segment_size`.
pub fn select_upload_mode(
    content_type: Option<&str>,
    content_length: Option<u64>,
    streaming_segment_size: u64,
) -> UploadMode {
    match content_type {
        Some(ct) if ct.eq_ignore_ascii_case(FORCE_AES_GCM_CONTENT_TYPE) => return UploadMode::Envelope,
        Some(ct) if ct.eq_ignore_ascii_case(FORCE_AES_CTR_CONTENT_TYPE) => return UploadMode::Streaming,
        _ => {}
    }

    match content_length {
        Some(len) if len > streaming_segment_size => UploadMode::Streaming,
        _ => UploadMode::Envelope,
    }
}
