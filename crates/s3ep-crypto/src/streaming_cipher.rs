//! Streaming cipher (C6): AES-256-CTR, segment-aligned so each part of
//! a multipart upload can be encrypted independently of the others. Per
//! SPEC_FULL §4.6 the counter block for segment N is built fresh as the
//! 8-byte IV followed by `N` as a big-endian 64-bit integer, so no
//! segment's keystream depends on any other segment having been
//! processed first. Optional HMAC-SHA256 integrity runs over ciphertext
//! bytes as they're produced/consumed, keyed by a value HKDF-derived
//! from the DEK so the integrity key is never the same bytes as the
//! cipher key.

use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use ctr::Ctr128BE;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::dek::Dek;
use crate::error::CryptoError;

type Aes256Ctr = Ctr128BE<Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Length of the IV carried in object metadata. Half of the 16-byte CTR
/// counter block; the other half is the per-segment index.
pub const IV_LEN: usize = 8;

/// Domain-separation label for the integrity key HKDF — distinct
/// purpose from the cipher key so a leaked integrity tag never helps
/// recover the DEK.
const INTEGRITY_INFO: &[u8] = b"s3ep-integrity";

/// AES-256-CTR keystream over one object, addressed by segment index
/// rather than a continuous byte offset. Each segment gets its own
/// 128-bit counter block (`iv ∥ segment_index`), so segments can be
/// encrypted or decrypted independently and out of order — the
/// uploader in practice stays sequential, per SPEC_FULL §4.7.
pub struct StreamingCipher {
    key: [u8; 32],
    iv: [u8; IV_LEN],
}

impl StreamingCipher {
    pub fn new(dek: &Dek, iv: &[u8; IV_LEN]) -> Self {
        Self {
            key: *dek.as_bytes(),
            iv: *iv,
        }
    }

    fn counter_block(&self, segment_index: u64) -> [u8; 16] {
        let mut block = [0u8; 16];
        block[..IV_LEN].copy_from_slice(&self.iv);
        block[IV_LEN..].copy_from_slice(&segment_index.to_be_bytes());
        block
    }

    /// XOR `buf` in place against segment `segment_index`'s keystream,
    /// starting `offset_in_segment` bytes into that segment. Symmetric:
    /// the same call encrypts plaintext or decrypts ciphertext.
    pub fn process_segment_at(
        &mut self,
        segment_index: u64,
        offset_in_segment: u64,
        buf: &mut [u8],
    ) -> Result<(), CryptoError> {
        let counter_block = self.counter_block(segment_index);
        let mut cipher = Aes256Ctr::new((&self.key).into(), (&counter_block).into());
        if offset_in_segment > 0 {
            cipher
                .try_seek(offset_in_segment)
                .map_err(|_| CryptoError::InvalidKey("ctr keystream seek overflow".to_string()))?;
        }
        cipher.apply_keystream(buf);
        Ok(())
    }

    /// Process a full segment starting at its first byte — the common
    /// case for the uploader and the client-driven multipart quartet,
    /// where one call always covers one whole segment.
    pub fn process_segment(&mut self, segment_index: u64, buf: &mut [u8]) -> Result<(), CryptoError> {
        self.process_segment_at(segment_index, 0, buf)
    }
}

/// Incremental HMAC-SHA256 over ciphertext bytes, fed segment by
/// segment as the uploader/downloader processes them.
pub struct IntegrityHasher {
    mac: HmacSha256,
}

impl IntegrityHasher {
    pub fn new(dek: &Dek) -> Result<Self, CryptoError> {
        let hk = Hkdf::<Sha256>::new(None, dek.as_bytes());
        let mut integrity_key = [0u8; 32];
        hk.expand(INTEGRITY_INFO, &mut integrity_key)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let mac = HmacSha256::new_from_slice(&integrity_key)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self { mac })
    }

    pub fn update(&mut self, ciphertext_chunk: &[u8]) {
        self.mac.update(ciphertext_chunk);
    }

    /// Finalize and return the raw 32-byte tag, for writers.
    pub fn finalize(self) -> [u8; 32] {
        let bytes = self.mac.finalize().into_bytes();
        let mut tag = [0u8; 32];
        tag.copy_from_slice(&bytes);
        tag
    }

    /// Finalize and compare against an expected tag in constant time,
    /// for readers. Never short-circuits on length or content, per
    /// SPEC_FULL §8's constant-time-comparison requirement.
    pub fn verify(self, expected: &[u8]) -> Result<(), CryptoError> {
        let actual = self.finalize();
        if actual.len() != expected.len() || actual.ct_eq(expected).unwrap_u8() != 1 {
            return Err(CryptoError::IntegrityFailed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dek() -> Dek {
        Dek::generate().unwrap()
    }

    fn iv() -> [u8; IV_LEN] {
        [0x42; IV_LEN]
    }

    #[test]
    fn encrypt_then_decrypt_single_segment_roundtrips() {
        let dek = dek();
        let mut plaintext = b"the quick brown fox".to_vec();
        let original = plaintext.clone();

        let mut encryptor = StreamingCipher::new(&dek, &iv());
        encryptor.process_segment(0, &mut plaintext).unwrap();
        assert_ne!(plaintext, original);

        let mut decryptor = StreamingCipher::new(&dek, &iv());
        decryptor.process_segment(0, &mut plaintext).unwrap();
        assert_eq!(plaintext, original);
    }

    #[test]
    fn segments_at_independent_indices_roundtrip() {
        let dek = dek();
        let segment_size = 16usize;
        let mut segments: Vec<Vec<u8>> = (0..4).map(|i| vec![i as u8; segment_size]).collect();
        let originals = segments.clone();

        let mut encryptor = StreamingCipher::new(&dek, &iv());
        for (i, segment) in segments.iter_mut().enumerate() {
            encryptor.process_segment(i as u64, segment).unwrap();
        }

        // Decrypt out of order to prove each segment's counter is
        // self-contained, not threaded through running cipher state.
        let mut decryptor = StreamingCipher::new(&dek, &iv());
        for i in [2, 0, 3, 1] {
            decryptor.process_segment(i as u64, &mut segments[i]).unwrap();
        }
        assert_eq!(segments, originals);
    }

    #[test]
    fn different_segment_indices_produce_different_keystreams() {
        let dek = dek();
        let mut a = vec![0u8; 16];
        let mut b = vec![0u8; 16];
        StreamingCipher::new(&dek, &iv()).process_segment(0, &mut a).unwrap();
        StreamingCipher::new(&dek, &iv()).process_segment(1, &mut b).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn process_segment_at_mid_segment_matches_full_segment_tail() {
        let dek = dek();
        let mut full = vec![0u8; 32];
        StreamingCipher::new(&dek, &iv())
            .process_segment(5, &mut full)
            .unwrap();

        let mut tail = vec![0u8; 16];
        StreamingCipher::new(&dek, &iv())
            .process_segment_at(5, 16, &mut tail)
            .unwrap();
        assert_eq!(&full[16..], &tail[..]);
    }

    #[test]
    fn integrity_tag_roundtrips() {
        let dek = dek();
        let mut hasher = IntegrityHasher::new(&dek).unwrap();
        hasher.update(b"chunk one");
        hasher.update(b"chunk two");
        let tag = hasher.finalize();

        let mut verifier = IntegrityHasher::new(&dek).unwrap();
        verifier.update(b"chunk one");
        verifier.update(b"chunk two");
        verifier.verify(&tag).unwrap();
    }

    #[test]
    fn integrity_tag_rejects_tampered_ciphertext() {
        let dek = dek();
        let mut hasher = IntegrityHasher::new(&dek).unwrap();
        hasher.update(b"chunk one");
        let tag = hasher.finalize();

        let mut verifier = IntegrityHasher::new(&dek).unwrap();
        verifier.update(b"chunk ONE");
        let err = verifier.verify(&tag).unwrap_err();
        assert!(matches!(err, CryptoError::IntegrityFailed));
    }

    #[test]
    fn integrity_key_differs_from_cipher_key() {
        let dek = dek();
        let mut hasher = IntegrityHasher::new(&dek).unwrap();
        hasher.update(dek.as_bytes());
        let tag_with_dek_content = hasher.finalize();
        assert_ne!(&tag_with_dek_content[..], dek.as_bytes());
    }
}
