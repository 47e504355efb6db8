//! AWS Signature V4: canonical request construction and the
//! chained-key HMAC derivation shared by the inbound authenticator
//! (C10, verifying client requests) and the backend client (signing
//! outbound calls with the proxy's own upstream credentials).
//!
//! Canonical-request shape follows the construction in
//! `beshu-tech-deltaglider`'s proxy auth module, corrected to a
//! constant-time signature comparison (`subtle::ConstantTimeEq`)
//! rather than the source's plain `!=`.

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const MAX_AUTH_HEADER_LEN: usize = 8 * 1024;
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";
pub const EMPTY_BODY_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAuthHeader {
    pub access_key_id: String,
    pub date: String,
    pub region: String,
    pub service: String,
    pub request_type: String,
    pub signed_headers: Vec<String>,
    pub signature: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SigV4Error {
    #[error("Authorization header exceeds {MAX_AUTH_HEADER_LEN} bytes")]
    HeaderTooLarge,
    #[error("Authorization header is not AWS4-HMAC-SHA256")]
    WrongScheme,
    #[error("Authorization header missing field: {0}")]
    MissingField(&'static str),
    #[error("unsupported service: {0}")]
    UnsupportedService(String),
    #[error("unsupported request type: {0}")]
    UnsupportedRequestType(String),
    #[error("malformed credential scope")]
    MalformedCredentialScope,
}

/// Parse `Authorization: AWS4-HMAC-SHA256 Credential=.../SignedHeaders=...,Signature=...`.
pub fn parse_auth_header(header: &str) -> Result<ParsedAuthHeader, SigV4Error> {
    if header.len() > MAX_AUTH_HEADER_LEN {
        return Err(SigV4Error::HeaderTooLarge);
    }
    let rest = header
        .strip_prefix("AWS4-HMAC-SHA256 ")
        .ok_or(SigV4Error::WrongScheme)?;

    let mut credential = None;
    let mut signed_headers = None;
    let mut signature = None;

    for part in rest.split(',') {
        let part = part.trim();
        if let Some(v) = part.strip_prefix("Credential=") {
            credential = Some(v);
        } else if let Some(v) = part.strip_prefix("SignedHeaders=") {
            signed_headers = Some(v);
        } else if let Some(v) = part.strip_prefix("Signature=") {
            signature = Some(v);
        }
    }

    let credential = credential.ok_or(SigV4Error::MissingField("Credential"))?;
    let signed_headers = signed_headers.ok_or(SigV4Error::MissingField("SignedHeaders"))?;
    let signature = signature.ok_or(SigV4Error::MissingField("Signature"))?;

    let segments: Vec<&str> = credential.splitn(5, '/').collect();
    let [access_key_id, date, region, service, request_type] = segments[..] else {
        return Err(SigV4Error::MalformedCredentialScope);
    };

    if service != "s3" {
        return Err(SigV4Error::UnsupportedService(service.to_string()));
    }
    if request_type != "aws4_request" {
        return Err(SigV4Error::UnsupportedRequestType(request_type.to_string()));
    }

    Ok(ParsedAuthHeader {
        access_key_id: access_key_id.to_string(),
        date: date.to_string(),
        region: region.to_string(),
        service: service.to_string(),
        request_type: request_type.to_string(),
        signed_headers: signed_headers.split(';').map(str::to_string).collect(),
        signature: signature.to_string(),
    })
}

/// A minimal view of the request needed to build the canonical request:
/// pre-normalized, with headers already lower-cased by the caller.
pub struct CanonicalRequestInput<'a> {
    pub method: &'a str,
    pub canonical_uri: &'a str,
    pub query_pairs: &'a [(String, String)],
    pub headers: &'a BTreeMap<String, String>,
    pub signed_headers: &'a [String],
    pub payload_hash: &'a str,
}

pub fn canonical_request(input: &CanonicalRequestInput<'_>) -> String {
    let mut sorted_query = input.query_pairs.to_vec();
    sorted_query.sort();
    let canonical_query = sorted_query
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let canonical_headers: String = input
        .signed_headers
        .iter()
        .map(|name| {
            let value = input.headers.get(name).map(String::as_str).unwrap_or("");
            format!("{name}:{}\n", value.trim())
        })
        .collect();

    let signed_headers_list = input.signed_headers.join(";");

    format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        input.method,
        input.canonical_uri,
        canonical_query,
        canonical_headers,
        signed_headers_list,
        input.payload_hash
    )
}

/// RFC 3986 percent-encoding for query keys/values (S3's flavor: `~`
/// unreserved, space encoded as `%20` not `+`).
fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

pub fn string_to_sign(date_time: &str, credential_scope: &str, canonical_request: &str) -> String {
    let hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
    format!("AWS4-HMAC-SHA256\n{date_time}\n{credential_scope}\n{hash}")
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Derive the SigV4 signing key: `kSecret → kDate → kRegion → kService → kSigning`.
pub fn derive_signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_secret = format!("AWS4{secret}");
    let k_date = hmac(k_secret.as_bytes(), date.as_bytes());
    let k_region = hmac(&k_date, region.as_bytes());
    let k_service = hmac(&k_region, service.as_bytes());
    hmac(&k_service, b"aws4_request")
}

pub fn sign(signing_key: &[u8], string_to_sign: &str) -> String {
    hex::encode(hmac(signing_key, string_to_sign.as_bytes()))
}

/// Constant-time comparison of two hex signature strings. Never
/// short-circuits on length or content mismatch.
pub fn signatures_match(expected: &str, actual: &str) -> bool {
    expected.as_bytes().len() == actual.as_bytes().len()
        && expected.as_bytes().ct_eq(actual.as_bytes()).unwrap_u8() == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_header() {
        let header = "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/s3/aws4_request, SignedHeaders=host;x-amz-date, Signature=abcd1234";
        let parsed = parse_auth_header(header).unwrap();
        assert_eq!(parsed.access_key_id, "AKIDEXAMPLE");
        assert_eq!(parsed.date, "20150830");
        assert_eq!(parsed.region, "us-east-1");
        assert_eq!(parsed.service, "s3");
        assert_eq!(parsed.request_type, "aws4_request");
        assert_eq!(parsed.signed_headers, vec!["host", "x-amz-date"]);
        assert_eq!(parsed.signature, "abcd1234");
    }

    #[test]
    fn rejects_oversized_header() {
        let huge = "AWS4-HMAC-SHA256 ".to_string() + &"a".repeat(MAX_AUTH_HEADER_LEN);
        assert_eq!(parse_auth_header(&huge), Err(SigV4Error::HeaderTooLarge));
    }

    #[test]
    fn rejects_wrong_scheme() {
        let header = "Bearer sometoken";
        assert_eq!(parse_auth_header(header), Err(SigV4Error::WrongScheme));
    }

    #[test]
    fn rejects_non_s3_service() {
        let header = "AWS4-HMAC-SHA256 Credential=AKID/20150830/us-east-1/ec2/aws4_request, SignedHeaders=host, Signature=abcd";
        assert_eq!(
            parse_auth_header(header),
            Err(SigV4Error::UnsupportedService("ec2".to_string()))
        );
    }

    #[test]
    fn rejects_non_aws4_request_type() {
        let header = "AWS4-HMAC-SHA256 Credential=AKID/20150830/us-east-1/s3/not_a_request, SignedHeaders=host, Signature=abcd";
        assert_eq!(
            parse_auth_header(header),
            Err(SigV4Error::UnsupportedRequestType("not_a_request".to_string()))
        );
    }

    #[test]
    fn rejects_missing_signature() {
        let header = "AWS4-HMAC-SHA256 Credential=AKID/20150830/us-east-1/s3/aws4_request, SignedHeaders=host";
        assert_eq!(
            parse_auth_header(header),
            Err(SigV4Error::MissingField("Signature"))
        );
    }

    #[test]
    fn canonical_request_matches_known_shape() {
        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), "examplebucket.s3.amazonaws.com".to_string());
        headers.insert("x-amz-date".to_string(), "20130524T000000Z".to_string());

        let input = CanonicalRequestInput {
            method: "GET",
            canonical_uri: "/test.txt",
            query_pairs: &[],
            headers: &headers,
            signed_headers: &["host".to_string(), "x-amz-date".to_string()],
            payload_hash: EMPTY_BODY_SHA256,
        };
        let request = canonical_request(&input);
        assert!(request.starts_with("GET\n/test.txt\n\n"));
        assert!(request.contains("host:examplebucket.s3.amazonaws.com\n"));
        assert!(request.contains("host;x-amz-date"));
    }

    #[test]
    fn signing_key_is_deterministic() {
        let a = derive_signing_key("secret", "20150830", "us-east-1", "s3");
        let b = derive_signing_key("secret", "20150830", "us-east-1", "s3");
        assert_eq!(a, b);
    }

    #[test]
    fn signing_key_differs_for_different_secrets() {
        let a = derive_signing_key("secret-a", "20150830", "us-east-1", "s3");
        let b = derive_signing_key("secret-b", "20150830", "us-east-1", "s3");
        assert_ne!(a, b);
    }

    #[test]
    fn signatures_match_accepts_equal_strings() {
        assert!(signatures_match("abc123", "abc123"));
    }

    #[test]
    fn signatures_match_rejects_different_length() {
        assert!(!signatures_match("abc", "abcd"));
    }

    #[test]
    fn signatures_match_rejects_different_content() {
        assert!(!signatures_match("abc123", "abc124"));
    }

    #[test]
    fn sign_produces_hex_string() {
        let key = derive_signing_key("secret", "20150830", "us-east-1", "s3");
        let sig = sign(&key, "some-string-to-sign");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn percent_encode_leaves_unreserved_untouched() {
        assert_eq!(percent_encode("abc-._~123"), "abc-._~123");
    }

    #[test]
    fn percent_encode_escapes_space_and_slash() {
        assert_eq!(percent_encode("a b/c"), "a%20b%2Fc");
    }
}
