//! Upstream S3 backend client. Out of this proxy's core scope per
//! SPEC_FULL §1, but required glue: every call is re-signed with the
//! proxy's own upstream credentials (`s3_backend.access_key_id` /
//! `secret_key`) using the same SigV4 primitives the inbound
//! authenticator uses to verify client requests.
//!
//! Grounded on the `AwsGatewayBackend` shape in
//! `other_examples/...e6qu-bleepstore__rust-src-storage-aws.rs`: a
//! narrow trait-free client wrapping a configurable-endpoint HTTP
//! client, built here on `reqwest` rather than `aws-sdk-s3` to keep the
//! dependency footprint aligned with the rest of this workspace.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use chrono::Utc;
use reqwest::{Client, Method, StatusCode};
use sha2::{Digest, Sha256};

use s3ep_core::config::BackendConfig;

use crate::error::ProxyError;
use crate::sigv4::{self, CanonicalRequestInput};

pub struct UploadedPart {
    pub part_number: u32,
    pub etag: String,
}

pub struct BackendClient {
    http: Client,
    endpoint: url::Url,
    region: String,
    access_key_id: String,
    secret_key: String,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Self {
        let http = Client::builder()
            .danger_accept_invalid_certs(config.insecure_skip_verify)
            .build()
            .expect("reqwest client builds with valid TLS config");
        let endpoint = url::Url::parse(&config.target_endpoint)
            .expect("target_endpoint validated as non-empty at config load");
        Self {
            http,
            endpoint,
            region: config.region.clone(),
            access_key_id: config.access_key_id.clone(),
            secret_key: config.secret_key.clone(),
        }
    }

    fn object_path(&self, bucket: &str, key: &str) -> String {
        format!("/{bucket}/{key}")
    }

    async fn send_signed(
        &self,
        method: Method,
        path: &str,
        query_pairs: Vec<(String, String)>,
        mut headers: BTreeMap<String, String>,
        body: Bytes,
    ) -> Result<reqwest::Response, ProxyError> {
        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let payload_hash = hex::encode(Sha256::digest(&body));

        let host = self
            .endpoint
            .host_str()
            .ok_or_else(|| ProxyError::InternalError("backend endpoint has no host".to_string()))?
            .to_string();

        headers.insert("host".to_string(), host);
        headers.insert("x-amz-date".to_string(), amz_date.clone());
        headers.insert("x-amz-content-sha256".to_string(), payload_hash.clone());

        let signed_headers: Vec<String> = headers.keys().cloned().collect();
        let input = CanonicalRequestInput {
            method: method.as_str(),
            canonical_uri: path,
            query_pairs: &query_pairs,
            headers: &headers,
            signed_headers: &signed_headers,
            payload_hash: &payload_hash,
        };
        let canonical = sigv4::canonical_request(&input);
        let credential_scope = format!("{date}/{}/s3/aws4_request", self.region);
        let sts = sigv4::string_to_sign(&amz_date, &credential_scope, &canonical);
        let signing_key = sigv4::derive_signing_key(&self.secret_key, &date, &self.region, "s3");
        let signature = sigv4::sign(&signing_key, &sts);

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{credential_scope}, SignedHeaders={}, Signature={signature}",
            self.access_key_id,
            signed_headers.join(";"),
        );

        let mut url = self.endpoint.clone();
        url.set_path(path);
        for (k, v) in &query_pairs {
            url.query_pairs_mut().append_pair(k, v);
        }

        let mut request = self.http.request(method, url).body(body);
        for (name, value) in &headers {
            if name != "host" {
                request = request.header(name, value);
            }
        }
        request = request.header("authorization", authorization);

        request
            .send()
            .await
            .map_err(|e| ProxyError::InternalError(format!("backend request failed: {e}")))
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProxyError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable backend error body>".to_string());
            Err(ProxyError::BackendError { status, message })
        }
    }

    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        metadata: &BTreeMap<String, String>,
        body: Bytes,
    ) -> Result<(), ProxyError> {
        let path = self.object_path(bucket, key);
        let mut headers = BTreeMap::new();
        for (k, v) in metadata {
            headers.insert(format!("x-amz-meta-{k}"), v.clone());
        }
        let response = self
            .send_signed(Method::PUT, &path, vec![], headers, body)
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    pub async fn get_object(&self, bucket: &str, key: &str) -> Result<reqwest::Response, ProxyError> {
        let path = self.object_path(bucket, key);
        let response = self
            .send_signed(Method::GET, &path, vec![], BTreeMap::new(), Bytes::new())
            .await?;
        Self::check_status(response).await
    }

    pub async fn head_object(&self, bucket: &str, key: &str) -> Result<reqwest::Response, ProxyError> {
        let path = self.object_path(bucket, key);
        let response = self
            .send_signed(Method::HEAD, &path, vec![], BTreeMap::new(), Bytes::new())
            .await?;
        Self::check_status(response).await
    }

    pub async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), ProxyError> {
        let path = self.object_path(bucket, key);
        let response = self
            .send_signed(Method::DELETE, &path, vec![], BTreeMap::new(), Bytes::new())
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    pub async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<String, ProxyError> {
        let path = self.object_path(bucket, key);
        let mut headers = BTreeMap::new();
        for (k, v) in metadata {
            headers.insert(format!("x-amz-meta-{k}"), v.clone());
        }
        let response = self
            .send_signed(
                Method::POST,
                &path,
                vec![("uploads".to_string(), String::new())],
                headers,
                Bytes::new(),
            )
            .await?;
        let response = Self::check_status(response).await?;
        let body = response
            .text()
            .await
            .map_err(|e| ProxyError::InternalError(format!("reading CreateMultipartUpload body: {e}")))?;
        extract_xml_tag(&body, "UploadId")
            .ok_or_else(|| ProxyError::InternalError("backend response missing UploadId".to_string()))
    }

    pub async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<UploadedPart, ProxyError> {
        let path = self.object_path(bucket, key);
        let response = self
            .send_signed(
                Method::PUT,
                &path,
                vec![
                    ("partNumber".to_string(), part_number.to_string()),
                    ("uploadId".to_string(), upload_id.to_string()),
                ],
                BTreeMap::new(),
                body,
            )
            .await?;
        let response = Self::check_status(response).await?;
        let etag = response
            .headers()
            .get("etag")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ProxyError::InternalError("backend UploadPart response missing ETag".to_string()))?;
        Ok(UploadedPart { part_number, etag })
    }

    pub async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[UploadedPart],
    ) -> Result<(), ProxyError> {
        let path = self.object_path(bucket, key);
        let mut body = String::from("<CompleteMultipartUpload>");
        for part in parts {
            body.push_str(&format!(
                "<Part><PartNumber>{}</PartNumber><ETag>{}</ETag></Part>",
                part.part_number, part.etag
            ));
        }
        body.push_str("</CompleteMultipartUpload>");

        let response = self
            .send_signed(
                Method::POST,
                &path,
                vec![("uploadId".to_string(), upload_id.to_string())],
                BTreeMap::new(),
                Bytes::from(body),
            )
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    /// Overwrites an object's user metadata in place via a self-copy
    /// with `x-amz-metadata-directive: REPLACE`. Used to attach the
    /// streaming-upload integrity tag, which isn't known until the
    /// last segment has been uploaded — after `CompleteMultipartUpload`
    /// has already fixed the object's initial metadata.
    pub async fn replace_metadata(
        &self,
        bucket: &str,
        key: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<(), ProxyError> {
        let path = self.object_path(bucket, key);
        let mut headers = BTreeMap::new();
        headers.insert(
            "x-amz-copy-source".to_string(),
            format!("/{bucket}/{key}"),
        );
        headers.insert("x-amz-metadata-directive".to_string(), "REPLACE".to_string());
        for (k, v) in metadata {
            headers.insert(format!("x-amz-meta-{k}"), v.clone());
        }
        let response = self
            .send_signed(Method::PUT, &path, vec![], headers, Bytes::new())
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    /// Best-effort abort. Failures are logged, never propagated — an
    /// upload that can't be aborted must not surface as a client-facing
    /// error, per SPEC_FULL §7's cancellation policy.
    pub async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) {
        let path = self.object_path(bucket, key);
        let result = self
            .send_signed(
                Method::DELETE,
                &path,
                vec![("uploadId".to_string(), upload_id.to_string())],
                BTreeMap::new(),
                Bytes::new(),
            )
            .await;
        match result {
            Ok(response) if response.status() == StatusCode::NO_CONTENT || response.status().is_success() => {}
            Ok(response) => {
                tracing::warn!(status = %response.status(), %bucket, %key, %upload_id, "AbortMultipartUpload returned non-success status");
            }
            Err(err) => {
                tracing::warn!(%err, %bucket, %key, %upload_id, "AbortMultipartUpload request failed");
            }
        }
    }
}

fn extract_xml_tag(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(xml[start..end].to_string())
}

/// Monotonic-ish timestamp helper used only to label log lines; never
/// used for signing (signing always uses `chrono::Utc::now()` so
/// clock-skew checks against the backend's own clock stay meaningful).
pub fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
