// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Blob storage client for creating signed photo URLs.
//!
//! Photos live in a private bucket. Clients only ever see time-limited signed
//! URLs minted here; the storage paths themselves stay server-side.

use crate::error::AppError;
use async_trait::async_trait;
use serde::Deserialize;

/// Anything that can mint a signed URL for a storage path.
#[async_trait]
pub trait SignedUrlGenerator: Send + Sync {
    /// Create a URL granting read access to `path` for `ttl_secs` seconds.
    async fn create_signed_url(&self, path: &str, ttl_secs: u64) -> Result<String, AppError>;
}

/// Storage API client (Supabase storage REST protocol).
#[derive(Clone)]
pub struct StorageClient {
    http: reqwest::Client,
    base_url: String,
    bucket: String,
    service_key: String,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

impl StorageClient {
    /// Create a new client for `bucket` on the storage service at `base_url`.
    pub fn new(base_url: &str, bucket: &str, service_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            service_key: service_key.to_string(),
        }
    }

    /// Endpoint that signs `path`. Each path segment is percent-encoded.
    fn sign_endpoint(&self, path: &str) -> String {
        let encoded: Vec<_> = path
            .trim_start_matches('/')
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!(
            "{}/storage/v1/object/sign/{}/{}",
            self.base_url,
            urlencoding::encode(&self.bucket),
            encoded.join("/")
        )
    }

    /// Turn the relative `signedURL` from the API into an absolute URL.
    fn absolute_url(&self, signed: &str) -> String {
        if signed.starts_with("http://") || signed.starts_with("https://") {
            signed.to_string()
        } else {
            format!("{}/storage/v1{}", self.base_url, signed)
        }
    }
}

#[async_trait]
impl SignedUrlGenerator for StorageClient {
    async fn create_signed_url(&self, path: &str, ttl_secs: u64) -> Result<String, AppError> {
        let url = self.sign_endpoint(path);
        tracing::debug!(path, ttl_secs, "Requesting signed URL");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .json(&serde_json::json!({ "expiresIn": ttl_secs }))
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("Sign request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                tracing::warn!("Storage rate limit hit (429)");
            }

            return Err(AppError::UpstreamUnavailable(format!(
                "HTTP {} signing '{}': {}",
                status, path, body
            )));
        }

        let body: SignResponse = response
            .json()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("JSON parse error: {}", e)))?;

        Ok(self.absolute_url(&body.signed_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_endpoint_encodes_segments() {
        let client = StorageClient::new("https://x.supabase.co/", "photos", "key");
        assert_eq!(
            client.sign_endpoint("/users/42/my photo.jpg"),
            "https://x.supabase.co/storage/v1/object/sign/photos/users/42/my%20photo.jpg"
        );
    }

    #[test]
    fn test_absolute_url() {
        let client = StorageClient::new("https://x.supabase.co", "photos", "key");
        assert_eq!(
            client.absolute_url("/object/sign/photos/a.jpg?token=abc"),
            "https://x.supabase.co/storage/v1/object/sign/photos/a.jpg?token=abc"
        );
        assert_eq!(
            client.absolute_url("https://cdn.example.com/a.jpg"),
            "https://cdn.example.com/a.jpg"
        );
    }

    #[tokio::test]
    async fn test_unreachable_storage_is_upstream_error() {
        let client = StorageClient::new("http://127.0.0.1:9", "photos", "key");
        let err = client.create_signed_url("a.jpg", 3600).await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamUnavailable(_)));
    }
}
