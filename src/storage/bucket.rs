use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use crate::error::AwardsError;

/// 50 MB, matching the bucket's `file_size_limit`.
pub const MAX_OBJECT_BYTES: usize = 52_428_800;

const PROBE_PATH: &str = "test/permission_probe.txt";

#[derive(Debug, Serialize)]
struct BucketOptions<'a> {
    id: &'a str,
    name: &'a str,
    public: bool,
    file_size_limit: usize,
    allowed_mime_types: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct ListRequest<'a> {
    prefix: &'a str,
    limit: u32,
    offset: u32,
}

#[derive(Debug, Serialize)]
struct RemoveRequest<'a> {
    prefixes: &'a [String],
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ObjectEntry {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketStatus {
    Created,
    Updated,
}

/// Client for the Supabase Storage REST API, scoped to one public bucket.
#[derive(Clone)]
pub struct BucketClient {
    client: Client,
    base_url: Url,
    api_key: String,
    bucket: String,
}

impl BucketClient {
    pub fn new(base_url: &str, api_key: &str, bucket: &str) -> Result<Self, AwardsError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| AwardsError::Config(format!("invalid SUPABASE_URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(AwardsError::Config("SUPABASE_URL must be an http(s) URL".into()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key: api_key.to_string(),
            bucket: bucket.to_string(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            path.extend(segments);
        }
        url
    }

    fn object_url(&self, kind: &str, object_path: &str) -> Url {
        let mut segments = vec!["storage", "v1", "object"];
        if !kind.is_empty() {
            segments.push(kind);
        }
        segments.push(self.bucket.as_str());
        segments.extend(object_path.split('/').filter(|s| !s.is_empty()));
        self.endpoint(segments)
    }

    /// Public download URL; each path segment is percent-encoded.
    pub fn public_url(&self, object_path: &str) -> String {
        self.object_url("public", object_path).to_string()
    }

    pub fn folder_url(&self, folder: &str) -> String {
        self.public_url(folder)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .bearer_auth(&self.api_key)
            .header("apikey", &self.api_key)
    }

    fn options(&self) -> BucketOptions<'_> {
        BucketOptions {
            id: &self.bucket,
            name: &self.bucket,
            public: true,
            file_size_limit: MAX_OBJECT_BYTES,
            allowed_mime_types: None,
        }
    }

    /// Creates the bucket as public, or makes an existing one public again.
    pub async fn ensure_bucket(&self) -> Result<BucketStatus, AwardsError> {
        let response = self
            .authorized(self.client.post(self.endpoint(["storage", "v1", "bucket"])))
            .json(&self.options())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            info!("Created public bucket {}", self.bucket);
            return Ok(BucketStatus::Created);
        }

        let body = response.text().await.unwrap_or_default();
        let exists = status == StatusCode::CONFLICT || body.to_lowercase().contains("already exists");
        if !exists {
            return Err(AwardsError::Storage(format!(
                "create bucket {} failed ({}): {}",
                self.bucket, status, body
            )));
        }

        let response = self
            .authorized(
                self.client
                    .put(self.endpoint(["storage", "v1", "bucket", self.bucket.as_str()])),
            )
            .json(&self.options())
            .send()
            .await?;
        check(response, "update bucket").await?;
        info!("Bucket {} already existed; set to public", self.bucket);
        Ok(BucketStatus::Updated)
    }

    /// Uploads (upserts) one object and returns its public URL.
    pub async fn upload(
        &self,
        object_path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, AwardsError> {
        if bytes.len() > MAX_OBJECT_BYTES {
            return Err(AwardsError::PayloadTooLarge {
                name: object_path.to_string(),
                limit: MAX_OBJECT_BYTES,
            });
        }

        let size = bytes.len();
        let response = self
            .authorized(self.client.post(self.object_url("", object_path)))
            .header("content-type", content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await?;
        check(response, "upload").await?;

        info!("Uploaded {} ({} bytes) to {}", object_path, size, self.bucket);
        Ok(self.public_url(object_path))
    }

    pub async fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>, AwardsError> {
        let response = self
            .authorized(self.client.post(self.endpoint([
                "storage",
                "v1",
                "object",
                "list",
                self.bucket.as_str(),
            ])))
            .json(&ListRequest {
                prefix,
                limit: 100,
                offset: 0,
            })
            .send()
            .await?;
        let response = check(response, "list").await?;
        Ok(response.json::<Vec<ObjectEntry>>().await?)
    }

    pub async fn remove(&self, paths: &[String]) -> Result<(), AwardsError> {
        let response = self
            .authorized(
                self.client
                    .delete(self.endpoint(["storage", "v1", "object", self.bucket.as_str()])),
            )
            .json(&RemoveRequest { prefixes: paths })
            .send()
            .await?;
        check(response, "remove").await?;
        Ok(())
    }

    /// Exercises upload, list and delete against the bucket with a throwaway object.
    pub async fn self_check(&self) -> Result<usize, AwardsError> {
        let url = self
            .upload(PROBE_PATH, b"MD Awards storage permission probe".to_vec(), "text/plain")
            .await?;
        info!("Probe uploaded: {}", url);

        let entries = self.list("test").await?;
        if !entries.iter().any(|e| PROBE_PATH.ends_with(&e.name)) {
            warn!("Probe object missing from listing of {}", self.bucket);
        }

        self.remove(&[PROBE_PATH.to_string()]).await?;
        Ok(entries.len())
    }
}

async fn check(response: reqwest::Response, op: &str) -> Result<reqwest::Response, AwardsError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AwardsError::Storage(format!("{} failed ({}): {}", op, status, body)))
}
