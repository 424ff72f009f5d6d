//! Photo uploads go to an external object store; bookings only keep the
//! public URL it hands back.

use async_trait::async_trait;
use url::Url;

use crate::error::AppError;

#[async_trait]
pub trait PhotoStore: Send + Sync {
    /// Stores `bytes` under `name` and returns the object's public URL.
    async fn put(&self, name: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, AppError>;
}

/// Supabase-style storage REST API: `POST {base}/storage/v1/object/{bucket}/{name}`.
pub struct SupabaseStorage {
    client: reqwest::Client,
    base: Url,
    key: String,
    bucket: String,
}

impl SupabaseStorage {
    pub fn new(base: &str, key: String, bucket: String) -> Result<Self, url::ParseError> {
        let mut base = Url::parse(base)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(SupabaseStorage {
            client: reqwest::Client::new(),
            base,
            key,
            bucket,
        })
    }

    fn object_url(&self, name: &str) -> Result<Url, AppError> {
        self.base
            .join(&format!("storage/v1/object/{}/{}", self.bucket, name))
            .map_err(|e| AppError::ObjectStorage(e.to_string()))
    }

    pub fn public_url(&self, name: &str) -> Result<Url, AppError> {
        self.base
            .join(&format!("storage/v1/object/public/{}/{}", self.bucket, name))
            .map_err(|e| AppError::ObjectStorage(e.to_string()))
    }
}

#[async_trait]
impl PhotoStore for SupabaseStorage {
    async fn put(&self, name: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, AppError> {
        let response = self
            .client
            .post(self.object_url(name)?)
            .bearer_auth(&self.key)
            .header("apikey", &self.key)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| AppError::ObjectStorage(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ObjectStorage(format!("{}: {}", status, body)));
        }

        let url = self.public_url(name)?;
        info!("Photo stored at {}", url);
        Ok(url.to_string())
    }
}

/// Used when no storage endpoint is configured: every upload is refused.
pub struct DisabledStorage;

#[async_trait]
impl PhotoStore for DisabledStorage {
    async fn put(&self, _name: &str, _bytes: Vec<u8>, _content_type: &str) -> Result<String, AppError> {
        Err(AppError::ObjectStorage("photo storage is not configured".into()))
    }
}

pub fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/heic" => "heic",
        _ => "jpg",
    }
}
