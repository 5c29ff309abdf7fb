use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};

pub const MEDIA_DIR: &str = "media";

/// Stores an entry's image somewhere servable and returns its public URI.
#[async_trait]
pub trait StageMedia: Send + Sync {
    async fn stage(&self, image_url: &str) -> Result<String>;
}

/// Downloads images into `<root>/media/`, named by the hash of their source URL.
pub struct MediaDownloader {
    client: Client,
    dir: PathBuf,
    base_url: String,
}

impl MediaDownloader {
    pub fn new(root: impl Into<PathBuf>, base_url: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            dir: root.into().join(MEDIA_DIR),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn uri_for(&self, file_name: &str) -> String {
        format!("{}/{}/{}", self.base_url, MEDIA_DIR, file_name)
    }
}

#[async_trait]
impl StageMedia for MediaDownloader {
    async fn stage(&self, image_url: &str) -> Result<String> {
        let stem = hex::encode(Sha256::digest(image_url.as_bytes()));

        // Already staged by an earlier run
        if let Some(existing) = find_staged(&self.dir, &stem).await? {
            return Ok(self.uri_for(&existing));
        }

        let response = self
            .client
            .get(image_url)
            .send()
            .await
            .map_err(|e| AppError::Media(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::Media(format!("HTTP {}", response.status())));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let ext = image_extension(&content_type)
            .ok_or_else(|| AppError::Media(format!("not an image: {:?}", content_type)))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::Media(e.to_string()))?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let file_name = format!("{}.{}", stem, ext);
        tokio::fs::write(self.dir.join(&file_name), &bytes).await?;
        tracing::debug!("Staged {} bytes from {} as {}", bytes.len(), image_url, file_name);

        Ok(self.uri_for(&file_name))
    }
}

async fn find_staged(dir: &Path, stem: &str) -> Result<Option<String>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(AppError::Io(e)),
    };
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.split('.').next() == Some(stem) {
            return Ok(Some(name));
        }
    }
    Ok(None)
}

fn image_extension(content_type: &str) -> Option<&'static str> {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    match essence.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/avif" => Some("avif"),
        "image/svg+xml" => Some("svg"),
        other if other.starts_with("image/") => Some("img"),
        _ => None,
    }
}
