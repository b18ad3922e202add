use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;

use crate::error::{AppError, AppResult};

/// Key prefix for uploaded school logos.
pub const LOGO_PREFIX: &str = "school_logos";

/// Object storage for uploaded files.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Bytes) -> anyhow::Result<()>;

    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;

    /// Removing a missing object is not an error.
    async fn remove(&self, key: &str) -> anyhow::Result<()>;

    /// Public retrieval URL for `key`.
    fn url(&self, key: &str) -> String;

    /// Inverse of [`BlobStore::url`] for URLs this store issued.
    fn key_for_url(&self, url: &str) -> Option<String>;
}

/// Blob store on the local filesystem, served back by the API under
/// `public_base`.
pub struct LocalBlobStore {
    root: PathBuf,
    public_base: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base: public_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn ensure_root(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    fn resolve(&self, key: &str) -> anyhow::Result<PathBuf> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && !key.contains('\\')
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            anyhow::bail!("Invalid object key: {key}");
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, key: &str, bytes: Bytes) -> anyhow::Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &bytes).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key)
    }

    fn key_for_url(&self, url: &str) -> Option<String> {
        url.strip_prefix(&self.public_base)?
            .strip_prefix('/')
            .filter(|k| !k.is_empty())
            .map(str::to_string)
    }
}

/// A file received from a client.
#[derive(Debug, Clone)]
pub struct AssetUpload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredAsset {
    pub key: String,
    pub url: String,
}

pub fn detect_image_ext(content_type: &str, filename: &str) -> Option<&'static str> {
    match content_type {
        "image/png" => return Some("png"),
        "image/jpeg" | "image/jpg" => return Some("jpg"),
        "image/webp" => return Some("webp"),
        "image/gif" => return Some("gif"),
        _ => {}
    }
    let ext = filename.rsplit('.').next()?.to_lowercase();
    match ext.as_str() {
        "png" => Some("png"),
        "jpg" | "jpeg" => Some("jpg"),
        "webp" => Some("webp"),
        "gif" => Some("gif"),
        _ => None,
    }
}

/// Keeps the last path component and replaces anything outside
/// `[A-Za-z0-9._-]` with `_`.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(100)
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// `school_logos/<unix millis>_<filename>`. The timestamp only makes
/// collisions unlikely.
pub fn logo_key(filename: &str, unix_millis: i64) -> String {
    format!("{LOGO_PREFIX}/{unix_millis}_{}", sanitize_filename(filename))
}

/// Validates an image upload, stores it and returns its retrieval URL.
pub async fn upload_asset(
    blobs: &dyn BlobStore,
    upload: &AssetUpload,
    max_bytes: usize,
) -> AppResult<StoredAsset> {
    if detect_image_ext(&upload.content_type, &upload.filename).is_none() {
        return Err(AppError::Validation(
            "Unsupported logo format. Use PNG, JPG, WebP or GIF.".into(),
        ));
    }
    if upload.bytes.is_empty() {
        return Err(AppError::Validation("Logo file is empty.".into()));
    }
    if upload.bytes.len() > max_bytes {
        return Err(AppError::Validation(format!(
            "Logo file too large (max {} KB).",
            max_bytes / 1024
        )));
    }

    let key = logo_key(&upload.filename, Utc::now().timestamp_millis());
    blobs
        .put(&key, upload.bytes.clone())
        .await
        .map_err(|e| AppError::Remote(format!("Logo upload failed: {e}")))?;
    let url = blobs.url(&key);
    tracing::info!("Logo uploaded: {}", url);
    Ok(StoredAsset { key, url })
}
