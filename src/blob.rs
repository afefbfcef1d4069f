//! Image storage: accepts a payload, returns a publicly fetchable URL.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

use crate::error::AppError;

/// Folder inside the upload root holding shop photos.
const SHOP_IMAGE_DIR: &str = "shops";

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload_image(&self, bytes: &[u8]) -> Result<String, AppError>;
}

/// Writes images under a local directory served at `{public_base}/uploads`.
pub struct LocalBlobStore {
    root: PathBuf,
    public_base: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base: &str) -> Self {
        Self {
            root: root.into(),
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload_image(&self, bytes: &[u8]) -> Result<String, AppError> {
        if bytes.is_empty() {
            return Err(AppError::validation("Image payload is empty"));
        }
        let dir = self.root.join(SHOP_IMAGE_DIR);
        fs::create_dir_all(&dir).await.map_err(|e| {
            error!(?e, dir = %dir.display(), "Failed to prepare upload directory");
            AppError::unavailable(format!("Upload directory unavailable: {e}"))
        })?;

        let stamp = Utc::now().timestamp_millis();
        for attempt in 0u32.. {
            let name = match attempt {
                0 => format!("{stamp}.jpg"),
                n => format!("{stamp}-{n}.jpg"),
            };
            let path = dir.join(&name);
            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(f) => f,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    error!(?e, path = %path.display(), "Failed to create image file");
                    return Err(AppError::unavailable(format!("Image upload failed: {e}")));
                }
            };
            file.write_all(bytes).await.map_err(|e| {
                error!(?e, path = %path.display(), "Failed to write image");
                AppError::unavailable(format!("Image upload failed: {e}"))
            })?;
            file.flush()
                .await
                .map_err(|e| AppError::unavailable(format!("Image upload failed: {e}")))?;

            let url = format!("{}/uploads/{SHOP_IMAGE_DIR}/{name}", self.public_base);
            info!(%url, size = bytes.len(), "image stored");
            return Ok(url);
        }
        Err(AppError::internal("No free image name"))
    }
}
