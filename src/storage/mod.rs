//! Blob storage for uploaded files.
//!
//! Files live in a bucket directory on the local filesystem and are served
//! back under [`FILES_ROUTE`].

use std::path::{Path, PathBuf};

use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::errors::AppError;

/// Route prefix stored files are served from.
pub const FILES_ROUTE: &str = "/files";

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 6;

/// A file persisted in the bucket.
#[derive(Debug, Clone, Serialize)]
pub struct StoredFile {
    /// Object name inside the bucket
    pub path: String,
    /// Public retrieval URL
    pub url: String,
}

/// Filesystem-backed upload bucket.
#[derive(Debug, Clone)]
pub struct BlobStore {
    bucket_dir: PathBuf,
    public_url: String,
    max_bytes: usize,
}

impl BlobStore {
    pub fn new(upload_dir: &Path, bucket: &str, public_url: &str, max_bytes: usize) -> Self {
        Self {
            bucket_dir: upload_dir.join(bucket),
            public_url: public_url.trim_end_matches('/').to_string(),
            max_bytes,
        }
    }

    pub fn bucket_dir(&self) -> &Path {
        &self.bucket_dir
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Create the bucket directory if it does not exist yet.
    pub async fn ensure_bucket(&self) -> Result<(), AppError> {
        if tokio::fs::try_exists(&self.bucket_dir).await.unwrap_or(false) {
            return Ok(());
        }
        // create_dir_all treats an existing directory as success
        tokio::fs::create_dir_all(&self.bucket_dir).await?;
        tracing::info!("Created storage bucket: {}", self.bucket_dir.display());
        Ok(())
    }

    /// Store `bytes` under a fresh object name derived from the current time.
    pub async fn put(
        &self,
        original_name: Option<&str>,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<StoredFile, AppError> {
        if bytes.is_empty() {
            return Err(AppError::BadRequest("Uploaded file is empty".to_string()));
        }
        if bytes.len() > self.max_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "File exceeds the {} byte limit",
                self.max_bytes
            )));
        }

        if let Err(e) = self.ensure_bucket().await {
            tracing::warn!("Bucket initialization error (continuing): {}", e);
        }

        let path = object_name(original_name);
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.bucket_dir.join(&path))
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    AppError::Conflict(format!("Object {} already exists", path))
                }
                _ => AppError::from(e),
            })?;
        file.write_all(bytes).await?;
        file.flush().await?;

        tracing::info!(
            "Stored upload {} ({} bytes, {})",
            path,
            bytes.len(),
            content_type.unwrap_or("unknown type")
        );

        Ok(StoredFile {
            url: format!("{}{}/{}", self.public_url, FILES_ROUTE, path),
            path,
        })
    }
}

/// `<millis>-<random base36>.<ext>`
fn object_name(original_name: Option<&str>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!(
        "{}-{}.{}",
        Utc::now().timestamp_millis(),
        suffix,
        extension(original_name)
    )
}

fn extension(original_name: Option<&str>) -> String {
    original_name
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| "bin".to_string())
}
