//! Object storage for uploaded media.
//!
//! Keys look like `{uploader_id}/{video_id}.{ext}`; the store hands back a
//! public URL for each key that the feed client can play directly.

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;

/// Route prefix under which the backend serves stored objects.
pub const MEDIA_ROUTE_PREFIX: &str = "/media";

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `data` under `key`. Must fail if the key already exists; an
    /// upload never replaces another object.
    async fn put_new(&self, key: &str, data: Bytes, content_type: &str) -> Result<()>;

    /// Publicly resolvable URL for `key`.
    fn public_url(&self, key: &str) -> String;
}

/// Blob store backed by a directory on local disk.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    public_base: String,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base: public_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a key to its on-disk location, refusing anything that could
    /// escape the root.
    pub fn resolve(&self, key: &str) -> Result<PathBuf> {
        let candidate = Path::new(key);
        if key.is_empty()
            || candidate
                .components()
                .any(|component| !matches!(component, Component::Normal(_)))
        {
            bail!("invalid blob key {key:?}");
        }
        Ok(self.root.join(candidate))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put_new(&self, key: &str, data: Bytes, content_type: &str) -> Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating blob directory {}", parent.display()))?;
        }

        // create_new gives the no-overwrite guarantee atomically.
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .with_context(|| format!("creating blob {key}"))?;

        let written = async {
            file.write_all(&data).await?;
            file.sync_all().await
        }
        .await;

        if let Err(err) = written {
            // Do not leave a truncated object that would block a retry.
            let _ = tokio::fs::remove_file(&path).await;
            return Err(err).with_context(|| format!("writing blob {key}"));
        }

        tracing::debug!(key, content_type, bytes = data.len(), "stored blob");
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}{MEDIA_ROUTE_PREFIX}/{key}", self.public_base)
    }
}
