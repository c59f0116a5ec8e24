//! Local disk storage
//!
//! Files live flat under one directory and are referenced as
//! `{url_prefix}/{file_name}`; the router serves that prefix from the same
//! directory.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{DeleteOutcome, ImageStore, StorageError, StorageResult, UploadedImage};

#[derive(Debug, Clone)]
pub struct LocalImageStore {
    root: PathBuf,
    url_prefix: String,
}

impl LocalImageStore {
    /// Create the store, creating `root` if needed
    ///
    /// `url_prefix` is expected in normalized form (`/uploads`).
    pub async fn new(root: PathBuf, url_prefix: String) -> StorageResult<Self> {
        fs::create_dir_all(&root).await?;
        Ok(Self { root, url_prefix })
    }

    /// `{unix_millis}-{12 hex}-{stem}.{ext}`
    fn file_name_for(image: &UploadedImage) -> String {
        let random = uuid::Uuid::new_v4().simple().to_string();
        format!(
            "{}-{}-{}.{}",
            shared::util::now_millis(),
            &random[..12],
            image.sanitized_stem(),
            image.kind.extension()
        )
    }

    /// Map a reference back to a path inside `root`
    ///
    /// Only `{url_prefix}/{plain file name}` is accepted.
    pub fn path_for(&self, reference: &str) -> StorageResult<PathBuf> {
        let file_name = reference
            .strip_prefix(self.url_prefix.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| StorageError::InvalidReference(reference.to_string()))?;

        let mut components = Path::new(file_name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) if !file_name.contains('\\') => {
                Ok(self.root.join(file_name))
            }
            _ => Err(StorageError::InvalidReference(reference.to_string())),
        }
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    fn backend(&self) -> &'static str {
        "local"
    }

    async fn store(&self, image: &UploadedImage) -> StorageResult<String> {
        let file_name = Self::file_name_for(image);
        let path = self.root.join(&file_name);

        // create_new: an existing file is never overwritten
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;

        let written = async {
            file.write_all(&image.data).await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = written {
            drop(file);
            if let Err(remove_err) = fs::remove_file(&path).await {
                tracing::warn!(path = %path.display(), error = %remove_err, "Failed to remove partial upload");
            }
            return Err(e.into());
        }

        tracing::debug!(file = %file_name, size = image.len(), "Image stored on disk");
        Ok(format!("{}/{}", self.url_prefix, file_name))
    }

    async fn delete(&self, reference: &str) -> StorageResult<DeleteOutcome> {
        let path = self.path_for(reference)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(DeleteOutcome::Deleted),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DeleteOutcome::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, reference: &str) -> StorageResult<bool> {
        let path = self.path_for(reference)?;
        Ok(fs::try_exists(&path).await?)
    }
}
