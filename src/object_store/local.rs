use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncWriteExt;

use super::{ObjectMeta, ObjectStore, ObjectStoreError};

/// In-progress uploads live next to their target under this name prefix.
const UPLOAD_PREFIX: &str = ".upload-";

/// Local filesystem object store for development and testing.
/// Slash-separated keys map onto nested directories under `base_path`.
/// Writes land in a temp sibling and are renamed into place, so readers only
/// ever see complete objects.
pub struct LocalStore {
    base_path: PathBuf,
}

impl LocalStore {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, std::io::Error> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    /// Filesystem path for `key`, or `None` for keys this store cannot hold
    /// (empty, absolute, `..`, or colliding with upload temp names).
    fn object_path(&self, key: &str) -> Option<PathBuf> {
        let relative = Path::new(key);
        let storable = relative.components().all(|c| match c {
            Component::Normal(part) => !part.to_string_lossy().starts_with(UPLOAD_PREFIX),
            _ => false,
        });
        if key.is_empty() || !storable {
            return None;
        }
        Some(self.base_path.join(relative))
    }

    fn invalid_key(key: &str) -> ObjectStoreError {
        ObjectStoreError::Backend(format!("Invalid object key: {key}"))
    }

    fn meta_for(key: String, metadata: &std::fs::Metadata) -> ObjectMeta {
        let updated_at: DateTime<Utc> = metadata
            .modified()
            .map(DateTime::from)
            .unwrap_or_else(|_| Utc::now());
        // Not every filesystem records birth time
        let created_at = metadata
            .created()
            .map(DateTime::from)
            .unwrap_or(updated_at);

        ObjectMeta {
            key,
            size: metadata.len(),
            created_at,
            updated_at,
        }
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, ObjectStoreError> {
        let Some(path) = self.object_path(key) else {
            return Ok(None);
        };
        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => {
                Ok(Some(Self::meta_for(key.to_string(), &metadata)))
            }
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        let path = self
            .object_path(key)
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ObjectStoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<(), ObjectStoreError> {
        let path = self.object_path(key).ok_or_else(|| Self::invalid_key(key))?;
        let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
            return Err(Self::invalid_key(key));
        };
        tokio::fs::create_dir_all(parent).await?;

        let tmp = parent.join(format!(
            "{UPLOAD_PREFIX}{}-{}",
            uuid::Uuid::new_v4().simple(),
            name.to_string_lossy()
        ));
        if let Err(e) = write_then_rename(&tmp, &path, &data).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        Ok(self.head(key).await?.is_some())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>, ObjectStoreError> {
        let mut objects = Vec::new();
        let mut pending = vec![self.base_path.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let metadata = entry.metadata().await?;
                let path = entry.path();
                if metadata.is_dir() {
                    pending.push(path);
                    continue;
                }

                let uploading = path
                    .file_name()
                    .is_some_and(|n| n.to_string_lossy().starts_with(UPLOAD_PREFIX));
                if uploading {
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&self.base_path) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(prefix) {
                    objects.push(Self::meta_for(key, &metadata));
                }
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }
}

async fn write_then_rename(tmp: &Path, path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(tmp).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(tmp, path).await
}
