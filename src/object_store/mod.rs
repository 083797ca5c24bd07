mod gcs;
mod local;

pub use gcs::GcsStore;
pub use local::LocalStore;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Store call exceeded deadline of {0:?}")]
    Timeout(Duration),
}

/// Descriptor of a stored object, as returned by `head` and `list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Abstraction over object storage backends.
/// Keys are slash-separated paths; objects are immutable once written except
/// for deliberate overwrites of cache entries.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch metadata for `key`, or `None` if the object does not exist.
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, ObjectStoreError>;
    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError>;
    async fn put(&self, key: &str, data: Bytes) -> Result<(), ObjectStoreError>;
    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError>;
    /// List every object whose key starts with `prefix`, in key order.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>, ObjectStoreError>;
}
