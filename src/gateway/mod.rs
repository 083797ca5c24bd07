//! On-demand overlay rendering with a write-once cache in the object store.
//!
//! `serve` answers from `cache/` when a rendered copy exists. Otherwise it
//! downloads the source into scratch files, runs the transcoder, uploads the
//! result and returns it. Rendering is single-flight per cache key: callers
//! that arrive while a render is running wait for it and are then served the
//! uploaded copy.

mod error;
mod inflight;
mod keys;

pub use error::{InternalCause, ServeError};
pub use keys::{derive_cache_key, overlay_text, scratch_base_name, CACHE_PREFIX};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono_tz::Tz;

use crate::config::Config;
use crate::object_store::{ObjectMeta, ObjectStore, ObjectStoreError};
use crate::transcoder::Transcoder;
use crate::workdir::{ScratchPaths, WorkDir};
use inflight::KeyedLocks;

pub const VIDEO_MP4: &str = "video/mp4";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServedVideo {
    pub bytes: Bytes,
    pub content_type: &'static str,
    pub cache: CacheStatus,
}

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub display_timezone: Tz,
    pub watermark: String,
    /// Deadline for each individual store call
    pub store_timeout: Duration,
}

impl GatewaySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            display_timezone: config.transcode.display_timezone,
            watermark: config.transcode.watermark.clone(),
            store_timeout: config.storage.request_timeout,
        }
    }
}

pub struct CacheGateway {
    store: Arc<dyn ObjectStore>,
    transcoder: Arc<dyn Transcoder>,
    workdir: WorkDir,
    settings: GatewaySettings,
    in_flight: KeyedLocks,
}

impl CacheGateway {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        transcoder: Arc<dyn Transcoder>,
        workdir: WorkDir,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            store,
            transcoder,
            workdir,
            settings,
            in_flight: KeyedLocks::default(),
        }
    }

    /// Serve the rendered copy of `key`, producing and caching it on first request.
    #[tracing::instrument(skip(self))]
    pub async fn serve(&self, key: &str) -> Result<ServedVideo, ServeError> {
        let source = self
            .store_call(self.store.head(key))
            .await
            .map_err(|e| ServeError::from_store(key, e))?
            .ok_or_else(|| {
                tracing::error!(key, "Source object does not exist");
                ServeError::NotFound(key.to_string())
            })?;

        let cache_key = derive_cache_key(&source.key);
        tracing::info!(cache_key = %cache_key, "Resolved cache path");

        if let Some(served) = self.cached(key, &cache_key).await? {
            return Ok(served);
        }

        let _render_slot = self.in_flight.lock(&cache_key).await;

        // Another request may have rendered it while we waited
        if let Some(served) = self.cached(key, &cache_key).await? {
            return Ok(served);
        }

        self.regenerate(key, &source, &cache_key).await
    }

    async fn cached(&self, key: &str, cache_key: &str) -> Result<Option<ServedVideo>, ServeError> {
        let present = self
            .store_call(self.store.exists(cache_key))
            .await
            .map_err(|e| ServeError::from_store(key, e))?;
        if !present {
            return Ok(None);
        }

        match self.store_call(self.store.get(cache_key)).await {
            Ok(bytes) => {
                tracing::info!(cache_key, bytes = bytes.len(), "Serving cached video");
                Ok(Some(ServedVideo {
                    bytes,
                    content_type: VIDEO_MP4,
                    cache: CacheStatus::Hit,
                }))
            }
            // Vanished between exists and get
            Err(ObjectStoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(ServeError::from_store(key, e)),
        }
    }

    async fn regenerate(
        &self,
        key: &str,
        source: &ObjectMeta,
        cache_key: &str,
    ) -> Result<ServedVideo, ServeError> {
        let scratch = self
            .workdir
            .allocate(&scratch_base_name(&source.key))
            .await
            .map_err(|e| ServeError::from_io(key, e))?;

        let result = self.render(key, source, cache_key, scratch.paths()).await;
        scratch.release().await;
        result
    }

    async fn render(
        &self,
        key: &str,
        source: &ObjectMeta,
        cache_key: &str,
        paths: &ScratchPaths,
    ) -> Result<ServedVideo, ServeError> {
        let original = self
            .store_call(self.store.get(&source.key))
            .await
            .map_err(|e| ServeError::from_store(key, e))?;
        tokio::fs::write(&paths.source, &original)
            .await
            .map_err(|e| ServeError::from_io(key, e))?;
        drop(original);

        let title = overlay_text(source.created_at, self.settings.display_timezone);
        self.transcoder
            .run(&paths.source, &paths.processed, &title, &self.settings.watermark)
            .await
            .map_err(|failure| {
                tracing::error!(
                    key,
                    diagnostics = %failure.diagnostics(),
                    "Error processing video"
                );
                ServeError::TranscodeFailed {
                    key: key.to_string(),
                    failure,
                }
            })?;

        let rendered = Bytes::from(
            tokio::fs::read(&paths.processed)
                .await
                .map_err(|e| ServeError::from_io(key, e))?,
        );

        self.store_call(self.store.put(cache_key, rendered.clone()))
            .await
            .map_err(|e| ServeError::from_store(key, e))?;
        tracing::info!(cache_key, bytes = rendered.len(), "Uploaded processed video");

        Ok(ServedVideo {
            bytes: rendered,
            content_type: VIDEO_MP4,
            cache: CacheStatus::Miss,
        })
    }

    async fn store_call<T>(
        &self,
        call: impl Future<Output = Result<T, ObjectStoreError>>,
    ) -> Result<T, ObjectStoreError> {
        let deadline = self.settings.store_timeout;
        tokio::time::timeout(deadline, call)
            .await
            .map_err(|_| ObjectStoreError::Timeout(deadline))?
    }
}
