//! Shared fixtures for gateway integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use video_gateway::gateway::{CacheGateway, GatewaySettings};
use video_gateway::object_store::{LocalStore, ObjectMeta, ObjectStore, ObjectStoreError};
use video_gateway::transcoder::{TranscodeFailure, Transcoder};
use video_gateway::workdir::WorkDir;

pub const SOURCE_KEY: &str = "2025/01/seacliff-2025-01-02T03:04-00-0800.mp4";

pub fn settings() -> GatewaySettings {
    GatewaySettings {
        display_timezone: chrono_tz::America::Los_Angeles,
        watermark: "fogcat5".to_string(),
        store_timeout: Duration::from_secs(5),
    }
}

/// Copies the source with a `rendered:` prefix and records every call.
#[derive(Default)]
pub struct RecordingTranscoder {
    pub calls: AtomicUsize,
    pub overlays: Mutex<Vec<(String, String)>>,
    pub delay: Duration,
}

impl RecordingTranscoder {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcoder for RecordingTranscoder {
    async fn run(
        &self,
        input: &Path,
        output: &Path,
        overlay_text: &str,
        watermark_text: &str,
    ) -> Result<(), TranscodeFailure> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.overlays
            .lock()
            .unwrap()
            .push((overlay_text.to_string(), watermark_text.to_string()));
        tokio::time::sleep(self.delay).await;

        let mut data = format!("rendered#{call}:").into_bytes();
        data.extend(tokio::fs::read(input).await.map_err(TranscodeFailure::Spawn)?);
        tokio::fs::write(output, data)
            .await
            .map_err(TranscodeFailure::Spawn)
    }
}

/// Leaves a partial output behind and reports a non-zero exit.
#[derive(Default)]
pub struct FailingTranscoder {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Transcoder for FailingTranscoder {
    async fn run(
        &self,
        _input: &Path,
        output: &Path,
        _overlay_text: &str,
        _watermark_text: &str,
    ) -> Result<(), TranscodeFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::fs::write(output, b"partial")
            .await
            .map_err(TranscodeFailure::Spawn)?;
        Err(TranscodeFailure::Exit {
            code: Some(1),
            stderr: "moov atom not found".to_string(),
        })
    }
}

/// Never finishes on its own.
pub struct HangingTranscoder;

#[async_trait]
impl Transcoder for HangingTranscoder {
    async fn run(
        &self,
        _input: &Path,
        _output: &Path,
        _overlay_text: &str,
        _watermark_text: &str,
    ) -> Result<(), TranscodeFailure> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// Wraps a store and makes uploads fail.
pub struct ReadOnlyStore(pub Arc<dyn ObjectStore>);

#[async_trait]
impl ObjectStore for ReadOnlyStore {
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, ObjectStoreError> {
        self.0.head(key).await
    }
    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        self.0.get(key).await
    }
    async fn put(&self, _key: &str, _data: Bytes) -> Result<(), ObjectStoreError> {
        Err(ObjectStoreError::Backend("403 Forbidden".to_string()))
    }
    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        self.0.exists(key).await
    }
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>, ObjectStoreError> {
        self.0.list(prefix).await
    }
}

/// Wraps a store and stalls every metadata lookup.
pub struct StalledStore;

#[async_trait]
impl ObjectStore for StalledStore {
    async fn head(&self, _key: &str) -> Result<Option<ObjectMeta>, ObjectStoreError> {
        std::future::pending().await
    }
    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        Err(ObjectStoreError::NotFound(key.to_string()))
    }
    async fn put(&self, _key: &str, _data: Bytes) -> Result<(), ObjectStoreError> {
        Ok(())
    }
    async fn exists(&self, _key: &str) -> Result<bool, ObjectStoreError> {
        Ok(false)
    }
    async fn list(&self, _prefix: &str) -> Result<Vec<ObjectMeta>, ObjectStoreError> {
        Ok(Vec::new())
    }
}

pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub store: Arc<dyn ObjectStore>,
    pub workdir: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> =
            Arc::new(LocalStore::new(dir.path().join("bucket")).unwrap());
        let workdir = dir.path().join("video");
        Self { dir, store, workdir }
    }

    pub async fn seed(&self, key: &str, data: &'static [u8]) {
        self.store.put(key, Bytes::from_static(data)).await.unwrap();
    }

    pub fn gateway(&self, transcoder: Arc<dyn Transcoder>) -> CacheGateway {
        self.gateway_with_store(Arc::clone(&self.store), transcoder)
    }

    pub fn gateway_with_store(
        &self,
        store: Arc<dyn ObjectStore>,
        transcoder: Arc<dyn Transcoder>,
    ) -> CacheGateway {
        CacheGateway::new(store, transcoder, WorkDir::new(&self.workdir), settings())
    }

    /// Files currently present in the scratch directory.
    pub fn scratch_files(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(&self.workdir) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }
}
