//! Shared test helpers for in-crate handler tests.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::catalog::Catalog;
use crate::config::{CatalogConfig, Config, StorageConfig, TranscodeConfig};
use crate::gateway::{CacheGateway, GatewaySettings};
use crate::object_store::{LocalStore, ObjectStore};
use crate::transcoder::{TranscodeFailure, Transcoder};
use crate::workdir::WorkDir;
use crate::AppState;

/// Writes `rendered:` followed by the source bytes.
pub struct CopyTranscoder;

#[async_trait]
impl Transcoder for CopyTranscoder {
    async fn run(
        &self,
        input: &Path,
        output: &Path,
        _overlay_text: &str,
        _watermark_text: &str,
    ) -> Result<(), TranscodeFailure> {
        let mut data = b"rendered:".to_vec();
        data.extend(tokio::fs::read(input).await.map_err(TranscodeFailure::Spawn)?);
        tokio::fs::write(output, data)
            .await
            .map_err(TranscodeFailure::Spawn)
    }
}

/// Create a test AppState with a local object store and a copying transcoder.
pub fn test_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    let bucket_dir = temp_dir.path().join("bucket");
    let video_dir = temp_dir.path().join("video");

    let config = Config {
        bind_address: "127.0.0.1:0".to_string(),
        catalog: CatalogConfig::default(),
        storage: StorageConfig {
            local_storage_path: bucket_dir.to_string_lossy().to_string(),
            ..StorageConfig::default()
        },
        transcode: TranscodeConfig::default(),
        working_dir: video_dir.to_string_lossy().to_string(),
    };

    let object_store: Arc<dyn ObjectStore> =
        Arc::new(LocalStore::new(&bucket_dir).expect("Failed to create test object store"));
    let gateway = CacheGateway::new(
        Arc::clone(&object_store),
        Arc::new(CopyTranscoder),
        WorkDir::new(&video_dir),
        GatewaySettings::from_config(&config),
    );
    let catalog = Catalog::new(Arc::clone(&object_store), config.catalog.clone());

    Arc::new(AppState {
        catalog,
        config,
        gateway,
        object_store,
    })
}

pub async fn seed_source(state: &AppState, key: &str, data: &[u8]) {
    state
        .object_store
        .put(key, Bytes::copy_from_slice(data))
        .await
        .expect("Failed to seed source object");
}
