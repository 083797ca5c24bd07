//! video-gateway - serves webcam segments with a burned-in timestamp and watermark
//!
//! This crate provides:
//! - A cache gateway that renders each source segment once and keeps the result in object storage
//! - Swappable object storage backends (local filesystem, GCS)
//! - An external transcoder seam with an ffmpeg implementation
//! - A monthly catalog of segments parsed from object names
//! - A small REST surface for videos, the catalog and health

pub mod api;
pub mod catalog;
pub mod config;
pub mod gateway;
pub mod object_store;
#[cfg(test)]
pub mod testutil;
pub mod transcoder;
pub mod workdir;

use std::sync::Arc;

use catalog::Catalog;
use config::Config;
use gateway::CacheGateway;

/// Shared application state
pub struct AppState {
    pub catalog: Catalog,
    pub config: Config,
    pub gateway: CacheGateway,
    pub object_store: Arc<dyn object_store::ObjectStore>,
}
