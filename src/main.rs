use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use video_gateway::{
    api,
    catalog::Catalog,
    config::{Config, StorageBackend},
    gateway::{CacheGateway, GatewaySettings},
    object_store as obj,
    transcoder::FfmpegTranscoder,
    workdir::WorkDir,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "gcp" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_stackdriver::layer())
                .init();
        }
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    info!(version = env!("CARGO_PKG_VERSION"), "video-gateway starting");

    // Load configuration
    let config = Config::load()?;
    info!(
        bucket = %config.storage.bucket,
        working_dir = %config.working_dir,
        timezone = %config.transcode.display_timezone,
        "Loaded configuration"
    );

    // Initialize object store backend
    let object_store: Arc<dyn obj::ObjectStore> = match config.storage.backend {
        StorageBackend::Local => {
            let store = obj::LocalStore::new(&config.storage.local_storage_path)?;
            info!(
                "Using local storage backend at: {}",
                config.storage.local_storage_path
            );
            Arc::new(store)
        }
        StorageBackend::Gcs => {
            let store = obj::GcsStore::new(
                &config.storage.bucket,
                config.storage.gcs_credentials_file.as_deref(),
                config.storage.request_timeout,
            )
            .await?;
            info!("Using GCS storage backend, bucket: {}", config.storage.bucket);
            Arc::new(store)
        }
    };

    let gateway = CacheGateway::new(
        Arc::clone(&object_store),
        Arc::new(FfmpegTranscoder::new(&config.transcode)),
        WorkDir::new(&config.working_dir),
        GatewaySettings::from_config(&config),
    );
    let catalog = Catalog::new(Arc::clone(&object_store), config.catalog.clone());

    // Create shared state
    let state = Arc::new(AppState {
        catalog,
        config: config.clone(),
        gateway,
        object_store,
    });

    // Build and start the HTTP server
    let app = api::create_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!("Listening on: {}", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
