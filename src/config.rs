use std::time::Duration;

use chrono_tz::Tz;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub catalog: CatalogConfig,
    pub storage: StorageConfig,
    pub transcode: TranscodeConfig,
    /// Local directory for per-request scratch files
    pub working_dir: String,
}

#[derive(Debug, Clone)]
pub enum StorageBackend {
    Gcs,
    Local,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Bucket holding source segments and the `cache/` prefix
    pub bucket: String,
    /// Directory for local storage backend
    pub local_storage_path: String,
    /// Path to GCS service account JSON (optional, defaults to the metadata server)
    pub gcs_credentials_file: Option<String>,
    /// Deadline applied to every individual store call
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct TranscodeConfig {
    pub ffmpeg_path: String,
    pub font_file: String,
    pub timeout: Duration,
    /// Zone the overlay timestamp is rendered in
    pub display_timezone: Tz,
    pub watermark: String,
}

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Location segment of the monthly listing prefix, e.g. `2025/01/seacliff`
    pub location: String,
    pub public_base_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Gcs,
            bucket: "fogcat-webcam".to_string(),
            local_storage_path: "./bucket".to_string(),
            gcs_credentials_file: None,
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            font_file: "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf".to_string(),
            timeout: Duration::from_secs(300),
            display_timezone: chrono_tz::America::Los_Angeles,
            watermark: "fogcat5".to_string(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            location: "seacliff".to_string(),
            public_base_url: "https://weather.fogcat5.com/collector/video".to_string(),
        }
    }
}

fn env_secs(name: &str, default: u64) -> Result<Duration, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::ValidationError(format!("{name} must be whole seconds"))),
        Err(_) => Ok(Duration::from_secs(default)),
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let storage_defaults = StorageConfig::default();
        let transcode_defaults = TranscodeConfig::default();
        let catalog_defaults = CatalogConfig::default();

        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let working_dir =
            std::env::var("VIDEO_WORKING_DIR").unwrap_or_else(|_| "/app/video".to_string());

        let backend = match std::env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "gcs".to_string())
            .to_lowercase()
            .as_str()
        {
            "local" => StorageBackend::Local,
            _ => StorageBackend::Gcs,
        };

        let display_timezone = match std::env::var("DISPLAY_TIMEZONE") {
            Ok(name) => name.parse::<Tz>().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "DISPLAY_TIMEZONE '{name}' is not an IANA zone"
                ))
            })?,
            Err(_) => transcode_defaults.display_timezone,
        };

        let config = Config {
            bind_address,
            working_dir,
            storage: StorageConfig {
                backend,
                bucket: std::env::var("BUCKET_NAME").unwrap_or(storage_defaults.bucket),
                local_storage_path: std::env::var("LOCAL_STORAGE_PATH")
                    .unwrap_or(storage_defaults.local_storage_path),
                gcs_credentials_file: std::env::var("GCS_CREDENTIALS_FILE").ok(),
                request_timeout: env_secs("STORE_TIMEOUT_SECS", 60)?,
            },
            transcode: TranscodeConfig {
                ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or(transcode_defaults.ffmpeg_path),
                font_file: std::env::var("FONT_FILE").unwrap_or(transcode_defaults.font_file),
                timeout: env_secs("TRANSCODE_TIMEOUT_SECS", 300)?,
                display_timezone,
                watermark: std::env::var("WATERMARK_TEXT").unwrap_or(transcode_defaults.watermark),
            },
            catalog: CatalogConfig {
                location: std::env::var("CATALOG_LOCATION").unwrap_or(catalog_defaults.location),
                public_base_url: std::env::var("PUBLIC_VIDEO_BASE_URL")
                    .unwrap_or(catalog_defaults.public_base_url),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.bucket.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "BUCKET_NAME cannot be empty".to_string(),
            ));
        }

        if self.storage.request_timeout.is_zero() || self.transcode.timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "STORE_TIMEOUT_SECS and TRANSCODE_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        // The watermark is wrapped in single quotes inside the filter graph
        if self.transcode.watermark.contains('\'') {
            return Err(ConfigError::ValidationError(
                "WATERMARK_TEXT must not contain single quotes".to_string(),
            ));
        }

        let dangerous_chars = [';', '|', '&', '$', '`', '(', ')', '<', '>', '\n', '\r'];
        if self.transcode.ffmpeg_path.chars().any(|c| dangerous_chars.contains(&c)) {
            return Err(ConfigError::ValidationError(
                "FFMPEG_PATH contains shell metacharacters".to_string(),
            ));
        }

        if self.working_dir.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "VIDEO_WORKING_DIR cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}
