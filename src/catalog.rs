//! Catalog of recorded segments, derived from object names.
//!
//! Source keys look like `2025/01/seacliff-2025-01-02T03:04-00-0800.mp4`:
//! year, month, location, local capture time, segment number and the
//! UTC offset of the capture time (always west of UTC, so `0800` is `-08:00`).

use std::sync::{Arc, LazyLock};

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::config::CatalogConfig;
use crate::object_store::{ObjectMeta, ObjectStore, ObjectStoreError};

static KEY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4})/(\d{2})/(.*)-(\d{4}-\d{2}-\d{2}T\d{2}:\d{2})-(\d{2})-(\d{4})\.mp4")
        .expect("catalog key pattern is valid")
});

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("No videos found under {0}")]
    Empty(String),
    #[error(transparent)]
    Store(#[from] ObjectStoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub id: String,
    pub location: String,
    /// Capture time in UTC, RFC 3339 with a `Z` suffix
    pub timestamp: String,
    pub url: String,
    #[serde(skip)]
    pub captured_at: DateTime<Utc>,
}

/// Parse a source key into a catalog entry; `None` for keys that do not
/// follow the segment naming scheme.
pub fn parse(key: &str, public_base_url: &str) -> Option<CatalogEntry> {
    let caps = KEY_PATTERN.captures(key)?;
    let (year, month, location) = (&caps[1], &caps[2], &caps[3]);
    let (local_time, segment, offset) = (&caps[4], &caps[5], &caps[6]);

    let captured_at = match DateTime::parse_from_str(
        &format!("{local_time}-{offset}"),
        "%Y-%m-%dT%H:%M%z",
    ) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(e) => {
            tracing::warn!(key, error = %e, "Skipping catalog entry with unparseable timestamp");
            return None;
        }
    };

    let base = public_base_url.trim_end_matches('/');
    Some(CatalogEntry {
        id: key.to_string(),
        location: location.to_string(),
        timestamp: captured_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        url: format!("{base}/{year}/{month}/{location}-{local_time}-{segment}-{offset}.mp4"),
        captured_at,
    })
}

/// Most recently updated object, if any.
pub fn latest(objects: &[ObjectMeta]) -> Option<&ObjectMeta> {
    objects.iter().max_by_key(|obj| obj.updated_at)
}

pub struct Catalog {
    store: Arc<dyn ObjectStore>,
    config: CatalogConfig,
}

impl Catalog {
    pub fn new(store: Arc<dyn ObjectStore>, config: CatalogConfig) -> Self {
        Self { store, config }
    }

    /// Listing prefix for the month containing `now`, e.g. `2025/01/seacliff`.
    pub fn window_prefix(&self, now: DateTime<Utc>) -> String {
        format!("{}/{}", now.format("%Y/%m"), self.config.location)
    }

    /// Objects under `prefix`; an empty window is an empty list.
    pub async fn list_for_window(&self, prefix: &str) -> Result<Vec<ObjectMeta>, CatalogError> {
        Ok(self.store.list(prefix).await?)
    }

    /// Key of the most recently updated object in the current window.
    /// Fails with [`CatalogError::Empty`] when nothing was recorded yet.
    pub async fn latest_key(&self, now: DateTime<Utc>) -> Result<String, CatalogError> {
        let prefix = self.window_prefix(now);
        let objects = self.list_for_window(&prefix).await?;
        let newest = latest(&objects).ok_or(CatalogError::Empty(prefix))?;
        tracing::info!(
            key = %newest.key,
            size = newest.size,
            created_at = %newest.created_at,
            "Latest blob"
        );
        Ok(newest.key.clone())
    }

    /// Parsed entries for the current window, newest capture first.
    pub async fn entries(&self, now: DateTime<Utc>) -> Result<Vec<CatalogEntry>, CatalogError> {
        let objects = self.list_for_window(&self.window_prefix(now)).await?;
        let mut entries: Vec<CatalogEntry> = objects
            .iter()
            .filter_map(|obj| parse(&obj.key, &self.config.public_base_url))
            .collect();
        entries.sort_by(|a, b| b.captured_at.cmp(&a.captured_at));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const BASE: &str = "https://example.test/video";

    #[test]
    fn parses_segment_key() {
        let entry = parse("2025/01/seacliff-2025-01-02T03:04-07-0800.mp4", BASE).unwrap();
        assert_eq!(entry.location, "seacliff");
        assert_eq!(entry.timestamp, "2025-01-02T11:04:00Z");
        assert_eq!(
            entry.url,
            "https://example.test/video/2025/01/seacliff-2025-01-02T03:04-07-0800.mp4"
        );
        assert_eq!(
            entry.captured_at,
            Utc.with_ymd_and_hms(2025, 1, 2, 11, 4, 0).unwrap()
        );
    }

    #[test]
    fn malformed_keys_are_skipped() {
        assert!(parse("2025/01/seacliff.mp4", BASE).is_none());
        assert!(parse("notes/readme.txt", BASE).is_none());
        // Matches the shape but month 13 does not exist
        assert!(parse("2025/13/seacliff-2025-13-02T03:04-00-0800.mp4", BASE).is_none());
    }

    #[test]
    fn latest_picks_max_updated() {
        let at = |h| Utc.with_ymd_and_hms(2025, 1, 2, h, 0, 0).unwrap();
        let objects = vec![
            ObjectMeta { key: "a".into(), size: 1, created_at: at(1), updated_at: at(5) },
            ObjectMeta { key: "b".into(), size: 1, created_at: at(9), updated_at: at(7) },
            ObjectMeta { key: "c".into(), size: 1, created_at: at(3), updated_at: at(6) },
        ];
        assert_eq!(latest(&objects).map(|o| o.key.as_str()), Some("b"));
        assert!(latest(&[]).is_none());
    }
}
