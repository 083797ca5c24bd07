use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::transcoder::escape_drawtext;

/// Prefix under which rendered copies are stored.
pub const CACHE_PREFIX: &str = "cache/";

/// Cache object key for a source key: `cache/<key with '/' as '_'>.mp4`.
///
/// The layout is shared with existing cache entries and must not change.
/// Catalog keys have exactly two slashes at fixed positions
/// (`YYYY/MM/<name>`), which keeps the mapping collision-free over them.
pub fn derive_cache_key(source_key: &str) -> String {
    format!("{CACHE_PREFIX}{}", flatten(source_key))
}

/// Filename stem for scratch copies of `source_key`.
pub fn scratch_base_name(source_key: &str) -> String {
    flatten(source_key)
}

fn flatten(source_key: &str) -> String {
    format!("{}.mp4", source_key.replace('/', "_"))
}

/// Top-left overlay: the creation time rendered in `tz`, drawtext-escaped.
/// e.g. `Jan 2, 2025 3\:04 AM PST`
pub fn overlay_text(created_at: DateTime<Utc>, tz: Tz) -> String {
    let local = created_at.with_timezone(&tz);
    escape_drawtext(&local.format("%b %-d, %Y %-I:%M %p %Z").to_string())
}
