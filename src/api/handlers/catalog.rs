use axum::extract::State;
use axum::Json;
use chrono::Utc;
use std::sync::Arc;

use crate::api::response::{ApiError, JSend};
use crate::catalog::CatalogEntry;
use crate::AppState;

/// Segments recorded this month, newest first.
/// Route: GET /api
pub async fn list_videos(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<Vec<CatalogEntry>>>, ApiError> {
    let entries = state.catalog.entries(Utc::now()).await?;
    tracing::debug!(count = entries.len(), "Listed catalog");
    Ok(JSend::success(entries))
}
