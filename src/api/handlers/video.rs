use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use std::sync::Arc;

use crate::api::response::ApiError;
use crate::gateway::ServedVideo;
use crate::AppState;

/// Serve a rendered segment by its source key.
/// Route: GET /video/*key
pub async fn serve_video(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let served = state.gateway.serve(&key).await?;
    Ok(video_response(served))
}

/// Serve the most recently updated segment of the current month.
/// Route: GET /video_latest
pub async fn serve_latest(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let key = state.catalog.latest_key(Utc::now()).await?;
    let served = state.gateway.serve(&key).await?;
    Ok(video_response(served))
}

fn video_response(served: ServedVideo) -> Response {
    let length = served.bytes.len() as u64;
    let mut response = (StatusCode::OK, served.bytes).into_response();
    let headers = response.headers_mut();

    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(served.content_type),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    headers.insert("x-cache", HeaderValue::from_static(served.cache.as_str()));

    response
}
