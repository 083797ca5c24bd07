use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::catalog::CatalogError;
use crate::gateway::ServeError;

// ============================================================================
// JSend status enum
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JSendStatus {
    Error,
    Fail,
    Success,
}

// ============================================================================
// JSend success envelope
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct JSend<T: Serialize> {
    pub data: T,
    pub status: JSendStatus,
}

impl<T: Serialize> JSend<T> {
    pub fn success(data: T) -> Json<JSend<T>> {
        Json(JSend {
            data,
            status: JSendStatus::Success,
        })
    }
}

// ============================================================================
// JSend fail envelope (client errors, 4xx)
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct JSendFail {
    pub data: FailData,
    pub status: JSendStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FailData {
    pub message: String,
}

impl JSendFail {
    pub fn response(
        status_code: StatusCode,
        message: impl Into<String>,
    ) -> (StatusCode, Json<JSendFail>) {
        (
            status_code,
            Json(JSendFail {
                data: FailData {
                    message: message.into(),
                },
                status: JSendStatus::Fail,
            }),
        )
    }
}

// ============================================================================
// JSend error envelope (server errors, 5xx)
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct JSendError {
    pub message: String,
    pub status: JSendStatus,
}

impl JSendError {
    pub fn response(
        status_code: StatusCode,
        message: impl Into<String>,
    ) -> (StatusCode, Json<JSendError>) {
        (
            status_code,
            Json(JSendError {
                message: message.into(),
                status: JSendStatus::Error,
            }),
        )
    }
}

// ============================================================================
// Unified error type for handlers
// ============================================================================

/// A JSend-compatible error that can be either a fail (4xx) or error (5xx).
#[derive(Debug)]
pub enum ApiError {
    Fail(StatusCode, String),
    Error(StatusCode, String),
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::Fail(code, msg) => {
                let (status, json) = JSendFail::response(code, msg);
                (status, json).into_response()
            }
            ApiError::Error(code, msg) => {
                let (status, json) = JSendError::response(code, msg);
                (status, json).into_response()
            }
        }
    }
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::Fail(StatusCode::NOT_FOUND, message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Error(StatusCode::INTERNAL_SERVER_ERROR, message.into())
    }
}

// ============================================================================
// Domain error mapping
// ============================================================================

/// Diagnostics stay in the log; callers only see the error class.
impl From<ServeError> for ApiError {
    fn from(e: ServeError) -> Self {
        match e {
            ServeError::NotFound(key) => ApiError::not_found(format!("{key} does not exist")),
            ServeError::TranscodeFailed { ref key, .. } => {
                ApiError::internal(format!("Failed to process video {key}"))
            }
            ServeError::Internal { ref key, .. } => {
                tracing::error!(key = %key, error = %e, "Failed to serve video");
                ApiError::internal(format!("Failed to retrieve video {key}"))
            }
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::Empty(_) => ApiError::not_found(e.to_string()),
            CatalogError::Store(ref inner) => {
                tracing::error!(error = %inner, "Failed to list catalog");
                ApiError::internal("Failed to list videos")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcoder::TranscodeFailure;

    #[test]
    fn not_found_is_a_fail() {
        let err: ApiError = ServeError::NotFound("2099/01/x.mp4".into()).into();
        assert!(matches!(err, ApiError::Fail(StatusCode::NOT_FOUND, _)));
    }

    #[test]
    fn transcode_diagnostics_are_not_returned() {
        let err: ApiError = ServeError::TranscodeFailed {
            key: "k".into(),
            failure: TranscodeFailure::Exit {
                code: Some(1),
                stderr: "/app/video/secret path: Invalid data".into(),
            },
        }
        .into();
        match err {
            ApiError::Error(code, msg) => {
                assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
                assert!(!msg.contains("secret"));
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn empty_catalog_is_not_found() {
        let err: ApiError = CatalogError::Empty("2025/01/seacliff".into()).into();
        assert!(matches!(err, ApiError::Fail(StatusCode::NOT_FOUND, _)));
    }
}
