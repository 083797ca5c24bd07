use thiserror::Error;

use crate::object_store::ObjectStoreError;
use crate::transcoder::TranscodeFailure;

/// Outcome classes of a failed [`serve`](super::CacheGateway::serve) call.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("{0} does not exist")]
    NotFound(String),
    #[error("transcoding {key} failed: {failure}")]
    TranscodeFailed {
        key: String,
        #[source]
        failure: TranscodeFailure,
    },
    #[error("internal error serving {key}: {cause}")]
    Internal {
        key: String,
        #[source]
        cause: InternalCause,
    },
}

#[derive(Debug, Error)]
pub enum InternalCause {
    #[error(transparent)]
    Store(#[from] ObjectStoreError),
    #[error("scratch file I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl ServeError {
    pub(crate) fn from_store(key: &str, e: ObjectStoreError) -> Self {
        match e {
            ObjectStoreError::NotFound(_) => ServeError::NotFound(key.to_string()),
            other => ServeError::Internal {
                key: key.to_string(),
                cause: other.into(),
            },
        }
    }

    pub(crate) fn from_io(key: &str, e: std::io::Error) -> Self {
        ServeError::Internal {
            key: key.to_string(),
            cause: e.into(),
        }
    }

    /// Logical key the failed request was for.
    pub fn key(&self) -> &str {
        match self {
            ServeError::NotFound(key) => key,
            ServeError::TranscodeFailed { key, .. } | ServeError::Internal { key, .. } => key,
        }
    }

    /// True when the remote store could not be reached or refused the call.
    /// These are safe to retry with backoff.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(
            self,
            ServeError::Internal {
                cause: InternalCause::Store(_),
                ..
            }
        )
    }
}
