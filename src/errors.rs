use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: message.into(),
        }
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: message.into(),
        }
    }

    pub fn internal(err: impl std::error::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::internal(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        Self::internal(err)
    }
}

impl From<TrackerError> for AppError {
    fn from(err: TrackerError) -> Self {
        match err {
            TrackerError::SnapshotNotFound(_) => Self::not_found(err.to_string()),
            TrackerError::ConfirmationRequired => Self::conflict(err.to_string()),
            TrackerError::Store(inner) => Self::internal(inner),
            TrackerError::Export(inner) => Self::internal(inner),
        }
    }
}

impl From<ClientError> for AppError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Unauthorized => Self {
                status: StatusCode::UNAUTHORIZED,
                message: err.to_string(),
            },
            ClientError::Status { .. } | ClientError::Transport(_) | ClientError::Decode(_) => {
                Self::bad_gateway(err.to_string())
            }
            ClientError::NotConfigured => Self::unavailable(err.to_string()),
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        (self.status, self.message).into_response()
    }
}

/// Failures of a [`crate::storage::KeyValueStore`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored value for '{key}' is not valid JSON: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("no snapshot at index {0}")]
    SnapshotNotFound(usize),

    #[error("clearing history must be confirmed")]
    ConfirmationRequired,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("csv export failed: {0}")]
    Export(#[from] csv::Error),
}

/// Failures talking to the remote CRM backend.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The backend rejected the bearer token; the session must be dropped.
    #[error("session expired or token rejected")]
    Unauthorized,

    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("CRM backend url is not configured")]
    NotConfigured,
}
