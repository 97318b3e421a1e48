use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ScannerError {
    #[error("scanning engine unreachable at {endpoint}: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("scanning engine answered {endpoint} with HTTP {status}")]
    Status { endpoint: &'static str, status: u16 },
    #[error("malformed reply from {endpoint}: {reason}")]
    Decode {
        endpoint: &'static str,
        reason: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("remote collector unreachable at {path}: {source}")]
    Transport {
        path: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("remote collector answered {path} with HTTP {status}: {body}")]
    Status {
        path: &'static str,
        status: u16,
        body: String,
    },
    #[error("malformed reply from remote collector {path}: {reason}")]
    Decode { path: &'static str, reason: String },
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "status": self.status.as_u16(),
            }
        }));
        (self.status, body).into_response()
    }
}

impl From<ScannerError> for ApiError {
    fn from(err: ScannerError) -> Self {
        tracing::error!(error = %err, "scanning engine call failed");
        Self::internal(err.to_string())
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!(error = ?err, "result store operation failed");
        Self::internal("Result store operation failed")
    }
}
