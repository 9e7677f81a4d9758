//! Error types for the pdfjoin API

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pdfjoin_core::PdfJoinError;
use serde_json::json;
use thiserror::Error;

use crate::staging::StagingError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("Invalid or password-protected PDF: {name}")]
    InvalidDocument { name: String },

    #[error("{0}")]
    NotFound(String),

    #[error("Only PDF files are allowed")]
    UnsupportedMedia,

    #[error("File upload error: {0}")]
    Upload(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::InvalidDocument { .. } | ApiError::Upload(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::UnsupportedMedia => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show a client. Internal details only go to the log.
    pub fn client_message(&self) -> String {
        match self {
            ApiError::Internal(_) => "An unexpected error occurred".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if let ApiError::Internal(e) = &self {
            tracing::error!("Internal error: {:#}", e);
        }

        let body = Json(json!({ "error": self.client_message() }));
        (status, body).into_response()
    }
}

impl From<PdfJoinError> for ApiError {
    fn from(err: PdfJoinError) -> Self {
        match err {
            PdfJoinError::InvalidOrProtected { name } => ApiError::InvalidDocument { name },
            other if other.is_client_error() => ApiError::Validation(other.to_string()),
            other => ApiError::Internal(anyhow::Error::new(other)),
        }
    }
}

impl From<StagingError> for ApiError {
    fn from(err: StagingError) -> Self {
        match err {
            StagingError::NotFound => ApiError::NotFound(StagingError::NotFound.to_string()),
            StagingError::Io(e) => {
                ApiError::Internal(anyhow::Error::new(e).context("File staging failed"))
            }
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::Upload(err.body_text())
    }
}
