use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Use multipart/form-data with file field")]
    NotMultipart,

    #[error("Missing file field")]
    MissingFile,

    #[error("Only image uploads are allowed")]
    NotAnImage,

    #[error("File too large. Max size is 8MB")]
    TooLarge,

    #[error("Malformed multipart body: {0}")]
    MalformedBody(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl UploadError {
    pub fn status(&self) -> StatusCode {
        match self {
            UploadError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            UploadError::Unauthorized => StatusCode::UNAUTHORIZED,
            UploadError::NotMultipart
            | UploadError::MissingFile
            | UploadError::NotAnImage
            | UploadError::TooLarge
            | UploadError::MalformedBody(_) => StatusCode::BAD_REQUEST,
            UploadError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            UploadError::Store(err) => {
                error!(error = %err, "failed storing upload");
                "Upload failed".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
