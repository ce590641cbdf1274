use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    ValidationError(String),

    #[error("Model storage error: {0}")]
    StorageError(String),

    #[error("Failed to read model pointer file: {0}")]
    PointerReadError(String),

    #[error("Model download failed: {0}")]
    DownloadError(String),

    #[error("Model initialization failed: {0}")]
    ModelInitError(String),

    #[error("Model inference failed: {0}")]
    InferenceError(String),

    #[error("Tokenization failed: {0}")]
    TokenizationError(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::ValidationError(msg) => {
                tracing::warn!(error = %msg, "Validation error");
                msg.clone()
            }
            AppError::StorageError(e) | AppError::PointerReadError(e) => {
                tracing::error!(error = %e, "Model storage error");
                self.to_string()
            }
            AppError::DownloadError(e) => {
                tracing::error!(error = %e, "Model download error");
                self.to_string()
            }
            AppError::ModelInitError(e) => {
                tracing::error!(error = %e, "Model initialization error");
                self.to_string()
            }
            AppError::InferenceError(e) => {
                tracing::error!(error = %e, "Model inference error");
                self.to_string()
            }
            AppError::TokenizationError(e) => {
                tracing::error!(error = %e, "Tokenization error");
                self.to_string()
            }
        };

        let body = Json(ErrorResponse {
            error: message,
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
