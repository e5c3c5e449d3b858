use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use shared::ErrorResponse;

use crate::model::ModelError;

/// Everything an inference endpoint can fail with. Client mistakes map to 400,
/// anything past request validation maps to 500 with the raw error text.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Missing image or filename")]
    MissingField,
    #[error("Invalid filename: {0:?}")]
    InvalidFilename(String),
    #[error("Invalid request body: {0}")]
    InvalidBody(String),
    #[error("{0}")]
    Decode(#[from] base64::DecodeError),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Image(#[from] image::ImageError),
    #[error("{0}")]
    Model(#[from] ModelError),
    #[error("{0}")]
    Blocking(#[from] actix_web::error::BlockingError),
}

impl ApiError {
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ApiError::MissingField | ApiError::InvalidFilename(_) | ApiError::InvalidBody(_)
        )
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.is_client_error() {
            log::warn!("Rejected request: {}", self);
        } else {
            log::error!("Inference request failed: {}", self);
        }
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_failures_are_bad_requests() {
        assert_eq!(ApiError::MissingField.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::InvalidFilename("..".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn pipeline_failures_are_server_errors_with_raw_text() {
        let err = ApiError::from(ModelError::Runtime("cuda out of memory".into()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Model runtime error: cuda out of memory");
    }
}
