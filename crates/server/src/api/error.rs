//! Error responses for API handlers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use convertino_core::{EngineError, FileError, OrchestratorError};

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// An error with the status it is served under.
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

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

fn engine_status(err: &EngineError) -> StatusCode {
    match err {
        EngineError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        let status = match &err {
            OrchestratorError::FileNotFound(_) => StatusCode::NOT_FOUND,
            OrchestratorError::NoResult(_) => StatusCode::CONFLICT,
            OrchestratorError::File(file) => match file {
                FileError::NoConverters { .. } | FileError::NoConverterFound { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                FileError::AlreadyProcessing { .. } => StatusCode::CONFLICT,
                FileError::Conversion { source, .. } | FileError::Cancel { source, .. } => {
                    engine_status(source)
                }
            },
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err: ApiError = OrchestratorError::FileNotFound("x".to_string()).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let err: ApiError = OrchestratorError::File(FileError::AlreadyProcessing {
            file: "a.png".to_string(),
        })
        .into();
        assert_eq!(err.status, StatusCode::CONFLICT);

        let err: ApiError = OrchestratorError::File(FileError::NoConverterFound {
            from: ".svg".to_string(),
            to: ".mp3".to_string(),
        })
        .into();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.message, "No converter found for .svg to .mp3");

        let err: ApiError = OrchestratorError::File(FileError::Conversion {
            file: "a.docx".to_string(),
            source: EngineError::unavailable("pandoc", "not installed"),
        })
        .into();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
