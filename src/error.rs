use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::engine::RecommendError;

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Recommend(#[from] RecommendError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code clients can branch on
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Recommend(RecommendError::NoUsableFeedback) => "no_usable_feedback",
            AppError::Recommend(RecommendError::IndexOutOfRange { .. }) => "invalid_input",
            AppError::Recommend(RecommendError::Solve(_)) => "solver_failure",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Recommend(RecommendError::NoUsableFeedback) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Recommend(RecommendError::IndexOutOfRange { .. })
            | AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Recommend(RecommendError::Solve(_)) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = Json(json!({
            "error": self.to_string(),
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::SolveError;

    #[test]
    fn test_no_usable_feedback_is_unprocessable() {
        let response = AppError::from(RecommendError::NoUsableFeedback).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::InvalidInput("bad".into()), StatusCode::BAD_REQUEST),
            (AppError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (
                AppError::Recommend(RecommendError::Solve(SolveError::NotPositiveDefinite)),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                AppError::Recommend(RecommendError::IndexOutOfRange { index: 3, size: 2 }),
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn test_codes() {
        assert_eq!(
            AppError::from(RecommendError::NoUsableFeedback).code(),
            "no_usable_feedback"
        );
        assert_eq!(AppError::Internal("x".into()).code(), "internal");
    }
}
