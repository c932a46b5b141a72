use actix_web::http::header::{self, ContentType};
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

use crate::predictions::PredictionError;
use crate::views;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("please sign in")]
    Unauthenticated,

    #[error("you do not have access to this page")]
    Forbidden,

    #[error("ML script failed")]
    Prediction(#[from] PredictionError),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    /// Message safe to show to the user.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Store(_) | AppError::Internal(_) => "Something went wrong. Please try again.".to_string(),
            other => other.to_string(),
        }
    }

    pub fn details(&self) -> Option<String> {
        match self {
            AppError::Prediction(err) => Some(err.detail()),
            _ => None,
        }
    }

    fn log(&self) {
        if self.status_code().is_server_error() {
            tracing::error!(error = %self, details = ?self.details(), "request failed");
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Store(_) | AppError::Prediction(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthenticated => StatusCode::SEE_OTHER,
            AppError::Forbidden => StatusCode::FORBIDDEN,
        }
    }

    fn error_response(&self) -> HttpResponse {
        self.log();
        if let AppError::Unauthenticated = self {
            return HttpResponse::SeeOther()
                .insert_header((header::LOCATION, "/auth/login"))
                .finish();
        }
        HttpResponse::build(self.status_code())
            .content_type(ContentType::html())
            .body(views::error_page(self.status_code(), &self.public_message()))
    }
}

/// JSON flavour of [`AppError`] for API endpoints.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct JsonError(#[from] pub AppError);

pub type JsonResult<T> = Result<T, JsonError>;

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl From<sqlx::Error> for JsonError {
    fn from(err: sqlx::Error) -> Self {
        JsonError(AppError::Store(err))
    }
}

impl From<PredictionError> for JsonError {
    fn from(err: PredictionError) -> Self {
        JsonError(AppError::Prediction(err))
    }
}

impl ResponseError for JsonError {
    fn status_code(&self) -> StatusCode {
        match self.0 {
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ref other => other.status_code(),
        }
    }

    fn error_response(&self) -> HttpResponse {
        self.0.log();
        HttpResponse::build(self.status_code()).json(ErrorBody {
            success: false,
            error: self.0.public_message(),
            details: self.0.details(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[actix_web::test]
    async fn unauthenticated_html_redirects_to_login() {
        let response = AppError::Unauthenticated.error_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/auth/login"
        );
    }

    #[actix_web::test]
    async fn unauthenticated_json_is_401() {
        let response = JsonError(AppError::Unauthenticated).error_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn prediction_failure_carries_details() {
        let err = JsonError::from(PredictionError::Failed {
            code: Some(1),
            detail: "no training data".to_string(),
        });
        let response = err.error_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "ML script failed");
        assert_eq!(json["details"], "no training data");
    }

    #[test]
    fn store_errors_are_not_shown_to_users() {
        let err = AppError::Store(sqlx::Error::RowNotFound);
        assert!(!err.public_message().contains("database"));
    }
}
