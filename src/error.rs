use axum::{
    Json,
    extract::rejection::{FormRejection, JsonRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::analyzer::AnalysisError;
use crate::materials::MaterialsError;
use crate::models::ErrorResponse;
use crate::validation::ValidationError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid API key: {0}")]
    InvalidApiKey(String),

    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimitExceeded { retry_after_secs: u64 },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid Materials Project API key")]
    InvalidCredential,

    #[error("{0}")]
    NoMaterialsFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::InvalidApiKey(_) => "INVALID_API_KEY",
            AppError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::InvalidCredential => "INVALID_CREDENTIAL",
            AppError::NoMaterialsFound(_) => "NO_MATERIALS_FOUND",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidApiKey(_) | AppError::InvalidCredential => StatusCode::UNAUTHORIZED,
            AppError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NoMaterialsFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::Formula { formula, .. } => {
                AppError::Validation(format!("Invalid chemical formula: {}", formula))
            }
            AnalysisError::Materials(MaterialsError::Authentication) => AppError::InvalidCredential,
            AnalysisError::Materials(e @ MaterialsError::NoEntries { .. }) => {
                AppError::NoMaterialsFound(e.to_string())
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON data: {}", err.body_text()),
            JsonRejection::JsonSyntaxError(err) => format!("Invalid JSON syntax: {}", err.body_text()),
            JsonRejection::MissingJsonContentType(_) => "Missing JSON content type".to_string(),
            _ => "Failed to parse JSON body".to_string(),
        };
        AppError::Validation(message)
    }
}

impl From<FormRejection> for AppError {
    fn from(rejection: FormRejection) -> Self {
        AppError::Validation(format!("Invalid form data: {}", rejection.body_text()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            AppError::InvalidApiKey(msg) | AppError::Validation(msg) | AppError::NoMaterialsFound(msg) => {
                msg.clone()
            }
            AppError::RateLimitExceeded { retry_after_secs } => format!(
                "Rate limit exceeded. Please wait {} seconds before making another request.",
                retry_after_secs
            ),
            AppError::InvalidCredential => self.to_string(),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error occurred while generating phase diagram".to_string()
            }
        };

        let body = Json(ErrorResponse {
            detail,
            error_code: self.error_code().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        });

        let mut response = (status, body).into_response();
        if let AppError::RateLimitExceeded { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineError;

    #[test]
    fn analysis_errors_are_classified() {
        let auth: AppError = AnalysisError::Materials(MaterialsError::Authentication).into();
        assert_eq!(auth.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(auth.error_code(), "INVALID_CREDENTIAL");

        let empty: AppError = AnalysisError::Materials(MaterialsError::NoEntries {
            elements: vec!["Fe".to_string(), "O".to_string()],
        })
        .into();
        assert_eq!(empty.status(), StatusCode::NOT_FOUND);
        assert!(empty.to_string().contains("Fe, O"));

        let api: AppError = AnalysisError::Materials(MaterialsError::Api("boom".to_string())).into();
        assert_eq!(api.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let engine: AppError = AnalysisError::Engine(EngineError::Request("refused".to_string())).into();
        assert_eq!(engine.error_code(), "INTERNAL_ERROR");
    }

    #[test]
    fn rate_limit_response_carries_retry_after() {
        let response = AppError::RateLimitExceeded { retry_after_secs: 17 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "17");
    }

    #[tokio::test]
    async fn internal_detail_is_not_leaked() {
        let response = AppError::Internal("db password=hunter2".to_string()).into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(body.error_code, "INTERNAL_ERROR");
        assert!(!body.detail.contains("hunter2"));
    }
}
