use axum::response::IntoResponse;

use crate::error::AppError;

pub async fn metrics_handler() -> Result<impl IntoResponse, AppError> {
    crate::metrics::render().map_err(AppError::Internal)
}
