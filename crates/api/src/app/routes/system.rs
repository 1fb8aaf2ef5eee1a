use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::app::errors;
use crate::app::services::AppServices;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Replay the movement log against the ledger.
pub async fn verify(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.ledger.verify().await {
        Ok(discrepancies) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "consistent": discrepancies.is_empty(),
                "discrepancies": discrepancies,
            })),
        )
            .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
