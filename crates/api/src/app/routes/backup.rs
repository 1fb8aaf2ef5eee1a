use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;

use mekgoro_infra::backup;

use crate::app::errors;
use crate::app::services::AppServices;

pub async fn run_backup(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let sink = services.backup_sink.as_deref();
    match backup::run_backup(&services.ledger, sink, Utc::now()).await {
        Ok(receipt) => (StatusCode::CREATED, Json(receipt)).into_response(),
        Err(e) => errors::backup_error_to_response(e),
    }
}
