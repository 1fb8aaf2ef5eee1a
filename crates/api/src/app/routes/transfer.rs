//! Bulk import and CSV export.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Query},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;

use mekgoro_infra::export;
use mekgoro_infra::store::MovementOrder;

use crate::app::routes::movements::movement_query;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::ActorContext;

const DEFAULT_IMPORT_SOURCE: &str = "csv-upload";

pub async fn import_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Query(params): Query<dto::ImportParams>,
    body: Bytes,
) -> axum::response::Response {
    let source = params
        .source
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_IMPORT_SOURCE);

    match services
        .ledger
        .bulk_import(&body, source, actor.actor().clone(), Utc::now())
        .await
    {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

fn csv_response(file_name: &str, body: Vec<u8>) -> axum::response::Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        body,
    )
        .into_response()
}

pub async fn export_stock(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let entries = match services.ledger.list_stock(None).await {
        Ok(e) => e,
        Err(e) => return errors::ledger_error_to_response(e),
    };
    match export::stock_csv(&entries) {
        Ok(body) => csv_response(&export::stock_file_name(Utc::now()), body),
        Err(e) => errors::export_error_to_response(e),
    }
}

/// Full history, oldest first unless `order=desc`.
pub async fn export_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<dto::MovementListParams>,
) -> axum::response::Response {
    let query = match movement_query(params, None, MovementOrder::Ascending) {
        Ok(q) => q,
        Err(resp) => return resp,
    };
    let movements = match services.ledger.list_movements(&query).await {
        Ok(m) => m,
        Err(e) => return errors::ledger_error_to_response(e),
    };
    match export::movements_csv(&movements) {
        Ok(body) => csv_response("mekgoro-movements.csv", body),
        Err(e) => errors::export_error_to_response(e),
    }
}
