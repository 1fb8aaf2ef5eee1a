use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use mekgoro_core::ItemKey;
use mekgoro_infra::store::{MovementOrder, MovementQuery};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

/// Build a history query from request parameters.
///
/// `default_limit` applies when the caller gives none; `None` means unbounded.
pub fn movement_query(
    params: dto::MovementListParams,
    default_limit: Option<u32>,
    default_order: MovementOrder,
) -> Result<MovementQuery, axum::response::Response> {
    let order = match params.order.as_deref() {
        Some(raw) => raw
            .parse::<MovementOrder>()
            .map_err(|msg| errors::json_error(StatusCode::BAD_REQUEST, "invalid_input", msg))?,
        None => default_order,
    };

    let item_key = match params.item_key.as_deref() {
        Some(raw) => Some(ItemKey::parse(raw).map_err(errors::ledger_error_to_response)?),
        None => None,
    };

    Ok(MovementQuery {
        limit: params.limit.or(default_limit),
        order,
        item_key,
    })
}

pub async fn list_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<dto::MovementListParams>,
) -> axum::response::Response {
    let query = match movement_query(params, Some(services.history_limit), MovementOrder::Descending) {
        Ok(q) => q,
        Err(resp) => return resp,
    };

    match services.ledger.list_movements(&query).await {
        Ok(movements) => (StatusCode::OK, Json(movements)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
