use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use mekgoro_core::{ItemKey, LedgerResult};
use mekgoro_inventory::{MovementMeta, MovementRequest};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_stock))
        .route("/receive", post(receive))
        .route("/dispatch", post(dispatch))
        .route("/adjust", post(adjust))
        .route("/:item_key", get(get_stock))
}

fn meta(actor: &ActorContext, reference: String, counterparty: String) -> MovementMeta {
    MovementMeta::new(reference, counterparty, actor.actor().clone(), Utc::now())
}

async fn apply(services: &AppServices, request: LedgerResult<MovementRequest>) -> axum::response::Response {
    let request = match request {
        Ok(r) => r,
        Err(e) => return errors::ledger_error_to_response(e),
    };
    let item_key = request.item_key().to_string();

    match services.ledger.apply_movement(request).await {
        Ok(quantity) => (StatusCode::OK, Json(dto::MovementApplied { item_key, quantity })).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn receive(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<dto::ReceiveRequest>,
) -> axum::response::Response {
    let meta = meta(&actor, body.reference, body.counterparty);
    let request = MovementRequest::receive(&body.item_key, body.quantity, meta).and_then(|r| match body.unit_cost {
        Some(cost) => r.with_unit_cost(cost),
        None => Ok(r),
    });
    apply(&services, request).await
}

pub async fn dispatch(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<dto::DispatchRequest>,
) -> axum::response::Response {
    let meta = meta(&actor, body.reference, body.counterparty);
    apply(&services, MovementRequest::dispatch(&body.item_key, body.quantity, meta)).await
}

pub async fn adjust(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<dto::AdjustRequest>,
) -> axum::response::Response {
    let meta = meta(&actor, body.reference, body.counterparty);
    apply(&services, MovementRequest::adjust(&body.item_key, body.delta, meta)).await
}

pub async fn list_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<dto::StockListParams>,
) -> axum::response::Response {
    let filter = params.filter.as_deref().map(str::trim).filter(|f| !f.is_empty());
    match services.ledger.list_stock(filter).await {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn get_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Path(item_key): Path<String>,
) -> axum::response::Response {
    // Unknown or blank keys read as zero stock.
    let Ok(key) = ItemKey::parse(&item_key) else {
        let level = dto::StockLevel {
            item_key,
            quantity: 0,
            entry: None,
        };
        return (StatusCode::OK, Json(level)).into_response();
    };

    match services.ledger.get_entry(&key).await {
        Ok(entry) => {
            let level = dto::StockLevel {
                item_key: key.into_inner(),
                quantity: entry.as_ref().map(|e| e.quantity).unwrap_or(0),
                entry,
            };
            (StatusCode::OK, Json(level)).into_response()
        }
        Err(e) => errors::ledger_error_to_response(e),
    }
}
