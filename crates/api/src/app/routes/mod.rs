use axum::{
    routing::{get, post},
    Router,
};

pub mod backup;
pub mod movements;
pub mod stock;
pub mod system;
pub mod transfer;

/// Router for all actor-scoped endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/stock", stock::router())
        .route("/movements", get(movements::list_movements))
        .route("/import", post(transfer::import_stock))
        .route("/export/stock.csv", get(transfer::export_stock))
        .route("/export/movements.csv", get(transfer::export_movements))
        .route("/backup", post(backup::run_backup))
        .route("/verify", get(system::verify))
}
