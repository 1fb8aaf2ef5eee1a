use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use mekgoro_core::LedgerError;
use mekgoro_infra::backup::BackupError;
use mekgoro_infra::export::ExportError;

pub fn ledger_error_to_response(err: LedgerError) -> axum::response::Response {
    match err {
        LedgerError::InvalidInput(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_input", msg),
        LedgerError::InsufficientStock { available, .. } => (
            StatusCode::CONFLICT,
            axum::Json(json!({
                "error": "insufficient_stock",
                "message": err.to_string(),
                "available": available,
            })),
        )
            .into_response(),
        LedgerError::PersistenceFailure(msg) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "persistence_failure", msg)
        }
        LedgerError::ImportFormat(msg) => json_error(StatusCode::UNPROCESSABLE_ENTITY, "import_format", msg),
    }
}

pub fn backup_error_to_response(err: BackupError) -> axum::response::Response {
    match err {
        BackupError::Ledger(e) => ledger_error_to_response(e),
        other => json_error(StatusCode::BAD_GATEWAY, "backup_failed", other.to_string()),
    }
}

pub fn export_error_to_response(err: ExportError) -> axum::response::Response {
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "export_failed", err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
