use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use stockledger_infra::store::StoreError;
use stockledger_infra::{AdjustmentError, CatalogError};

pub fn adjustment_error_to_response(err: AdjustmentError) -> axum::response::Response {
    match err {
        AdjustmentError::InsufficientStock { .. } => json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "insufficient_stock",
            err.to_string(),
        ),
        AdjustmentError::NotFound(what) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
        }
        AdjustmentError::Aborted(msg) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "aborted", msg)
        }
        AdjustmentError::Invalid(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
    }
}

pub fn catalog_error_to_response(err: CatalogError) -> axum::response::Response {
    match err {
        CatalogError::Invalid(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        CatalogError::NotFound(what) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
        }
        CatalogError::AlreadyExists(what) => {
            json_error(StatusCode::CONFLICT, "already_exists", format!("{what} already exists"))
        }
        CatalogError::Aborted(msg) => json_error(StatusCode::SERVICE_UNAVAILABLE, "aborted", msg),
    }
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    catalog_error_to_response(CatalogError::from(err))
}

/// A blocking task that panicked or was cancelled.
pub fn join_error_to_response(err: tokio::task::JoinError) -> axum::response::Response {
    tracing::error!(error = %err, "blocking task failed");
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "request handler failed",
    )
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
