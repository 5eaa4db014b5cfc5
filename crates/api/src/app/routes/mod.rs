use std::sync::Arc;

use axum::{Router, routing::post};

use crate::app::errors;
use crate::app::services::AppServices;

pub mod customers;
pub mod products;
pub mod reports;
pub mod system;

/// Router for all ledger endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/products", products::router())
        .nest("/customers", customers::router())
        .nest("/reports", reports::router())
        .route("/returns/:entry_id", post(products::return_sale))
}

/// Run `f` on the blocking pool; the ledger services block on locks and I/O.
pub(crate) async fn blocking<F, T>(
    services: Arc<AppServices>,
    f: F,
) -> Result<T, axum::response::Response>
where
    F: FnOnce(&AppServices) -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&services))
        .await
        .map_err(errors::join_error_to_response)
}
