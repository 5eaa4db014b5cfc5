use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    response::IntoResponse,
    routing::get,
};
use serde::Serialize;

use stockledger_infra::store::StoreError;

use crate::app::extract::ApiQuery;
use crate::app::routes::blocking;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/best-sellers", get(best_sellers))
        .route("/customers-by-purchases", get(customers_by_purchases))
        .route("/monthly-sales", get(monthly_sales))
        .route("/average-price", get(average_price))
        .route("/top-stock", get(top_stock))
}

async fn report<F, T>(services: Arc<AppServices>, f: F) -> axum::response::Response
where
    F: FnOnce(&AppServices) -> Result<T, StoreError> + Send + 'static,
    T: Serialize + Send + 'static,
{
    match blocking(services, f).await {
        Ok(Ok(rows)) => Json(rows).into_response(),
        Ok(Err(e)) => errors::store_error_to_response(e),
        Err(resp) => resp,
    }
}

pub async fn best_sellers(
    Extension(services): Extension<Arc<AppServices>>,
    ApiQuery(params): ApiQuery<dto::LimitParam>,
) -> axum::response::Response {
    report(services, move |s| s.reports.best_sellers(params.limit)).await
}

pub async fn customers_by_purchases(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    report(services, |s| s.reports.customers_by_purchase_count()).await
}

pub async fn monthly_sales(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    report(services, |s| s.reports.monthly_sales()).await
}

pub async fn average_price(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    report(services, |s| s.reports.average_price_by_category()).await
}

pub async fn top_stock(
    Extension(services): Extension<Arc<AppServices>>,
    ApiQuery(params): ApiQuery<dto::LimitParam>,
) -> axum::response::Response {
    report(services, move |s| s.reports.top_stocked(params.limit)).await
}
