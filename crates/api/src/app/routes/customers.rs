use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};

use stockledger_infra::CustomerQuery;
use stockledger_inventory::NewCustomer;

use crate::app::extract::{ApiJson, ApiQuery};
use crate::app::routes::blocking;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route(
        "/",
        post(register_customer)
            .get(list_customers)
            .delete(remove_customer),
    )
}

pub async fn register_customer(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<NewCustomer>,
) -> axum::response::Response {
    match blocking(services, move |s| s.catalog.register_customer(body)).await {
        Ok(Ok(customer)) => (StatusCode::CREATED, Json(customer)).into_response(),
        Ok(Err(e)) => errors::catalog_error_to_response(e),
        Err(resp) => resp,
    }
}

pub async fn list_customers(
    Extension(services): Extension<Arc<AppServices>>,
    ApiQuery(params): ApiQuery<dto::CustomerFilterParams>,
) -> axum::response::Response {
    let query = CustomerQuery::from(params);
    match blocking(services, move |s| s.catalog.find_customers(&query)).await {
        Ok(Ok(customers)) => Json(customers).into_response(),
        Ok(Err(e)) => errors::catalog_error_to_response(e),
        Err(resp) => resp,
    }
}

pub async fn remove_customer(
    Extension(services): Extension<Arc<AppServices>>,
    ApiQuery(params): ApiQuery<dto::EmailParam>,
) -> axum::response::Response {
    match blocking(services, move |s| s.catalog.remove_customer_by_email(&params.email)).await {
        Ok(Ok(customer)) => Json(customer).into_response(),
        Ok(Err(e)) => errors::catalog_error_to_response(e),
        Err(resp) => resp,
    }
}
