use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
};

use stockledger_core::{LedgerEntryId, ProductId};
use stockledger_infra::ProductQuery;

use crate::app::extract::{ApiJson, ApiQuery};
use crate::app::routes::blocking;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::facade::{RestockRequest, ReturnRequest, SellRequest};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_product).get(list_products))
        .route("/tags", post(tag_category))
        .route("/low-stock", delete(purge_low_stock))
        .route("/:id", get(get_product))
        .route("/:id/sell", post(sell))
        .route("/:id/restock", post(restock))
}

fn parse_product_id(id: &str) -> Result<ProductId, axum::response::Response> {
    id.parse().map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid product id")
    })
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<dto::CreateProductRequest>,
) -> axum::response::Response {
    let result = blocking(services, move |s| {
        s.catalog.register_product(body.product, body.opening_stock)
    })
    .await;

    match result {
        Ok(Ok(product)) => (StatusCode::CREATED, Json(product)).into_response(),
        Ok(Err(e)) => errors::catalog_error_to_response(e),
        Err(resp) => resp,
    }
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    ApiQuery(params): ApiQuery<dto::ProductFilterParams>,
) -> axum::response::Response {
    let query = ProductQuery::from(params);
    match blocking(services, move |s| s.catalog.find_products(&query)).await {
        Ok(Ok(products)) => Json(products).into_response(),
        Ok(Err(e)) => errors::catalog_error_to_response(e),
        Err(resp) => resp,
    }
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let product_id = match parse_product_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match blocking(services, move |s| s.catalog.get_product(product_id)).await {
        Ok(Ok(product)) => Json(product).into_response(),
        Ok(Err(e)) => errors::catalog_error_to_response(e),
        Err(resp) => resp,
    }
}

pub async fn sell(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::SellBody>,
) -> axum::response::Response {
    let product_id = match parse_product_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let request = SellRequest {
        product_id,
        quantity: body.quantity,
        total: body.total,
        customer_id: body.customer_id,
    };

    match blocking(services, move |s| s.operations.sell(request)).await {
        Ok(Ok(report)) => Json(report).into_response(),
        Ok(Err(e)) => errors::adjustment_error_to_response(e),
        Err(resp) => resp,
    }
}

pub async fn restock(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::RestockBody>,
) -> axum::response::Response {
    let product_id = match parse_product_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let request = RestockRequest {
        product_id,
        quantity: body.quantity,
        batch_ref: body.batch_ref,
    };

    match blocking(services, move |s| s.operations.restock(request)).await {
        Ok(Ok(report)) => Json(report).into_response(),
        Ok(Err(e)) => errors::adjustment_error_to_response(e),
        Err(resp) => resp,
    }
}

pub async fn return_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Path(entry_id): Path<String>,
) -> axum::response::Response {
    let sale_entry_id: LedgerEntryId = match entry_id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_id",
                "invalid ledger entry id",
            );
        }
    };

    let request = ReturnRequest { sale_entry_id };
    match blocking(services, move |s| s.operations.return_sale(request)).await {
        Ok(Ok(report)) => Json(report).into_response(),
        Ok(Err(e)) => errors::adjustment_error_to_response(e),
        Err(resp) => resp,
    }
}

pub async fn tag_category(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<dto::TagCategoryRequest>,
) -> axum::response::Response {
    let category = body.category.clone();
    match blocking(services, move |s| s.catalog.tag_category(&body.category, &body.tag)).await {
        Ok(Ok(touched)) => Json(serde_json::json!({
            "category": category,
            "products_tagged": touched,
        }))
        .into_response(),
        Ok(Err(e)) => errors::catalog_error_to_response(e),
        Err(resp) => resp,
    }
}

pub async fn purge_low_stock(
    Extension(services): Extension<Arc<AppServices>>,
    ApiQuery(params): ApiQuery<dto::ThresholdParam>,
) -> axum::response::Response {
    match blocking(services, move |s| s.catalog.purge_low_stock(params.below)).await {
        Ok(Ok(purged)) => Json(serde_json::json!({
            "purged": purged.len(),
            "product_ids": purged,
        }))
        .into_response(),
        Ok(Err(e)) => errors::catalog_error_to_response(e),
        Err(resp) => resp,
    }
}
