//! Body and query extractors that reject with the API's JSON error shape.
//!
//! Axum's own `Json`/`Query` rejections are plain text and use 422 for
//! unreadable bodies, which would collide with `insufficient_stock`. Every
//! malformed input is a `400 validation_error` here.

use axum::{
    Json,
    extract::{
        FromRequest, FromRequestParts, Query, Request,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{StatusCode, request::Parts},
    response::Response,
};
use serde::de::DeserializeOwned;

use crate::app::errors;

/// JSON request body.
#[derive(Debug, Clone)]
pub struct ApiJson<T>(pub T);

/// Query-string parameters.
#[derive(Debug, Clone)]
pub struct ApiQuery<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

#[axum::async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(ApiQuery(value)),
            Err(rejection) => Err(query_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> Response {
    tracing::debug!(error = %rejection, "rejected request body");
    errors::json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text())
}

fn query_rejection(rejection: QueryRejection) -> Response {
    tracing::debug!(error = %rejection, "rejected query string");
    errors::json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Units {
        quantity: u32,
    }

    async fn status_and_json(res: Response) -> (StatusCode, serde_json::Value) {
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn json_request(body: &'static str) -> Request {
        http::Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn negative_quantity_is_a_validation_error() {
        let rejected = ApiJson::<Units>::from_request(json_request(r#"{"quantity":-1}"#), &())
            .await
            .unwrap_err();
        let (status, body) = status_and_json(rejected).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
        assert!(body["message"].as_str().is_some());
    }

    #[tokio::test]
    async fn missing_content_type_is_a_validation_error() {
        let req = http::Request::builder().method("POST").uri("/").body(Body::empty()).unwrap();
        let rejected = ApiJson::<Units>::from_request(req, &()).await.unwrap_err();
        let (status, body) = status_and_json(rejected).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
    }

    #[tokio::test]
    async fn well_formed_body_is_extracted() {
        let ApiJson(body) = ApiJson::<Units>::from_request(json_request(r#"{"quantity":3}"#), &())
            .await
            .unwrap();
        assert_eq!(body.quantity, 3);
    }

    #[tokio::test]
    async fn missing_query_parameter_is_a_validation_error() {
        let req = http::Request::builder().uri("/low-stock").body(Body::empty()).unwrap();
        let (mut parts, _) = req.into_parts();
        let rejected = ApiQuery::<Units>::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        let (status, body) = status_and_json(rejected).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
    }
}
