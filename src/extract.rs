//! Wrappers around the axum extractors whose rejections are `ServiceError`s,
//! so malformed input gets the same json error body as every other failure.
use aide::gen::GenContext;
use aide::openapi::Operation;
use aide::OperationInput;
use axum::async_trait;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;

use crate::error::ServiceError;

/// Json request body.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Json(value) = axum::Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

impl<T: JsonSchema> OperationInput for JsonBody<T> {
    fn operation_input(ctx: &mut GenContext, operation: &mut Operation) {
        axum::Json::<T>::operation_input(ctx, operation);
    }
}

pub struct Path<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for Path<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let axum::extract::Path(value) =
            axum::extract::Path::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

impl<T: JsonSchema> OperationInput for Path<T> {
    fn operation_input(ctx: &mut GenContext, operation: &mut Operation) {
        axum::extract::Path::<T>::operation_input(ctx, operation);
    }
}

pub struct Query<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for Query<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let axum::extract::Query(value) =
            axum::extract::Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

impl<T: JsonSchema> OperationInput for Query<T> {
    fn operation_input(ctx: &mut GenContext, operation: &mut Operation) {
        axum::extract::Query::<T>::operation_input(ctx, operation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use serde::Deserialize;

    use crate::error::ErrorBody;

    #[allow(dead_code)]
    #[derive(Debug, Deserialize)]
    struct Line {
        menu_item_id: u64,
        quantity: i32,
    }

    #[allow(dead_code)]
    #[derive(Debug, Deserialize)]
    struct Order {
        items: Vec<Line>,
    }

    #[allow(dead_code)]
    #[derive(Debug, Deserialize)]
    struct Paging {
        limit: Option<i64>,
    }

    fn json_request(body: &'static str, content_type: Option<&str>) -> Request {
        let mut builder = http::Request::builder().method("POST").uri("/orders");
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        builder.body(Body::from(body)).unwrap()
    }

    async fn reject(request: Request) -> ServiceError {
        match JsonBody::<Order>::from_request(request, &()).await {
            Ok(_) => panic!("expected the body to be rejected"),
            Err(e) => e,
        }
    }

    #[tokio::test]
    async fn mistyped_field_is_a_field_error() {
        let err = reject(json_request(
            r#"{"items":[{"menu_item_id":"abc","quantity":1}]}"#,
            Some("application/json"),
        ))
        .await;

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = response
            .extensions()
            .get::<ErrorBody>()
            .expect("error body is attached for localization");
        assert_eq!(body.error, "validation_failed");
        assert_eq!(body.fields.len(), 1);
        assert_eq!(body.fields[0].field, "items[0].menu_item_id");
        assert_eq!(body.fields[0].error, "field_invalid");
    }

    #[tokio::test]
    async fn broken_json_is_a_bad_request() {
        let err = reject(json_request(r#"{"items":["#, Some("application/json"))).await;
        assert_eq!(err, ServiceError::BadRequest("invalid_body"));

        let err = reject(json_request(r#"{"items":[]}"#, None)).await;
        assert_eq!(err, ServiceError::BadRequest("invalid_body"));

        let err = reject(json_request(r#"[1, 2]"#, Some("application/json"))).await;
        assert_eq!(err, ServiceError::BadRequest("invalid_body"));
    }

    #[tokio::test]
    async fn well_formed_json_is_accepted() {
        let request = json_request(
            r#"{"items":[{"menu_item_id":4,"quantity":2}]}"#,
            Some("application/json"),
        );
        let JsonBody(order) = JsonBody::<Order>::from_request(request, &()).await.unwrap();
        assert_eq!(order.items[0].menu_item_id, 4);
    }

    #[tokio::test]
    async fn mistyped_query_is_a_bad_request() {
        let (mut parts, _) = http::Request::builder()
            .uri("/activity-logs?limit=many")
            .body(())
            .unwrap()
            .into_parts();
        let result = Query::<Paging>::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(ServiceError::BadRequest("invalid_query"))));

        let (mut parts, _) = http::Request::builder()
            .uri("/activity-logs?limit=20")
            .body(())
            .unwrap()
            .into_parts();
        let Ok(Query(paging)) = Query::<Paging>::from_request_parts(&mut parts, &()).await else {
            panic!("expected the query to be accepted");
        };
        assert_eq!(paging.limit, Some(20));
    }
}
