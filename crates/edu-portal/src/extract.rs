//! Request extractors whose rejections render as `ApiError`, so malformed
//! bodies and query strings get the same `{"error": ...}` 400 as any other
//! validation failure.

use axum::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// `axum::Json` with an `ApiError` rejection.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Json(value) = axum::Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// `axum::extract::Query` with an `ApiError` rejection.
#[derive(Debug, Clone, Default)]
pub struct QueryParams<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request as HttpRequest, StatusCode};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Payload {
        status: String,
    }

    #[derive(Debug, Deserialize)]
    struct Paging {
        limit: u32,
    }

    fn json_request(body: &'static str) -> Request {
        HttpRequest::post("/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .expect("request builds")
    }

    #[tokio::test]
    async fn well_formed_body_is_extracted() {
        let request = json_request(r#"{"status":"draft"}"#);
        let JsonBody(payload) = JsonBody::<Payload>::from_request(request, &())
            .await
            .expect("extracts");
        assert_eq!(payload.status, "draft");
    }

    #[tokio::test]
    async fn body_failures_become_validation_errors() {
        for body in [r#"{"status":5}"#, "{not json"] {
            let err = JsonBody::<Payload>::from_request(json_request(body), &())
                .await
                .expect_err("rejected");
            assert!(matches!(err, ApiError::Validation(_)), "{body}: {err:?}");
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        }

        let untyped = HttpRequest::post("/")
            .body(Body::from(r#"{"status":"draft"}"#))
            .expect("request builds");
        let err = JsonBody::<Payload>::from_request(untyped, &())
            .await
            .expect_err("content type required");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn query_failures_become_validation_errors() {
        let (mut parts, _) = HttpRequest::get("/?limit=many")
            .body(Body::empty())
            .expect("request builds")
            .into_parts();
        let err = QueryParams::<Paging>::from_request_parts(&mut parts, &())
            .await
            .expect_err("not a number");
        assert!(matches!(err, ApiError::Validation(_)));

        let (mut parts, _) = HttpRequest::get("/?limit=20")
            .body(Body::empty())
            .expect("request builds")
            .into_parts();
        let QueryParams(paging) = QueryParams::<Paging>::from_request_parts(&mut parts, &())
            .await
            .expect("extracts");
        assert_eq!(paging.limit, 20);
    }
}
