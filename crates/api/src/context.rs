//! Per-request values extracted from headers.
//!
//! The caller's identity is [`matflow_auth::AuthContext`], inserted into the
//! request extensions by [`crate::middleware::auth_middleware`].

use axum::Json;
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use serde::de::DeserializeOwned;

use crate::app::errors::ApiError;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Client-chosen key making a mutation safe to retry. Required on every
/// mutating endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyKey(pub String);

impl IdempotencyKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for IdempotencyKey
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(IDEMPOTENCY_KEY_HEADER)
            .ok_or_else(|| ApiError::invalid_input("missing Idempotency-Key header"))?;
        let key = raw
            .to_str()
            .map_err(|_| ApiError::invalid_input("Idempotency-Key header is not visible ASCII"))?
            .trim();
        if key.is_empty() {
            return Err(ApiError::invalid_input("Idempotency-Key header is empty"));
        }
        Ok(Self(key.to_string()))
    }
}

/// `axum::Json` whose rejections use the API's error body.
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::invalid_input(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// `axum::extract::Query` whose rejections use the API's error body.
#[derive(Debug, Clone)]
pub struct QueryParams<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ApiError::invalid_input(rejection.body_text()))?;
        Ok(Self(value))
    }
}
