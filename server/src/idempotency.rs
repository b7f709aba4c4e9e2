//! Extractor for the optional `Idempotency-Key` header.
//!
//! Offline clients send their mutation id with each replayed call; the
//! handlers use it to make replays return the original result instead of
//! applying twice.

use axum::{extract::FromRequestParts, http::request::Parts};
use std::convert::Infallible;

pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// The caller's idempotency key, if any.
#[derive(Debug, Clone, Default)]
pub struct IdempotencyKey(pub Option<String>);

impl IdempotencyKey {
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for IdempotencyKey {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .get(IDEMPOTENCY_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        Ok(IdempotencyKey(key))
    }
}
