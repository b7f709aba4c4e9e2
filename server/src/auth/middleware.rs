//! Bearer-token authentication.
//!
//! When `AUTH_SECRET` is configured, every request must carry
//! `Authorization: Bearer <secret>`. Without a configured secret the
//! server runs open, which is the expected mode for local development.
//! Full user management lives outside this service.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
};

use crate::AppState;

/// Proof that the request passed the bearer check.
#[derive(Debug, Clone)]
pub struct AuthUser;

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(secret) = &state.config.auth_secret else {
            return Ok(AuthUser);
        };

        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        let Some(token) = header.and_then(|h| h.strip_prefix("Bearer ")) else {
            return Err((StatusCode::UNAUTHORIZED, "Missing bearer token"));
        };

        if token != secret {
            return Err((StatusCode::UNAUTHORIZED, "Invalid bearer token"));
        }

        Ok(AuthUser)
    }
}
