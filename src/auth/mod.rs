//! Bearer-token authentication and the signup key gate.
//!
//! Key comparison is constant-time to mitigate timing attacks.

mod provider;

pub use provider::*;

use axum::{
    extract::{FromRequestParts, Request},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use crate::errors::AppError;
use crate::models::Identity;
use crate::AppState;

/// Header carrying the signup key when signup is gated.
pub const SIGNUP_KEY_HEADER: &str = "x-signup-key";

/// The authenticated caller of a mutating endpoint.
///
/// Extraction fails with `401` before the handler (or its body extractor) runs.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub identity: Identity,
    pub token: String,
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or_else(|| {
            AppError::Unauthorized("No authorization token provided".to_string())
        })?;

        let identity = state.identity.resolve(&token).await?;
        Ok(CurrentUser { identity, token })
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Signup gate that takes the expected key as a parameter.
pub async fn signup_key_layer(expected_key: Option<String>, request: Request, next: Next) -> Response {
    // No key configured: open signup
    let Some(expected) = expected_key else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(SIGNUP_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    match provided {
        Some(key) if constant_time_compare(&key, &expected) => next.run(request).await,
        Some(_) => AppError::Unauthorized("Invalid signup key".to_string()).into_response(),
        None => AppError::Unauthorized("Missing signup key".to_string()).into_response(),
    }
}

/// Perform constant-time string comparison.
fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
