//! Account endpoints.

use axum::{extract::State, Json};
use serde_json::{json, Value};

use super::{AppJson, MutationResponse};
use crate::auth::CurrentUser;
use crate::errors::AppError;
use crate::models::{LoginRequest, Session, SignupRequest};
use crate::AppState;

/// POST /api/auth/signup - Create an admin account.
pub async fn signup(
    State(state): State<AppState>,
    AppJson(request): AppJson<SignupRequest>,
) -> Result<Json<Value>, AppError> {
    let user = state.identity.sign_up(request).await?;
    Ok(Json(json!({ "success": true, "user": user })))
}

/// POST /api/auth/login - Exchange credentials for a bearer token.
pub async fn login(
    State(state): State<AppState>,
    AppJson(request): AppJson<LoginRequest>,
) -> Result<Json<Session>, AppError> {
    Ok(Json(state.identity.sign_in(request).await?))
}

/// POST /api/auth/logout - Invalidate the presented token.
pub async fn logout(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<MutationResponse>, AppError> {
    state.identity.sign_out(&user.token).await?;
    tracing::info!("Session closed for {}", user.identity.email);
    Ok(Json(MutationResponse::ok()))
}

/// GET /api/auth/user - Resolve the presented token to its account.
pub async fn get_user(user: CurrentUser) -> Json<Value> {
    Json(json!({ "user": user.identity }))
}
