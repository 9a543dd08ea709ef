//! Site settings endpoints.

use axum::{extract::State, Json};
use serde_json::{json, Value};

use super::{AppJson, MutationResponse};
use crate::auth::CurrentUser;
use crate::errors::AppError;
use crate::models::{into_payload, now_timestamp, require_fields, SETTINGS_KEY, SETTINGS_REQUIRED_FIELDS};
use crate::AppState;

/// GET /api/settings - Get the settings document, `{}` when never saved.
pub async fn get_settings(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let settings = state
        .store
        .get(SETTINGS_KEY)
        .await?
        .unwrap_or_else(|| json!({}));

    Ok(Json(json!({ "settings": settings })))
}

/// PUT /api/settings - Replace the whole settings document.
pub async fn update_settings(
    State(state): State<AppState>,
    user: CurrentUser,
    AppJson(body): AppJson<Value>,
) -> Result<Json<MutationResponse>, AppError> {
    let mut settings = into_payload(body)?;
    require_fields(&settings, SETTINGS_REQUIRED_FIELDS)?;

    settings.insert("updatedAt".to_string(), Value::String(now_timestamp()));
    settings.insert(
        "updatedBy".to_string(),
        Value::String(user.identity.id.clone()),
    );
    state.store.set(SETTINGS_KEY, &Value::Object(settings)).await?;

    tracing::info!("Settings replaced by {}", user.identity.email);
    Ok(Json(MutationResponse::ok()))
}
