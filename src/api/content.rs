//! Collection endpoints shared by events, news, media, testimonies and leaders.
//!
//! Each collection is mounted with its [`ContentKind`] as a request extension.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{AppJson, MutationResponse};
use crate::auth::CurrentUser;
use crate::errors::AppError;
use crate::models::{
    into_payload, merge_update, new_record, reject_blanked_fields, require_fields, ContentKind,
};
use crate::AppState;

/// Query parameters for list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Keep only the newest `limit` records
    #[serde(default)]
    pub limit: Option<usize>,
}

/// GET /api/{collection} - List records, newest first.
pub async fn list_records(
    State(state): State<AppState>,
    Extension(kind): Extension<ContentKind>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, AppError> {
    let mut records = state.store.get_by_prefix(&kind.prefix()).await?;

    // Keys are time-ordered, so reversing key order gives newest first
    records.reverse();
    if let Some(limit) = query.limit {
        records.truncate(limit);
    }

    let mut body = Map::new();
    body.insert(kind.collection().to_string(), Value::Array(records));
    Ok(Json(Value::Object(body)))
}

/// GET /api/{collection}/{id} - Get a single record.
pub async fn get_record(
    State(state): State<AppState>,
    Extension(kind): Extension<ContentKind>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let not_found = || AppError::NotFound(format!("{} not found", kind.label()));
    if !kind.owns(&id) {
        return Err(not_found());
    }

    let record = state.store.get(&id).await?.ok_or_else(not_found)?;
    Ok(Json(json!({ "record": record })))
}

/// POST /api/{collection} - Create a record.
pub async fn create_record(
    State(state): State<AppState>,
    Extension(kind): Extension<ContentKind>,
    user: CurrentUser,
    AppJson(body): AppJson<Value>,
) -> Result<Json<MutationResponse>, AppError> {
    let fields = into_payload(body)?;
    require_fields(&fields, kind.required_fields())?;

    let id = kind.new_key();
    let record = new_record(kind, &id, fields, &user.identity.id);
    state.store.insert(&id, &record).await?;

    tracing::info!("{} {} created by {}", kind.label(), id, user.identity.email);
    Ok(Json(MutationResponse::created(id)))
}

/// PUT /api/{collection}/{id} - Merge a partial update into a record.
pub async fn update_record(
    State(state): State<AppState>,
    Extension(kind): Extension<ContentKind>,
    user: CurrentUser,
    Path(id): Path<String>,
    AppJson(body): AppJson<Value>,
) -> Result<Json<MutationResponse>, AppError> {
    let not_found = || AppError::NotFound(format!("{} not found", kind.label()));
    if !kind.owns(&id) {
        return Err(not_found());
    }

    let updates = into_payload(body)?;
    reject_blanked_fields(&updates, kind.required_fields())?;

    state
        .store
        .update(&id, |existing| {
            merge_update(existing, &updates, &user.identity.id)
        })
        .await?
        .ok_or_else(not_found)?;

    tracing::info!("{} {} updated by {}", kind.label(), id, user.identity.email);
    Ok(Json(MutationResponse::ok()))
}

/// DELETE /api/{collection}/{id} - Delete a record. Missing ids succeed.
pub async fn delete_record(
    State(state): State<AppState>,
    Extension(kind): Extension<ContentKind>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<MutationResponse>, AppError> {
    if kind.owns(&id) {
        state.store.delete(&id).await?;
        tracing::info!("{} {} deleted by {}", kind.label(), id, user.identity.email);
    } else {
        tracing::debug!("Ignoring delete of {} outside {}", id, kind.collection());
    }

    Ok(Json(MutationResponse::ok()))
}
