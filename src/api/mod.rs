//! REST API module.
//!
//! Contains all API routes and handlers following the frontend contract.

mod auth;
mod content;
mod settings;
mod upload;

pub use auth::*;
pub use content::*;
pub use settings::*;
pub use upload::*;

use axum::extract::FromRequest;
use serde::Serialize;

use crate::errors::AppError;

/// JSON body extractor that rejects with the standard error body.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// Body returned by create, update and delete operations.
#[derive(Debug, Serialize)]
pub struct MutationResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl MutationResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            id: None,
        }
    }

    pub fn created(id: String) -> Self {
        Self {
            success: true,
            id: Some(id),
        }
    }
}
