//! Church Site Backend
//!
//! REST backend for the church website: public content listings plus the
//! admin panel's CRUD, backed by a SQLite key-value content store.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod models;
mod storage;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use auth::{IdentityProvider, LocalIdentityProvider};
use config::{Config, LogFormat};
use db::{AccountRepository, ContentStore};
use models::{now_timestamp, ContentKind};
use storage::{BlobStore, FILES_ROUTE};

/// Room left for multipart framing on top of the upload ceiling.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ContentStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub blobs: Arc<BlobStore>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(env_filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    tracing::info!("Starting Church Site Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Upload directory: {:?}", config.upload_dir);
    tracing::info!("Bind address: {}", config.bind_addr);

    if config.signup_key.is_none() {
        tracing::warn!("No signup key configured (CHURCH_SIGNUP_KEY). Anyone can create admin accounts!");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;

    let state = AppState {
        store: Arc::new(ContentStore::new(pool.clone())),
        identity: Arc::new(LocalIdentityProvider::new(
            AccountRepository::new(pool),
            chrono::Duration::hours(config.session_ttl_hours),
        )),
        blobs: Arc::new(BlobStore::new(
            &config.upload_dir,
            &config.upload_bucket,
            &config.public_url,
            config.max_upload_bytes,
        )),
        config: Arc::new(config.clone()),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Clone the signup key for the gate layer
    let signup_key = state.config.signup_key.clone();
    let upload_limit = state.blobs.max_bytes() + MULTIPART_OVERHEAD;

    let signup_routes = Router::new()
        .route("/signup", post(api::signup))
        .route_layer(middleware::from_fn(move |req, next| {
            auth::signup_key_layer(signup_key.clone(), req, next)
        }));

    let auth_routes = Router::new()
        .route("/login", post(api::login))
        .route("/logout", post(api::logout))
        .route("/user", get(api::get_user))
        .merge(signup_routes);

    let mut api_routes = Router::new().nest("/auth", auth_routes);

    // Collections
    for kind in ContentKind::ALL {
        api_routes = api_routes.nest(&format!("/{}", kind.collection()), content_routes(kind));
    }

    let api_routes = api_routes
        // Settings
        .route("/settings", get(api::get_settings).put(api::update_settings))
        // Upload
        .route(
            "/upload",
            post(api::upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/health", get(health_check));

    let files = ServeDir::new(state.blobs.bucket_dir());

    Router::new()
        .nest("/api", api_routes)
        .nest_service(FILES_ROUTE, files)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Routes for one content collection.
fn content_routes(kind: ContentKind) -> Router<AppState> {
    Router::new()
        .route("/", get(api::list_records).post(api::create_record))
        .route(
            "/{id}",
            get(api::get_record)
                .put(api::update_record)
                .delete(api::delete_record),
        )
        .layer(Extension(kind))
}

/// Health check endpoint.
async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "timestamp": now_timestamp() }))
}
