pub mod accounts;
pub mod appresult;
pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod session;

use std::sync::Arc;

use axum::{debug_handler, extract::{FromRef, State}, routing::{get, post}, Json, Router};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};

pub use appresult::{AppError, AppResult};

use accounts::Directory;
use chat::{MessageStore, Registry};
use config::Config;
use error::StoreError;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub directory: Directory,
    pub store: MessageStore,
    pub registry: Arc<Registry>,
    pub config: Arc<Config>,
}

impl AppState {
    pub async fn new(db_pool: SqlitePool, config: Config) -> Result<AppState, StoreError> {
        Ok(AppState {
            directory: Directory::new(db_pool.clone()),
            store: MessageStore::open(db_pool.clone()).await?,
            registry: Arc::new(Registry::new()),
            config: Arc::new(config),
            db_pool,
        })
    }
}

pub fn app(state: AppState) -> Router {
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            state.config.session_idle_minutes,
        )));

    Router::new()
        .route("/health", get(health))
        .route("/lockin", post(auth::lockin))
        .route("/logout", post(auth::logout))
        .merge(chat::router())
        .with_state(state)
        .layer(session_layer)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[debug_handler(state = AppState)]
async fn health(State(db_pool): State<SqlitePool>) -> AppResult<Json<Value>> {
    sqlx::query("SELECT 1").execute(&db_pool).await?;
    Ok(Json(json!({ "status": "success" })))
}
