//! rollbook-api library interface
//!
//! School attendance service: per-student daily attendance records,
//! aggregate statistics, and a chat assistant that translates
//! natural-language questions into store queries.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::services::translator::QueryTranslator;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Chat front door; None when no credential is configured, which
    /// degrades /api/chat only
    pub translator: Option<QueryTranslator>,
    /// Service startup timestamp for uptime reporting
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, translator: Option<QueryTranslator>) -> Self {
        Self {
            db,
            translator,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::student_routes())
        .merge(api::attendance_routes())
        .merge(api::chat_routes())
        .merge(api::health_routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
