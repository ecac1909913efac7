//! HTTP surface: router assembly and the handlers outside the features

pub mod response;

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;
use sqlx::PgPool;
use tower_http::compression::CompressionLayer;

use crate::config::CorsConfig;
use crate::db;
use crate::error::AppResult;
use crate::features::{self, FeatureState};
use crate::middleware;
use response::ApiResponse;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub features: FeatureState,
}

/// Build the application router with all routes and middleware
///
/// Feature routes live under `/api/v1`; `/` and `/health` stay at the root.
pub fn create_router(state: AppState, cors: &CorsConfig) -> Router {
    let api_v1 = features::router(state.features.clone());

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .with_state(state)
        .nest("/api/v1", api_v1)
        // Applied innermost to outermost
        .layer(CompressionLayer::new())
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(cors))
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "Inforobot",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn health(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    db::health_check(&state.db).await?;

    Ok(ApiResponse::success(json!({
        "status": "healthy",
        "database": "connected"
    })))
}
