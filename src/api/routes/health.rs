//! Liveness and service info endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::api::server::AppState;
use crate::VERSION;

/// GET /: service banner.
pub async fn root(State(state): State<Arc<AppState>>) -> Json<Value> {
    let app = &state.config.app;
    let docs = if app.debug {
        "/docs"
    } else {
        "Documentation disabled in production"
    };
    Json(json!({
        "name": app.name,
        "version": VERSION,
        "status": "running",
        "docs": docs,
        "api": { "v1": app.api_prefix },
    }))
}

/// GET /health: application liveness.
pub async fn app_health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let app = &state.config.app;
    Json(json!({
        "status": "healthy",
        "application": app.name,
        "version": VERSION,
        "environment": if app.debug { "development" } else { "production" },
    }))
}

/// GET {prefix}/health: API liveness.
pub async fn api_health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": "v1",
        "message": "Mnemosine Backend API is running",
    }))
}
