// src/routes/mod.rs
pub mod chat;

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde_json::{Value, json};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::SharedState;
use chat::{chat_handler, chat_stream_handler};

pub fn create_router() -> Router<SharedState> {
    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/stream", post(chat_stream_handler))
        .route("/api/health", get(health_handler))
        // The chat UI itself is plain static files served from public/.
        .fallback_service(ServeDir::new("public"))
        .layer(TraceLayer::new_for_http())
}

async fn health_handler(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({ "status": "healthy", "model": state.config.model }))
}
