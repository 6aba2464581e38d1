// src/routes/chat.rs
use axum::{
    Json,
    body::Body,
    extract::State,
    http::header,
    response::IntoResponse,
};

use crate::{
    error::AppError,
    message::{ChatRequest, ChatResponse},
    services::{normalizer, relay::RelayStream},
    state::SharedState,
};

/// Forward one message to Gemini and answer with the normalized reply.
pub async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let message = validate_message(&payload)?;

    let response = state.gemini.generate(message).await?;
    let reply = normalizer::extract_text(Some(&response));

    Ok(Json(ChatResponse { reply }))
}

/// Same request shape, but the reply is relayed incrementally: one `data:`
/// block per generated fragment, then a terminal `event: end` block.
pub async fn chat_stream_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<impl IntoResponse, AppError> {
    let message = validate_message(&payload)?;

    // Errors here (unreachable upstream, non-2xx) surface as a plain 500,
    // before any event byte is written.
    let upstream = state.gemini.generate_stream(message).await?;

    Ok((
        [(header::CONTENT_TYPE, "text/event-stream")],
        Body::from_stream(RelayStream::new(upstream)),
    ))
}

fn validate_message(payload: &ChatRequest) -> Result<&str, AppError> {
    let trimmed = payload.message.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest("message is required".to_string()));
    }
    Ok(trimmed)
}
