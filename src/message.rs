// src/message.rs
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    // Reserved fields some clients still send; the relay keeps no per-user state.
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub use_gemini: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
}
