// src/services/gemini.rs
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Serialize;
use serde_json::Value;

use crate::config::Config;
use crate::error::AppError;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

// The message becomes the sole text part of a single user turn.
fn single_user_turn(message: &str) -> GenerateRequest<'_> {
    GenerateRequest {
        contents: vec![Content {
            role: "user",
            parts: vec![Part { text: message }],
        }],
    }
}

/// Client for the generativelanguage `generateContent` endpoints.
///
/// Cheap to clone; the inner `reqwest::Client` pools connections but that
/// never affects observable reply content or ordering.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    generate_url: String,
    stream_url: String,
    api_key: String,
    request_timeout: Duration,
}

impl GeminiClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        // read_timeout bounds how long a stalled streaming response may sit
        // idle before the relay gives up on it.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .read_timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            http,
            generate_url: config.generate_url(),
            stream_url: config.stream_url(),
            api_key: config.api_key.clone(),
            request_timeout: config.request_timeout,
        })
    }

    /// One blocking round trip. Returns the raw upstream payload; shape
    /// normalization is the caller's business.
    pub async fn generate(&self, message: &str) -> Result<Value, AppError> {
        tracing::debug!(url = %self.generate_url, "forwarding message to Gemini");

        let response = self
            .http
            .post(&self.generate_url)
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.request_timeout)
            .json(&single_user_turn(message))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Upstream {
                detail: error_detail(response).await,
            });
        }

        Ok(response.json().await?)
    }

    /// Open the SSE variant of the endpoint and hand back the raw byte
    /// stream. Fails before any byte is produced when the connection cannot
    /// be established or upstream answers non-2xx.
    pub async fn generate_stream(
        &self,
        message: &str,
    ) -> Result<BoxStream<'static, reqwest::Result<Bytes>>, AppError> {
        tracing::debug!(url = %self.stream_url, "opening Gemini stream");

        let response = self
            .http
            .post(&self.stream_url)
            .header("x-goog-api-key", &self.api_key)
            .json(&single_user_turn(message))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Upstream {
                detail: error_detail(response).await,
            });
        }

        Ok(response.bytes_stream().boxed())
    }
}

// Prefer the upstream's JSON error body, fall back to its raw text.
async fn error_detail(response: reqwest::Response) -> Value {
    let status = response.status();
    match response.text().await {
        Ok(body) => serde_json::from_str(&body).unwrap_or(Value::String(body)),
        Err(_) => Value::String(format!("upstream returned {status}")),
    }
}
