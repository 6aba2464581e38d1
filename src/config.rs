// src/config.rs
use std::time::Duration;

use anyhow::Context;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_PORT: u16 = 3000;

/// Process-wide settings, read once at startup and passed down explicitly.
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub model: String,
    pub api_key: String,
    pub base_url: String,
    pub request_timeout: Duration,
}

impl Config {
    /// Load from the process environment. Missing `GEMINI_API_KEY` is fatal:
    /// the server must not come up without a credential.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let api_key = get("GEMINI_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .context("GEMINI_API_KEY is not set; add it to the environment or .env")?;

        let port = match get("PORT") {
            Some(raw) => raw.parse().context("PORT is not a valid port number")?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            port,
            model: get("MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_key,
            base_url: get("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            request_timeout: Duration::from_secs(30),
        })
    }

    pub fn generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    pub fn stream_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}
