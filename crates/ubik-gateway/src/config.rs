// Gateway configuration loaded from environment variables.
// Decision: Backend base URL defaults to a local API so development needs no setup

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use url::Url;

/// Backend REST API used when API_URL is unset
pub const DEFAULT_API_URL: &str = "http://localhost:3001/api/v1";

pub const DEFAULT_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Backend REST API base, including its version prefix
    pub api_url: Url,
    /// Listen address
    pub addr: String,
    /// Origins allowed to call the gateway cross-origin (empty: same-origin only)
    pub cors_origins: Vec<HeaderValue>,
}

impl GatewayConfig {
    /// Environment variables:
    /// - `API_URL`: Backend REST API base (default: http://localhost:3001/api/v1)
    /// - `GATEWAY_ADDR`: Listen address (default: 0.0.0.0:3000)
    /// - `CORS_ALLOWED_ORIGINS`: Comma-separated origins (optional)
    pub fn from_env() -> Result<Self> {
        let api_url = std::env::var("API_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_url = Url::parse(&api_url).with_context(|| format!("Invalid API_URL: {}", api_url))?;

        let addr = std::env::var("GATEWAY_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());

        let cors_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| s.split(',').filter_map(|s| s.trim().parse().ok()).collect())
            .unwrap_or_default();

        Ok(Self {
            api_url,
            addr,
            cors_origins,
        })
    }
}
