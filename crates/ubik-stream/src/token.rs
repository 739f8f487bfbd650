// Token Exchange
//
// The console keeps its session in an httpOnly cookie that a WebSocket
// handshake cannot always carry. The stream therefore asks the console for a
// short-lived bearer token on every connect cycle. Tokens are never cached.

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, COOKIE};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::{Result, StreamError};

/// Same-origin route that exchanges the session cookie for a stream token
pub const TOKEN_PATH: &str = "/api/logs/ws-token";

pub use ubik_core::SESSION_COOKIE;

/// Source of stream tokens
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Fetch a fresh token for the streaming endpoint
    async fn fetch_token(&self) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Token source backed by the console's token endpoint
#[derive(Debug, Clone)]
pub struct HttpTokenSource {
    http: reqwest::Client,
    endpoint: Url,
    session_cookie: Option<String>,
}

impl HttpTokenSource {
    /// Create a token source for the console at `console_url`
    pub fn new(console_url: &Url) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            endpoint: console_url.join(TOKEN_PATH)?,
            session_cookie: None,
        })
    }

    /// Send `ubik_token=<value>` with each exchange (clients outside a browser)
    pub fn with_session_cookie(mut self, value: impl Into<String>) -> Self {
        self.session_cookie = Some(value.into());
        self
    }

    /// Use a preconfigured HTTP client
    pub fn with_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl TokenSource for HttpTokenSource {
    async fn fetch_token(&self) -> Result<String> {
        let mut request = self
            .http
            .get(self.endpoint.clone())
            .header(CACHE_CONTROL, "no-store");
        if let Some(cookie) = &self.session_cookie {
            request = request.header(COOKIE, format!("{}={}", SESSION_COOKIE, cookie));
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            return Err(StreamError::Unauthenticated);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(StreamError::TokenEndpoint {
                status: status.as_u16(),
                message,
            });
        }

        let body: TokenResponse = response.json().await?;
        if body.token.is_empty() {
            return Err(StreamError::Unauthenticated);
        }

        debug!(endpoint = %self.endpoint, "Fetched stream token");
        Ok(body.token)
    }
}

/// Token source for callers that already hold a bearer token
#[derive(Debug, Clone)]
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn fetch_token(&self) -> Result<String> {
        if self.token.is_empty() {
            return Err(StreamError::Unauthenticated);
        }
        Ok(self.token.clone())
    }
}
