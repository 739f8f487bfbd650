// Stream Configuration
//
// Configuration for the live log stream, loaded from environment variables.
// The WebSocket base URL is resolved from an explicit override, else derived
// from the console origin, else a local default.

use std::env;
use std::time::Duration;

use url::Url;

use crate::error::{Result, StreamError};

/// Fallback when neither an override nor a console origin is configured
pub const DEFAULT_WS_URL: &str = "ws://localhost:3001";

/// Path of the streaming endpoint, appended to the WebSocket base URL
pub const STREAM_PATH: &str = "/api/v1/logs/stream";

/// Fixed delay between a socket close and the next connection attempt
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Maximum number of undrained events kept before the oldest is dropped
pub const DEFAULT_BUFFER_CAPACITY: usize = 1000;

/// Server-side subscription filters sent with the stream handshake
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamFilters {
    pub session_id: Option<String>,
    pub employee_id: Option<String>,
    pub agent_id: Option<String>,
}

impl StreamFilters {
    fn pairs(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("session_id", self.session_id.as_deref()),
            ("employee_id", self.employee_id.as_deref()),
            ("agent_id", self.agent_id.as_deref()),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.filter(|v| !v.is_empty()).map(|v| (key, v)))
    }
}

/// Configuration for a log stream
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// WebSocket base URL (ws:// or wss://)
    pub ws_base_url: Url,

    /// Delay before reconnecting after the socket closes
    pub reconnect_delay: Duration,

    /// Buffer bound for undrained events
    pub buffer_capacity: usize,

    /// Subscription filters
    pub filters: StreamFilters,
}

impl StreamConfig {
    /// Create a configuration with default delay and capacity
    pub fn new(ws_base_url: Url) -> Self {
        Self {
            ws_base_url,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            filters: StreamFilters::default(),
        }
    }

    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `UBIK_WS_URL`: Explicit WebSocket base URL
    /// - `UBIK_CONSOLE_URL`: Console origin the WebSocket URL is derived from
    /// - `STREAM_RECONNECT_DELAY_MS`: Reconnect delay (default: 5000)
    /// - `STREAM_BUFFER_CAPACITY`: Buffer bound (default: 1000)
    pub fn from_env() -> Result<Self> {
        let explicit = env::var("UBIK_WS_URL").ok();
        let origin = env::var("UBIK_CONSOLE_URL").ok();
        let ws_base_url = resolve_ws_base(explicit.as_deref(), origin.as_deref())?;

        let reconnect_delay = env::var("STREAM_RECONNECT_DELAY_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_RECONNECT_DELAY);

        let buffer_capacity = env::var("STREAM_BUFFER_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_BUFFER_CAPACITY);

        Ok(Self {
            ws_base_url,
            reconnect_delay,
            buffer_capacity,
            filters: StreamFilters::default(),
        })
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity.max(1);
        self
    }

    pub fn with_filters(mut self, filters: StreamFilters) -> Self {
        self.filters = filters;
        self
    }

    /// Streaming endpoint URL carrying `token` as the connection credential
    pub fn stream_url(&self, token: &str) -> Url {
        let mut url = self.ws_base_url.clone();
        let path = format!("{}{}", url.path().trim_end_matches('/'), STREAM_PATH);
        url.set_path(&path);
        url.set_query(None);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("token", token);
            for (key, value) in self.filters.pairs() {
                query.append_pair(key, value);
            }
        }
        url
    }
}

/// Resolve the WebSocket base URL.
///
/// Precedence: explicit override, then the console origin with its scheme
/// swapped (`http` -> `ws`, `https` -> `wss`), then [`DEFAULT_WS_URL`].
/// Blank values count as unset.
pub fn resolve_ws_base(explicit: Option<&str>, origin: Option<&str>) -> Result<Url> {
    if let Some(explicit) = explicit.map(str::trim).filter(|s| !s.is_empty()) {
        return Ok(Url::parse(explicit)?);
    }

    if let Some(origin) = origin.map(str::trim).filter(|s| !s.is_empty()) {
        let mut url = Url::parse(origin)?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(StreamError::invalid_url(format!(
                    "unsupported console scheme: {}",
                    other
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| StreamError::invalid_url(format!("cannot use scheme {}", scheme)))?;
        url.set_path("");
        url.set_query(None);
        url.set_fragment(None);
        return Ok(url);
    }

    Ok(Url::parse(DEFAULT_WS_URL)?)
}
