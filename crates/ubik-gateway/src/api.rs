// Console log routes
//
// Same-origin endpoints used by browser and CLI consumers:
// - GET /api/logs/ws-token: session cookie -> stream token
// - GET /api/logs: paged log history, proxied to the backend
// - GET /api/logs/export: file export, proxied to the backend

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::backend::{Backend, LogsPage};
use crate::error::GatewayError;
use crate::session::SessionToken;

/// Page size when the caller does not ask for one
pub const DEFAULT_PER_PAGE: u32 = 100;

// ============================================
// App State and Routes
// ============================================

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<Backend>,
}

impl AppState {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/logs/ws-token", get(ws_token))
        .route("/api/logs", get(list_logs))
        .route("/api/logs/export", get(export_logs))
        .with_state(state)
}

// ============================================
// Request/Response types
// ============================================

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Query accepted by GET /api/logs. Values stay strings so the backend owns
/// their validation; blank values are dropped.
#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    pub session_id: Option<String>,
    pub employee_id: Option<String>,
    pub agent_id: Option<String>,
    pub client_name: Option<String>,
    pub event_type: Option<String>,
    pub event_category: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub search: Option<String>,
    pub page: Option<String>,
    pub per_page: Option<String>,
}

impl LogsQuery {
    /// Backend query pairs; page defaults to 1 and per_page to 100
    pub fn to_backend_query(&self) -> Vec<(String, String)> {
        let filters = [
            ("session_id", &self.session_id),
            ("employee_id", &self.employee_id),
            ("agent_id", &self.agent_id),
            ("client_name", &self.client_name),
            ("event_type", &self.event_type),
            ("event_category", &self.event_category),
            ("start_date", &self.start_date),
            ("end_date", &self.end_date),
            ("search", &self.search),
        ];

        let mut query: Vec<(String, String)> = filters
            .into_iter()
            .filter_map(|(key, value)| {
                value
                    .as_deref()
                    .filter(|v| !v.is_empty())
                    .map(|v| (key.to_string(), v.to_string()))
            })
            .collect();

        let page = parse_positive(&self.page).unwrap_or(1);
        let per_page = parse_positive(&self.per_page).unwrap_or(DEFAULT_PER_PAGE);
        query.push(("page".to_string(), page.to_string()));
        query.push(("per_page".to_string(), per_page.to_string()));
        query
    }
}

fn parse_positive(value: &Option<String>) -> Option<u32> {
    value
        .as_deref()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|v| *v > 0)
}

// ============================================
// HTTP Handlers
// ============================================

/// GET /api/logs/ws-token - Hand the session token to the stream client
pub async fn ws_token(SessionToken(token): SessionToken) -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, "no-store")],
        Json(TokenResponse { token }),
    )
}

/// GET /api/logs - One page of activity logs
pub async fn list_logs(
    State(state): State<AppState>,
    SessionToken(token): SessionToken,
    Query(query): Query<LogsQuery>,
) -> Result<Json<LogsPage>, GatewayError> {
    let page = state
        .backend
        .list_logs(&token, &query.to_backend_query())
        .await?;
    Ok(Json(page))
}

/// GET /api/logs/export - Export logs; every query parameter is forwarded
pub async fn export_logs(
    State(state): State<AppState>,
    SessionToken(token): SessionToken,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<impl IntoResponse, GatewayError> {
    let file = state.backend.export_logs(&token, &params).await?;

    let mut headers = HeaderMap::new();
    let content_type = HeaderValue::from_str(&file.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    headers.insert(header::CONTENT_TYPE, content_type);
    if let Some(value) = file
        .content_disposition
        .as_deref()
        .and_then(|v| HeaderValue::from_str(v).ok())
    {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    Ok((headers, file.body))
}
