// Ubik console gateway
// Decision: Health stays outside /api so load balancers need no session
// Decision: CORS only when origins are configured; the console is same-origin by default

mod api;
mod backend;
mod config;
mod error;
mod session;

use anyhow::{Context, Result};
use axum::http::{header, Method};
use axum::{routing::get, Json, Router};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::backend::Backend;
use crate::config::GatewayConfig;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Full router: health plus the log routes, with CORS when configured
fn build_app(config: &GatewayConfig) -> Router {
    let state = api::AppState::new(Backend::new(config.api_url.clone()));

    let app = Router::new()
        .route("/health", get(health))
        .merge(api::routes(state));

    if config.cors_origins.is_empty() {
        return app;
    }

    app.layer(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(config.cors_origins.clone()))
            .allow_methods([Method::GET, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::CACHE_CONTROL])
            .allow_credentials(true),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ubik_gateway=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("ubik-gateway starting...");

    let config = GatewayConfig::from_env()?;
    tracing::info!(api_url = %config.api_url, "Proxying to backend");
    if config.cors_origins.is_empty() {
        tracing::info!("CORS not configured (same-origin requests only)");
    } else {
        tracing::info!(origins = ?config.cors_origins, "CORS origins configured");
    }

    let app = build_app(&config).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.addr)
        .await
        .context("Failed to bind to address")?;
    tracing::info!("HTTP server listening on {}", config.addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use url::Url;

    fn test_config() -> GatewayConfig {
        GatewayConfig {
            api_url: Url::parse(config::DEFAULT_API_URL).unwrap(),
            addr: config::DEFAULT_ADDR.to_string(),
            cors_origins: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_health() {
        let app = build_app(&test_config());

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_logs_route_requires_session() {
        let app = build_app(&test_config());

        let response = app
            .oneshot(Request::builder().uri("/api/logs").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), 401);
    }

    #[tokio::test]
    async fn test_cors_preflight_when_configured() {
        let mut config = test_config();
        config.cors_origins = vec!["https://console.example.com".parse().unwrap()];
        let app = build_app(&config);

        let response = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/api/logs")
                    .header("origin", "https://console.example.com")
                    .header("access-control-request-method", "GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .unwrap(),
            "https://console.example.com"
        );
    }
}
