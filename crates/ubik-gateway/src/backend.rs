// Backend REST client
//
// Thin reqwest wrapper for the two log endpoints the gateway proxies. The
// session token is forwarded as a bearer credential on every call.

use reqwest::header::{HeaderName, CONTENT_DISPOSITION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::debug;
use ubik_core::PaginationMeta;
use url::Url;

use crate::error::GatewayError;

/// Log page as returned by the backend. Log entries pass through untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogsPage {
    #[serde(default)]
    pub logs: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationMeta>,
}

/// Export body plus the headers the client needs to save it
#[derive(Debug)]
pub struct ExportFile {
    pub content_type: String,
    pub content_disposition: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct BackendError {
    #[serde(alias = "message")]
    error: String,
}

#[derive(Debug, Clone)]
pub struct Backend {
    http: reqwest::Client,
    base_url: Url,
}

impl Backend {
    pub fn new(base_url: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let joined = format!("{}/{}", url.path().trim_end_matches('/'), path);
        url.set_path(&joined);
        url
    }

    /// GET /logs
    pub async fn list_logs(
        &self,
        token: &str,
        query: &[(String, String)],
    ) -> Result<LogsPage, GatewayError> {
        let url = self.endpoint("logs");
        debug!(%url, params = query.len(), "Fetching logs from backend");

        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<BackendError>(&body)
                .map(|e| e.error)
                .unwrap_or_else(|_| "Failed to fetch logs".to_string());
            return Err(GatewayError::Backend(message));
        }

        Ok(response.json().await?)
    }

    /// GET /logs/export
    pub async fn export_logs(
        &self,
        token: &str,
        query: &[(String, String)],
    ) -> Result<ExportFile, GatewayError> {
        let url = self.endpoint("logs/export");
        debug!(%url, "Exporting logs from backend");

        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Backend(format!(
                "Backend responded with {}",
                status.as_u16()
            )));
        }

        let header = |name: HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let content_type =
            header(CONTENT_TYPE).unwrap_or_else(|| "application/octet-stream".to_string());
        let content_disposition = header(CONTENT_DISPOSITION);

        Ok(ExportFile {
            content_type,
            content_disposition,
            body: response.bytes().await?.to_vec(),
        })
    }
}
