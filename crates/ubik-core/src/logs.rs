// Log history queries
//
// The live stream gives no backfill across reconnects; consumers that need a
// complete log page through history with these types instead.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CoreError, Result};
use crate::events::{ActivityEvent, EventCategory, EventType};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PER_PAGE: u32 = 20;

/// Filters for the paged log listing and the export endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<EventType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_category: Option<EventCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,
}

impl LogFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_employee(mut self, employee_id: impl Into<String>) -> Self {
        self.employee_id = Some(employee_id.into());
        self
    }

    pub fn with_event_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    pub fn with_page(mut self, page: u32, per_page: u32) -> Self {
        self.page = Some(page.max(1));
        self.per_page = Some(per_page.max(1));
        self
    }

    /// Query pairs for the filters that are set, plus pagination.
    ///
    /// Empty strings count as unset. `page` and `per_page` are always present
    /// and fall back to 1 and 20.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = self.filter_pairs();
        pairs.push(("page", self.page.unwrap_or(DEFAULT_PAGE).to_string()));
        pairs.push((
            "per_page",
            self.per_page.unwrap_or(DEFAULT_PER_PAGE).to_string(),
        ));
        pairs
    }

    /// Query pairs for the filters only, without pagination (used by export)
    pub fn filter_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();

        let strings = [
            ("session_id", &self.session_id),
            ("employee_id", &self.employee_id),
            ("agent_id", &self.agent_id),
            ("client_name", &self.client_name),
        ];
        for (key, value) in strings {
            if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
                pairs.push((key, v.to_string()));
            }
        }

        if let Some(t) = self.event_type {
            pairs.push(("event_type", t.to_string()));
        }
        if let Some(c) = self.event_category {
            pairs.push(("event_category", c.to_string()));
        }
        if let Some(start) = self.start_date {
            pairs.push(("start_date", start.to_rfc3339()));
        }
        if let Some(end) = self.end_date {
            pairs.push(("end_date", end.to_rfc3339()));
        }
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            pairs.push(("search", search.to_string()));
        }

        pairs
    }
}

/// Pagination metadata returned with a log page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

impl PaginationMeta {
    /// Whether a page after this one exists
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

/// One page of activity logs.
///
/// Rows are decoded one by one: a row the client cannot read (an event type
/// added on the server, a missing field) is logged and skipped, and the rest
/// of the page survives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawLogsPage")]
pub struct ListLogsResponse {
    pub logs: Vec<ActivityEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationMeta>,
    /// Rows of this page that could not be decoded
    #[serde(skip)]
    pub skipped: usize,
}

#[derive(Deserialize)]
struct RawLogsPage {
    #[serde(default)]
    logs: Vec<serde_json::Value>,
    #[serde(default)]
    pagination: Option<PaginationMeta>,
}

impl From<RawLogsPage> for ListLogsResponse {
    fn from(raw: RawLogsPage) -> Self {
        let mut logs = Vec::with_capacity(raw.logs.len());
        let mut skipped = 0;

        for row in raw.logs {
            let id = row
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            match ActivityEvent::from_value(row) {
                Ok(event) => logs.push(event),
                Err(e) => {
                    warn!(%id, error = %e, "Skipping unreadable log row");
                    skipped += 1;
                }
            }
        }

        Self {
            logs,
            pagination: raw.pagination,
            skipped,
        }
    }
}

/// File format for log export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    /// File extension used when the server sends no file name
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(CoreError::unknown("export format", other)),
        }
    }
}
