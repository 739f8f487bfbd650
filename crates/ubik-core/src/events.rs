// Activity Event Model
//
// Activity events are recorded and persisted by the console backend. The live
// stream and the paged history endpoint both deliver the same JSON shape, so
// one type serves both. Clients never mutate or delete events.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{CoreError, Result};

// ============================================================================
// Event Type
// ============================================================================

/// Kind of action an activity event records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "input")]
    Input,
    #[serde(rename = "output")]
    Output,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "session_start")]
    SessionStart,
    #[serde(rename = "session_end")]
    SessionEnd,
    #[serde(rename = "agent.installed")]
    AgentInstalled,
    #[serde(rename = "mcp.configured")]
    McpConfigured,
    #[serde(rename = "config.synced")]
    ConfigSynced,
    // Classified proxy traffic
    #[serde(rename = "user_prompt")]
    UserPrompt,
    #[serde(rename = "ai_text")]
    AiText,
    #[serde(rename = "tool_call")]
    ToolCall,
    #[serde(rename = "tool_result")]
    ToolResult,
    #[serde(rename = "api_request")]
    ApiRequest,
    #[serde(rename = "api_response")]
    ApiResponse,
}

impl EventType {
    pub const ALL: [EventType; 14] = [
        EventType::Input,
        EventType::Output,
        EventType::Error,
        EventType::SessionStart,
        EventType::SessionEnd,
        EventType::AgentInstalled,
        EventType::McpConfigured,
        EventType::ConfigSynced,
        EventType::UserPrompt,
        EventType::AiText,
        EventType::ToolCall,
        EventType::ToolResult,
        EventType::ApiRequest,
        EventType::ApiResponse,
    ];

    /// Wire name of the event type
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Input => "input",
            EventType::Output => "output",
            EventType::Error => "error",
            EventType::SessionStart => "session_start",
            EventType::SessionEnd => "session_end",
            EventType::AgentInstalled => "agent.installed",
            EventType::McpConfigured => "mcp.configured",
            EventType::ConfigSynced => "config.synced",
            EventType::UserPrompt => "user_prompt",
            EventType::AiText => "ai_text",
            EventType::ToolCall => "tool_call",
            EventType::ToolResult => "tool_result",
            EventType::ApiRequest => "api_request",
            EventType::ApiResponse => "api_response",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CoreError::unknown("event type", s))
    }
}

// ============================================================================
// Event Category
// ============================================================================

/// Broad grouping used for filtering in the log views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Io,
    Agent,
    Mcp,
    Auth,
    Admin,
    Classified,
    Proxy,
}

impl EventCategory {
    pub const ALL: [EventCategory; 7] = [
        EventCategory::Io,
        EventCategory::Agent,
        EventCategory::Mcp,
        EventCategory::Auth,
        EventCategory::Admin,
        EventCategory::Classified,
        EventCategory::Proxy,
    ];

    /// Wire name of the category
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Io => "io",
            EventCategory::Agent => "agent",
            EventCategory::Mcp => "mcp",
            EventCategory::Auth => "auth",
            EventCategory::Admin => "admin",
            EventCategory::Classified => "classified",
            EventCategory::Proxy => "proxy",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventCategory {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        EventCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| CoreError::unknown("event category", s))
    }
}

// ============================================================================
// Activity Event
// ============================================================================

/// One recorded action in an organization.
///
/// Required on the wire: `id`, `org_id`, `event_type`, `event_category` and
/// `created_at`. The stream hub historically named the timestamp `timestamp`;
/// both spellings are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// Unique event identifier
    pub id: String,

    /// Organization the event belongs to
    pub org_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,

    /// Name of the client that produced the event (e.g. the CLI or a proxy)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_version: Option<String>,

    pub event_type: EventType,

    pub event_category: EventCategory,

    /// Free-text content (prompt text, error message, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Arbitrary key-value payload; `null` and absent both decode as empty
    #[serde(default, deserialize_with = "null_as_empty")]
    pub payload: serde_json::Map<String, serde_json::Value>,

    /// When the backend recorded the event
    #[serde(alias = "timestamp")]
    pub created_at: DateTime<Utc>,
}

fn null_as_empty<'de, D>(
    deserializer: D,
) -> std::result::Result<serde_json::Map<String, serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<serde_json::Map<String, serde_json::Value>>::deserialize(deserializer)
        .map(Option::unwrap_or_default)
}

impl ActivityEvent {
    /// Decode one event from a JSON text frame.
    ///
    /// Fails on invalid JSON, unknown enum values, missing required fields and
    /// empty identifiers.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str::<ActivityEvent>(text)?.validated()
    }

    /// Decode one event from an already parsed JSON value, with the same
    /// checks as [`ActivityEvent::from_json`]
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value::<ActivityEvent>(value)?.validated()
    }

    fn validated(self) -> Result<Self> {
        let event = self;
        if event.id.is_empty() {
            return Err(CoreError::MissingField("id"));
        }
        if event.org_id.is_empty() {
            return Err(CoreError::MissingField("org_id"));
        }
        Ok(event)
    }

    /// Content, or an empty string when the event carries none
    pub fn content_or_empty(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}
