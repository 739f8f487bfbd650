// Ubik console core types
//
// Shared by the live stream client, the console gateway and the CLI:
// - Activity events as recorded by the backend
// - Log history query parameters and pagination
// - Resolved organization -> team -> employee agent configuration

pub mod agent_config;
pub mod error;
pub mod events;
pub mod logs;

pub use agent_config::{ResolvedAgentConfig, ResolvedConfigsResponse};
pub use error::{CoreError, Result};
pub use events::{ActivityEvent, EventCategory, EventType};
pub use logs::{ExportFormat, ListLogsResponse, LogFilters, PaginationMeta};

/// Name of the httpOnly cookie holding the console session token
pub const SESSION_COOKIE: &str = "ubik_token";
