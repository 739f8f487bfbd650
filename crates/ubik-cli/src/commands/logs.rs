// Activity log commands: history, export and live tail

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use ubik_core::{ActivityEvent, EventCategory, EventType, ExportFormat, ListLogsResponse, LogFilters};
use ubik_stream::{
    resolve_ws_base, HttpTokenSource, LogStream, Phase, StaticTokenSource, StreamConfig,
    StreamError, StreamFilters, TokenSource, WsTransport,
};
use url::Url;

use crate::client::{Client, ClientError};
use crate::output::{print_table_header, print_table_row, OutputFormat};

#[derive(Subcommand)]
pub enum LogsCommand {
    /// List one page of activity logs
    List {
        #[command(flatten)]
        filters: FilterArgs,

        /// Page number
        #[arg(long, default_value = "1")]
        page: u32,

        /// Results per page
        #[arg(long, default_value = "20")]
        per_page: u32,
    },

    /// Export activity logs to a file
    Export {
        #[command(flatten)]
        filters: FilterArgs,

        /// File format (json or csv)
        #[arg(long, short, default_value = "json")]
        format: ExportFormat,

        /// Output file (default: server-provided name, else logs.<format>)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Tail the live activity stream until interrupted
    Stream {
        /// Only events of this session
        #[arg(long)]
        session: Option<String>,

        /// Only events of this employee
        #[arg(long)]
        employee: Option<String>,

        /// Only events of this agent
        #[arg(long)]
        agent: Option<String>,

        /// Show event payloads
        #[arg(long, short)]
        verbose: bool,
    },
}

#[derive(Args, Debug, Default)]
pub struct FilterArgs {
    /// Session ID
    #[arg(long)]
    pub session: Option<String>,

    /// Employee ID
    #[arg(long)]
    pub employee: Option<String>,

    /// Agent ID
    #[arg(long)]
    pub agent: Option<String>,

    /// Client name (e.g. claude-code)
    #[arg(long)]
    pub client: Option<String>,

    /// Event type (input, output, tool_call, ...)
    #[arg(long)]
    pub event_type: Option<EventType>,

    /// Event category (io, agent, mcp, ...)
    #[arg(long)]
    pub category: Option<EventCategory>,

    /// Events at or after this RFC 3339 time
    #[arg(long)]
    pub since: Option<DateTime<Utc>>,

    /// Events at or before this RFC 3339 time
    #[arg(long)]
    pub until: Option<DateTime<Utc>>,

    /// Full-text search in content
    #[arg(long)]
    pub search: Option<String>,
}

impl FilterArgs {
    fn into_filters(self) -> LogFilters {
        LogFilters {
            session_id: self.session,
            employee_id: self.employee,
            agent_id: self.agent,
            client_name: self.client,
            event_type: self.event_type,
            event_category: self.category,
            start_date: self.since,
            end_date: self.until,
            search: self.search,
            page: None,
            per_page: None,
        }
    }
}

/// Where the live stream gets its endpoint and credentials
pub struct StreamSettings {
    pub ws_url: Option<String>,
    pub console_url: Option<String>,
    pub token: Option<String>,
    pub session_cookie: Option<String>,
}

pub async fn run(
    command: LogsCommand,
    client: &Client,
    stream: StreamSettings,
    output: OutputFormat,
    quiet: bool,
) -> Result<()> {
    match command {
        LogsCommand::List {
            filters,
            page,
            per_page,
        } => list(client, output, filters.into_filters().with_page(page, per_page)).await,
        LogsCommand::Export {
            filters,
            format,
            out,
        } => export(client, quiet, filters.into_filters(), format, out).await,
        LogsCommand::Stream {
            session,
            employee,
            agent,
            verbose,
        } => {
            let filters = StreamFilters {
                session_id: session,
                employee_id: employee,
                agent_id: agent,
            };
            tail(stream, filters, output, quiet, verbose).await
        }
    }
}

async fn list(client: &Client, output: OutputFormat, filters: LogFilters) -> Result<()> {
    let response: ListLogsResponse = client.get("/logs", &filters.to_query_pairs()).await?;

    if !output.is_text() {
        return output.print_value(&response);
    }

    if response.skipped > 0 {
        eprintln!(
            "{} log entries on this page could not be read and were skipped",
            response.skipped
        );
    }

    if response.logs.is_empty() {
        println!("No logs found");
        return Ok(());
    }

    print_table_header(&[
        ("TIME", 19),
        ("TYPE", 14),
        ("CATEGORY", 10),
        ("EMPLOYEE", 12),
        ("CONTENT", 50),
    ]);
    for event in &response.logs {
        let time = event.created_at.format("%Y-%m-%d %H:%M:%S").to_string();
        print_table_row(&[
            (&time, 19),
            (event.event_type.as_str(), 14),
            (event.event_category.as_str(), 10),
            (event.employee_id.as_deref().unwrap_or("-"), 12),
            (event.content_or_empty(), 50),
        ]);
    }

    if let Some(pagination) = response.pagination {
        println!();
        println!(
            "Page {} of {} ({} total){}",
            pagination.page,
            pagination.total_pages.max(1),
            pagination.total,
            if pagination.has_next() {
                format!(", next: --page {}", pagination.page + 1)
            } else {
                String::new()
            }
        );
    }

    Ok(())
}

async fn export(
    client: &Client,
    quiet: bool,
    filters: LogFilters,
    format: ExportFormat,
    out: Option<PathBuf>,
) -> Result<()> {
    let mut query = filters.filter_pairs();
    query.push(("format", format.to_string()));

    let download = client
        .download("/logs/export", &query)
        .await
        .map_err(|e| match e {
            ClientError::NotFound => anyhow::anyhow!("Log export is not available on this server"),
            e => e.into(),
        })?;

    let path = out.unwrap_or_else(|| {
        PathBuf::from(
            download
                .filename
                .clone()
                .unwrap_or_else(|| format!("logs.{}", format.extension())),
        )
    });

    tokio::fs::write(&path, &download.body)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    if quiet {
        println!("{}", path.display());
    } else {
        println!("Exported {} bytes to {}", download.body.len(), path.display());
    }

    Ok(())
}

/// `[HH:MM:SS] [type:category] content`
pub fn format_event_line(event: &ActivityEvent) -> String {
    format!(
        "[{}] [{}:{}] {}",
        event.created_at.format("%H:%M:%S"),
        event.event_type,
        event.event_category,
        event.content_or_empty()
    )
}

fn print_event(event: &ActivityEvent, output: OutputFormat, verbose: bool) -> Result<()> {
    if !output.is_text() {
        return output.print_record(event);
    }

    println!("{}", format_event_line(event));
    if verbose && !event.payload.is_empty() {
        println!("  payload: {}", serde_json::to_string(&event.payload)?);
    }
    Ok(())
}

fn token_source(settings: &StreamSettings) -> Result<Arc<dyn TokenSource>> {
    if let Some(token) = settings.token.as_deref().filter(|t| !t.is_empty()) {
        return Ok(Arc::new(StaticTokenSource::new(token)));
    }

    let console = settings
        .console_url
        .as_deref()
        .context("Streaming needs --token, or --console-url with a session cookie")?;
    let console = Url::parse(console).with_context(|| format!("Invalid console URL: {}", console))?;

    let mut source = HttpTokenSource::new(&console)?;
    if let Some(cookie) = settings.session_cookie.as_deref().filter(|c| !c.is_empty()) {
        source = source.with_session_cookie(cookie);
    }
    Ok(Arc::new(source))
}

async fn tail(
    settings: StreamSettings,
    filters: StreamFilters,
    output: OutputFormat,
    quiet: bool,
    verbose: bool,
) -> Result<()> {
    let mut config = StreamConfig::from_env()?.with_filters(filters);
    config.ws_base_url =
        resolve_ws_base(settings.ws_url.as_deref(), settings.console_url.as_deref())?;
    let tokens = token_source(&settings)?;

    if !quiet {
        eprintln!("Connecting to {} ...", config.ws_base_url);
    }

    let mut stream = LogStream::connect(config, tokens, Arc::new(WsTransport::new()));
    let result = follow(&mut stream, tokio::signal::ctrl_c(), output, quiet, verbose).await;
    stream.stop().await;

    let dropped = stream.dropped_events();
    if dropped > 0 && !quiet {
        eprintln!("{} events dropped while the terminal was busy", dropped);
    }

    result
}

/// Print events as they arrive until `shutdown` resolves or the stream gives up
async fn follow<S>(
    stream: &mut LogStream,
    shutdown: S,
    output: OutputFormat,
    quiet: bool,
    verbose: bool,
) -> Result<()>
where
    S: std::future::Future,
{
    // One listener for the whole loop, so a signal that lands while events
    // are being printed is still seen
    tokio::pin!(shutdown);
    let mut phase = Phase::Idle;

    loop {
        tokio::select! {
            _ = &mut shutdown => break Ok(()),
            alive = stream.changed() => {
                if !alive {
                    break Ok(());
                }
            }
        }

        let printed = stream
            .clear_new_events()
            .iter()
            .try_for_each(|event| print_event(event, output, verbose));
        if let Err(e) = printed {
            break Err(e);
        }

        let current = stream.phase();
        if current != phase {
            if !quiet {
                report_phase(current, stream.last_error().as_ref());
            }
            phase = current;
        }

        // A failed token exchange is not retried; give up instead of idling
        if current == Phase::Idle {
            if let Some(error) = stream.last_error() {
                break Err(token_error(error));
            }
        }
    }
}

fn report_phase(phase: Phase, error: Option<&StreamError>) {
    match (phase, error) {
        (Phase::Open, _) => eprintln!("Connected, waiting for events (Ctrl+C to stop)"),
        (Phase::Closed, Some(error)) => {
            eprintln!("Disconnected ({}), reconnecting...", error)
        }
        (Phase::Closed, None) => eprintln!("Disconnected, reconnecting..."),
        _ => {}
    }
}

fn token_error(error: StreamError) -> anyhow::Error {
    match error {
        StreamError::Unauthenticated => {
            anyhow::anyhow!("Not authenticated: the console rejected the session")
        }
        other => anyhow::anyhow!("Failed to obtain a stream token: {}", other),
    }
}
