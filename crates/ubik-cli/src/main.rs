// Ubik CLI
//
// Design Decision: Use clap derive with env fallbacks so the same variables drive the console and the CLI.
// Design Decision: Support text/json/yaml output formats for scripting.
// Design Decision: History goes straight to the backend API; the live tail goes through the stream client.

mod client;
mod commands;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ubik")]
#[command(about = "Ubik CLI - Browse, export and tail activity logs")]
#[command(version)]
pub struct Cli {
    /// Backend API base URL
    #[arg(long, env = "API_URL", default_value = "http://localhost:3001/api/v1")]
    pub api_url: String,

    /// Console URL (token exchange and stream URL derivation)
    #[arg(long, env = "UBIK_CONSOLE_URL")]
    pub console_url: Option<String>,

    /// WebSocket base URL for the live stream
    #[arg(long, env = "UBIK_WS_URL")]
    pub ws_url: Option<String>,

    /// Bearer token for the backend and the stream
    #[arg(long, env = "UBIK_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Console session cookie value, exchanged for a stream token
    #[arg(long, env = "UBIK_SESSION_COOKIE", hide_env_values = true)]
    pub session_cookie: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "text", value_parser = ["text", "json", "yaml"])]
    pub output: String,

    /// Suppress non-essential output
    #[arg(long, short)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Browse, export and tail activity logs
    Logs {
        #[command(subcommand)]
        command: commands::logs::LogsCommand,
    },

    /// Inspect resolved agent configurations
    Agents {
        #[command(subcommand)]
        command: commands::agents::AgentsCommand,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Diagnostics go to stderr so they never mix with command output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ubik_cli=warn,ubik_stream=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let client = client::Client::new(&cli.api_url, cli.token.clone());
    let output_format = output::OutputFormat::from_str(&cli.output);

    match cli.command {
        Commands::Logs { command } => {
            let stream = commands::logs::StreamSettings {
                ws_url: cli.ws_url,
                console_url: cli.console_url,
                token: cli.token,
                session_cookie: cli.session_cookie,
            };
            commands::logs::run(command, &client, stream, output_format, cli.quiet).await
        }
        Commands::Agents { command } => {
            commands::agents::run(command, &client, output_format).await
        }
    }
}
