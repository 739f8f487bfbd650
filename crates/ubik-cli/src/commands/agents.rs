// Agent configuration commands
//
// Configuration cascades organization -> team -> employee; the backend
// resolves it. These commands only display the result.

use anyhow::Result;
use clap::Subcommand;
use ubik_core::{ResolvedAgentConfig, ResolvedConfigsResponse};

use crate::client::{Client, ClientError};
use crate::output::{print_field, print_table_header, print_table_row, OutputFormat};

#[derive(Subcommand)]
pub enum AgentsCommand {
    /// Show the resolved agent configurations of an employee
    Resolved {
        /// Employee ID
        #[arg(long, short)]
        employee: String,

        /// Only this agent (ID or name), with its full configuration
        #[arg(long, short)]
        agent: Option<String>,
    },
}

pub async fn run(command: AgentsCommand, client: &Client, output: OutputFormat) -> Result<()> {
    match command {
        AgentsCommand::Resolved { employee, agent } => {
            resolved(client, output, &employee, agent.as_deref()).await
        }
    }
}

async fn resolved(
    client: &Client,
    output: OutputFormat,
    employee_id: &str,
    agent: Option<&str>,
) -> Result<()> {
    let response: ResolvedConfigsResponse = client
        .get(
            &format!("/employees/{}/agent-configs/resolved", employee_id),
            &[],
        )
        .await
        .map_err(|e| match e {
            ClientError::NotFound => anyhow::anyhow!("Employee not found: {}", employee_id),
            e => e.into(),
        })?;

    if let Some(wanted) = agent {
        let config = response
            .configs
            .iter()
            .find(|c| c.agent_id == wanted || c.agent_name == wanted)
            .ok_or_else(|| anyhow::anyhow!("No resolved configuration for agent: {}", wanted))?;
        return print_detail(output, config);
    }

    if !output.is_text() {
        return output.print_value(&response);
    }

    if response.configs.is_empty() {
        println!("No agent configurations");
        return Ok(());
    }

    print_table_header(&[
        ("AGENT", 24),
        ("TYPE", 14),
        ("PROVIDER", 12),
        ("ENABLED", 7),
        ("LAST SYNC", 20),
    ]);
    for config in &response.configs {
        print_table_row(&[
            (&config.agent_name, 24),
            (&config.agent_type, 14),
            (&config.provider, 12),
            (if config.is_enabled { "yes" } else { "no" }, 7),
            (config.last_synced_at.as_deref().unwrap_or("never"), 20),
        ]);
    }

    Ok(())
}

fn print_detail(output: OutputFormat, config: &ResolvedAgentConfig) -> Result<()> {
    if !output.is_text() {
        return output.print_value(config);
    }

    print_field("Agent", &config.agent_name);
    print_field("ID", &config.agent_id);
    print_field("Type", &config.agent_type);
    print_field("Provider", &config.provider);
    print_field("Enabled", if config.is_enabled { "yes" } else { "no" });
    if let Some(synced) = &config.last_synced_at {
        print_field("Last sync", synced);
    }

    let entries = config.config_entries();
    if !entries.is_empty() {
        println!();
        println!("Configuration:");
        for (key, value) in entries {
            println!("  {} = {}", key, value);
        }
    }

    if !config.system_prompt.is_empty() {
        println!();
        println!("System prompt:");
        for line in config.system_prompt.lines() {
            println!("  {}", line);
        }
    }

    Ok(())
}
