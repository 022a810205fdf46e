use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::sync::watch;
use vault_desktop_lib::bridge::RequestOptions;
use vault_desktop_lib::memory::DEFAULT_MEMORY_LIMIT;
use vault_desktop_lib::models::{
    AppendMemoryPayload, CreateProjectPayload, CreateTicketPayload, ImportAgentPayload, ImportProjectFromPathPayload,
    ImportTicketPayload, TicketPriority, TicketStatus, TicketType,
};
use vault_desktop_lib::{init_tracing, VaultConfig, VaultCore};

#[derive(Parser)]
#[command(name = "vault-desktop")]
#[command(about = "Local-first project, ticket and agent vault")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List projects
    Projects {
        /// Include archived projects
        #[arg(long)]
        all: bool,
    },
    /// Create a project (seeds the default agents)
    CreateProject {
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        conventions: Option<String>,
    },
    /// Register an existing git checkout as a project
    ImportPath {
        name: String,
        repo_path: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Archive a project, or restore it with --restore
    Archive {
        project: String,
        #[arg(long)]
        restore: bool,
    },
    /// List tickets of a project
    Tickets { project: String },
    /// Create a ticket
    CreateTicket {
        project: String,
        title: String,
        #[arg(long = "type", default_value = "task")]
        ticket_type: String,
        #[arg(long, default_value = "P2")]
        priority: String,
        #[arg(long, default_value = "backlog")]
        status: String,
        #[arg(long, default_value = "")]
        assignee: String,
        #[arg(long)]
        estimate: Option<u32>,
        #[arg(long)]
        spec: Option<String>,
        #[arg(long = "label")]
        labels: Vec<String>,
    },
    /// Move a ticket to another status
    SetStatus { ticket: String, status: String },
    /// List agents of a project
    Agents {
        project: String,
        /// Hide inactive agents
        #[arg(long)]
        active_only: bool,
    },
    /// Show the most recent memory entries of a project
    Memory {
        project: String,
        #[arg(long, default_value_t = DEFAULT_MEMORY_LIMIT)]
        limit: usize,
    },
    /// Append a session summary to a project's memory
    Remember {
        project: String,
        agent: String,
        summary: String,
    },
    /// Print the handoff document for a ticket
    Handoff { ticket: String },
    /// Write a ticket to markdown under the data directory
    Export { ticket: String },
    /// Read from or import out of a remote vault
    Remote {
        /// Remote vault URL; defaults to VAULT_BRIDGE_URL
        #[arg(long, global = true)]
        url: Option<String>,
        #[command(subcommand)]
        command: RemoteCommands,
    },
}

#[derive(Subcommand)]
enum RemoteCommands {
    /// Snapshot of every remote project
    Overview,
    /// Copy a remote agent into a local project
    ImportAgent {
        source_project: String,
        source_agent: String,
        target_project: String,
    },
    /// Copy a remote ticket into a local project
    ImportTicket {
        source_project: String,
        source_ticket: String,
        target_project: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = VaultConfig::from_env()?;
    init_tracing(&config).context("failed to initialise logging")?;

    let vault = VaultCore::open(config).context("failed to open vault")?;
    let outcome = run(&vault, cli.command).await;
    vault.close()?;
    outcome
}

async fn run(vault: &VaultCore, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Projects { all } => print_json(&vault.list_projects(all)?),
        Commands::CreateProject {
            name,
            description,
            conventions,
        } => print_json(&vault.create_project(CreateProjectPayload {
            name,
            description,
            conventions,
            ..CreateProjectPayload::default()
        })?),
        Commands::ImportPath {
            name,
            repo_path,
            description,
        } => print_json(&vault.import_project_from_path(ImportProjectFromPathPayload {
            name,
            repo_path,
            description,
        })?),
        Commands::Archive { project, restore } => print_json(&vault.set_project_archive_state(&project, !restore)?),
        Commands::Tickets { project } => print_json(&vault.list_tickets(&project)?),
        Commands::CreateTicket {
            project,
            title,
            ticket_type,
            priority,
            status,
            assignee,
            estimate,
            spec,
            labels,
        } => print_json(&vault.create_ticket(CreateTicketPayload {
            project_id: project,
            title,
            ticket_type: TicketType::parse(&ticket_type).ok_or_else(|| anyhow!("unknown ticket type: {ticket_type}"))?,
            priority: TicketPriority::parse(&priority).ok_or_else(|| anyhow!("unknown priority: {priority}"))?,
            status: parse_status(&status)?,
            assignee,
            estimate,
            spec_markdown: spec,
            acceptance_criteria: None,
            test_plan: None,
            dependencies: None,
            labels: Some(labels),
        })?),
        Commands::SetStatus { ticket, status } => {
            print_json(&vault.update_ticket_status(&ticket, parse_status(&status)?)?)
        }
        Commands::Agents { project, active_only } => print_json(&vault.list_agents(&project, !active_only)?),
        Commands::Memory { project, limit } => print_json(&vault.list_memory(&project, limit)?),
        Commands::Remember {
            project,
            agent,
            summary,
        } => print_json(&vault.append_memory(
            &project,
            AppendMemoryPayload {
                agent_id: agent,
                task_summary: summary,
                ..AppendMemoryPayload::default()
            },
        )?),
        Commands::Handoff { ticket } => {
            println!("{}", vault.generate_handoff(&ticket)?);
            Ok(())
        }
        Commands::Export { ticket } => {
            println!("{}", vault.export_ticket_markdown(&ticket)?.display());
            Ok(())
        }
        Commands::Remote { url, command } => run_remote(vault, url.unwrap_or_default(), command).await,
    }
}

async fn run_remote(vault: &VaultCore, base_url: String, command: RemoteCommands) -> anyhow::Result<()> {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; cancelling remote call");
            let _ = cancel_tx.send(true);
        }
    });
    let options = RequestOptions::with_cancel(cancel_rx);

    let result = match command {
        RemoteCommands::Overview => {
            let url = (!base_url.is_empty()).then_some(base_url.as_str());
            print_json(&vault.remote_overview(url, &options).await?)
        }
        RemoteCommands::ImportAgent {
            source_project,
            source_agent,
            target_project,
        } => print_json(
            &vault
                .import_agent_from_remote(
                    ImportAgentPayload {
                        base_url,
                        source_project_id: source_project,
                        source_agent_id: source_agent,
                        target_project_id: target_project,
                    },
                    &options,
                )
                .await?,
        ),
        RemoteCommands::ImportTicket {
            source_project,
            source_ticket,
            target_project,
        } => print_json(
            &vault
                .import_ticket_from_remote(
                    ImportTicketPayload {
                        base_url,
                        source_project_id: source_project,
                        source_ticket_id: source_ticket,
                        target_project_id: target_project,
                    },
                    &options,
                )
                .await?,
        ),
    };
    interrupt.abort();
    result
}

fn parse_status(raw: &str) -> anyhow::Result<TicketStatus> {
    TicketStatus::parse(raw).ok_or_else(|| anyhow!("unknown ticket status: {raw}"))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
