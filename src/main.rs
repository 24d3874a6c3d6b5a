use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use tabular_relay::app::ports::EventSinkPort;
use tabular_relay::config::Settings;
use tabular_relay::infra::{ProjectCreate, ProjectDirectory, ReqwestTransport, TracingEventSink};
use tabular_relay::server::{self, AppState};
use tabular_relay::{logging, metrics};

#[derive(Parser)]
#[command(name = "tabular_relay")]
#[command(about = "Per-tenant tabular file mapping, quality checks and delivery")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API and the background pipeline workers
    Serve {
        /// Overrides the configured port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run the pipeline once for a file and print the summary
    Run {
        #[arg(long)]
        project: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// Manage projects
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },
}

#[derive(Subcommand)]
enum ProjectCommands {
    /// Register a project and print its API key
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// List registered projects
    List,
}

fn build_state(settings: &Settings) -> anyhow::Result<(AppState, tokio::task::JoinHandle<()>)> {
    let transport = Arc::new(ReqwestTransport::new().context("building HTTP client")?);
    let events: Arc<dyn EventSinkPort> = Arc::new(TracingEventSink);
    AppState::build(settings, transport, events)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = logging::init_logging();
    let cli = Cli::parse();
    let settings = Settings::load().context("loading settings")?;

    match cli.command {
        Commands::Serve { port } => {
            if let Some(metrics_port) = settings.metrics_port {
                metrics::init_metrics(metrics_port);
            }
            let (state, _dispatcher) = build_state(&settings)?;
            let port = port.unwrap_or(settings.port);
            info!(port, endpoint = %settings.sender_endpoint, "starting tabular_relay");
            server::start_server(state, port).await?;
        }
        Commands::Run { project, file } => {
            let (state, _dispatcher) = build_state(&settings)?;
            match state.pipeline.process_file(&project, &file).await {
                Ok(summary) => {
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                }
                Err(e) => {
                    error!(project_id = %project, error = %e, "pipeline run failed");
                    return Err(e.into());
                }
            }
        }
        Commands::Project { command } => {
            let directory = ProjectDirectory::open(&settings.db_path)?;
            match command {
                ProjectCommands::Create { name, description } => {
                    let project = directory.create_project(&ProjectCreate { name, description })?;
                    println!("{}", serde_json::to_string_pretty(&project)?);
                }
                ProjectCommands::List => {
                    for p in directory.list_projects()? {
                        println!("{}\t{}\t{}", p.id, p.name, p.created_at);
                    }
                }
            }
        }
    }
    Ok(())
}
