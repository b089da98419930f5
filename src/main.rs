// ABOUTME: Entry point for the switchboard binary.
// ABOUTME: Parses CLI arguments, initializes tracing, and serves or chats with agent networks.

mod cli;
mod coded_tools;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use switchboard_agent::{
    AgentServices, AgentSession, DefaultLlmFactory, DirectAgentSession, HttpAgentSession,
    SessionManager,
};
use switchboard_server::{AppState, ServerConfig, create_router, spawn_session_pruner};

use crate::cli::{ChatOptions, run_chat_loop};
use crate::coded_tools::builtin_coded_tools;

/// How often idle polling sessions are swept.
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Switchboard - multi-agent LLM call-graph runtime
#[derive(Parser, Debug)]
#[command(name = "switchboard")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve every network of a manifest over HTTP
    Serve {
        /// Manifest of networks (default: SWITCHBOARD_MANIFEST or registries/manifest.json)
        #[arg(long, value_name = "PATH")]
        manifest: Option<PathBuf>,

        /// Address to listen on (default: SWITCHBOARD_BIND or 127.0.0.1:8080)
        #[arg(long)]
        bind: Option<SocketAddr>,
    },

    /// Chat interactively with one agent network
    Chat {
        /// Network to talk to
        #[arg(long)]
        agent: String,

        /// Base URL of a running switchboard server
        #[arg(long, conflicts_with = "manifest")]
        url: Option<String>,

        /// Run the network in-process from this manifest
        #[arg(long, value_name = "PATH")]
        manifest: Option<PathBuf>,

        /// Use the polling chat/logs operations instead of streaming
        #[arg(long, default_value = "false")]
        poll: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("switchboard=info,tower_http=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Commands::Serve { manifest, bind } => serve(manifest, bind).await,
        Commands::Chat {
            agent,
            url,
            manifest,
            poll,
        } => chat(agent, url, manifest, poll).await,
    }
}

fn load_services(config: &ServerConfig) -> anyhow::Result<AgentServices> {
    let llm_factory = Arc::new(DefaultLlmFactory::new(
        config.default_provider.clone(),
        config.default_model.clone(),
    ));
    AgentServices::from_manifest(
        &config.manifest,
        config.agent_tool_path.as_deref(),
        llm_factory,
        builtin_coded_tools(),
    )
    .with_context(|| format!("loading manifest {}", config.manifest.display()))
}

async fn serve(manifest: Option<PathBuf>, bind: Option<SocketAddr>) -> anyhow::Result<()> {
    let mut config = ServerConfig::from_env()?;
    if let Some(manifest) = manifest {
        config.manifest = manifest;
    }
    if let Some(bind) = bind {
        config.bind = bind;
    }

    let services = load_services(&config)?;
    let state = Arc::new(AppState::new(services, config.session_ttl));
    spawn_session_pruner(state.clone(), PRUNE_INTERVAL);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!(
        addr = %config.bind,
        networks = ?state.services.network_names(),
        "switchboard listening"
    );
    axum::serve(listener, create_router(state)).await?;
    Ok(())
}

async fn chat(
    agent: String,
    url: Option<String>,
    manifest: Option<PathBuf>,
    poll: bool,
) -> anyhow::Result<()> {
    let session: Box<dyn AgentSession> = match url {
        Some(url) => Box::new(HttpAgentSession::new(reqwest::Client::new(), url, agent)),
        None => {
            let mut config = ServerConfig::from_env()?;
            if let Some(manifest) = manifest {
                config.manifest = manifest;
            }
            let services = load_services(&config)?;
            let registry = services
                .registry(&agent)
                .with_context(|| format!("network '{agent}' is not in {}", config.manifest.display()))?;
            Box::new(DirectAgentSession::new(
                registry,
                services,
                Arc::new(SessionManager::new(config.session_ttl)),
            ))
        }
    };

    let options = ChatOptions {
        poll,
        ..ChatOptions::default()
    };
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    run_chat_loop(session.as_ref(), stdin, &mut std::io::stdout(), &options).await
}
