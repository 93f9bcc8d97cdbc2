//! Agent manager: run many contest agents behind an HTTP API.
//!
//! Reads the API key from the `OPENROUTER_KEY` environment variable.
//!
//! # Usage
//!
//! ```bash
//! OPENROUTER_KEY=sk-... cargo run -p contest-agent-web
//! OPENROUTER_KEY=sk-... cargo run -p contest-agent-web -- --port 8080 --max-agents 4
//! ```
//!
//! Then start an agent:
//!
//! ```bash
//! curl -X POST localhost:3001/api/agents \
//!     -H 'content-type: application/json' \
//!     -d '{"contest_id":"c1","participant_id":"p1","model_name":"openai/gpt-4"}'
//! curl -N localhost:3001/api/agents/stream
//! ```

use std::net::{IpAddr, SocketAddr};
use std::process::ExitCode;

use clap::Parser;
use contest_agent::config::DEFAULT_CONTEST_HOST;
use contest_agent::prelude::*;
use contest_agent_web::{WebConfig, spawn_web};
use tracing::info;

/// Run contest agents behind an HTTP API.
#[derive(Parser)]
#[command(name = "agent-manager")]
struct Args {
    /// Address to bind.
    #[arg(long, env = "AGENT_MANAGER_HOST", default_value = "127.0.0.1")]
    host: IpAddr,

    #[arg(long, env = "AGENT_MANAGER_PORT", default_value_t = 3001)]
    port: u16,

    /// Model for agents created without one.
    #[arg(long, env = "AGENT_MODEL", default_value = contest_agent::DEFAULT_MODEL)]
    model: String,

    /// Contest service for agents created without one.
    #[arg(long, env = "CONTEST_HOST", default_value = DEFAULT_CONTEST_HOST)]
    contest_host: String,

    /// Agents allowed to run at once; the rest wait in INITIALIZING.
    #[arg(long, env = "MAX_CONCURRENT_AGENTS", default_value_t = 10)]
    max_agents: usize,

    /// Total attempts per provider call.
    #[arg(long, env = "AGENT_RETRIES", default_value_t = 3)]
    retries: u32,

    /// Default log level when RUST_LOG is unset.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    contest_agent::logging::init(&args.log_level);

    let api_key = match std::env::var("OPENROUTER_KEY") {
        Ok(key) => key,
        Err(_) => {
            eprintln!("Error: OPENROUTER_KEY environment variable is not set");
            return ExitCode::FAILURE;
        }
    };

    let settings = Settings::default()
        .with_model(&args.model)
        .with_contest_host(&args.contest_host)
        .with_max_concurrent_agents(args.max_agents)
        .with_retries(args.retries);

    let providers = match OpenRouterFactory::new(api_key, &settings) {
        Ok(f) => Arc::new(f),
        Err(e) => {
            eprintln!("Error: failed to create provider factory: {e}");
            return ExitCode::FAILURE;
        }
    };
    let connector = Arc::new(HttpContestConnector::new(settings.contest_timeout));
    let supervisor = Supervisor::new(settings.supervisor_config(), connector, providers);

    let config = WebConfig {
        bind_addr: SocketAddr::new(args.host, args.port),
    };
    let addr = match spawn_web(supervisor.clone(), config).await {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("Error: failed to bind: {e}");
            return ExitCode::FAILURE;
        }
    };
    println!("Agent manager: http://{addr}");

    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Interrupted, stopping agents");
    }
    supervisor.shutdown("agent manager shutting down");
    ExitCode::SUCCESS
}
