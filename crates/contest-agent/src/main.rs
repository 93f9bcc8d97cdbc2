//! Run one contest agent in the foreground.
//!
//! Reads the API key from the `OPENROUTER_KEY` environment variable.
//!
//! # Examples
//!
//! ```sh
//! # Compete as participant p1 in contest c1
//! contest-agent --contest-id c1 --participant-id p1
//!
//! # Another model and contest host
//! contest-agent --contest-id c1 --participant-id p1 \
//!     --model anthropic/claude-sonnet-4 --host judge.internal:50051
//!
//! # Just print the contest's problems
//! contest-agent --contest-id c1 --participant-id p1 --list-problems
//! ```

use std::process::ExitCode;

use clap::Parser;
use contest_agent::config::DEFAULT_CONTEST_HOST;
use contest_agent::prelude::*;
use tracing::{error, info};

/// Compete in a programming contest with one LLM agent.
#[derive(Parser)]
#[command(name = "contest-agent")]
struct Cli {
    #[arg(long, env = "CONTEST_ID")]
    contest_id: String,

    #[arg(long, env = "PARTICIPANT_ID")]
    participant_id: String,

    /// Model to compete with.
    #[arg(long, env = "AGENT_MODEL", default_value = contest_agent::DEFAULT_MODEL)]
    model: String,

    /// Contest service address; `http://` is assumed without a scheme.
    #[arg(long, env = "CONTEST_HOST", default_value = DEFAULT_CONTEST_HOST)]
    host: String,

    /// Total attempts per provider call.
    #[arg(long, env = "AGENT_RETRIES", default_value_t = 3)]
    retries: u32,

    /// Default log level when RUST_LOG is unset.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Print the contest's problems and exit.
    #[arg(long)]
    list_problems: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    contest_agent::logging::init(&cli.log_level);

    let settings = Settings::default()
        .with_model(&cli.model)
        .with_contest_host(&cli.host)
        .with_retries(cli.retries);

    let contest: Arc<dyn ContestService> =
        match HttpContestClient::connect(&cli.host, settings.contest_timeout) {
            Ok(c) => Arc::new(c),
            Err(e) => {
                eprintln!("Error: {e}");
                return ExitCode::FAILURE;
            }
        };

    if cli.list_problems {
        return list_problems(contest.as_ref(), &cli.contest_id).await;
    }

    let api_key = match std::env::var("OPENROUTER_KEY") {
        Ok(key) => key,
        Err(_) => {
            eprintln!("Error: OPENROUTER_KEY environment variable is not set");
            return ExitCode::FAILURE;
        }
    };
    let provider = match OpenRouterFactory::new(api_key, &settings)
        .and_then(|factory| factory.create(&cli.model))
    {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: failed to create provider: {e}");
            return ExitCode::FAILURE;
        }
    };

    let engine = WorkflowEngine::new(provider, contest, settings.workflow_config())
        .with_event_handler(Arc::new(LoggingHandler::new(cli.model.as_str())));

    let cancel = engine.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping after the current call");
            cancel.cancel();
        }
    });

    let state = WorkflowState::new(&cli.contest_id, &cli.participant_id, vec![]);
    let outcome = engine.run(state).await;

    println!(
        "{}: {} solved, {} attempted",
        outcome.terminal.status(),
        outcome.state.solved.len(),
        outcome.state.submitted.len()
    );
    if outcome.terminal == Terminal::Failed {
        error!(
            "Workflow failed: {}",
            outcome.error.as_deref().unwrap_or("unknown error")
        );
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn list_problems(contest: &dyn ContestService, contest_id: &str) -> ExitCode {
    match contest.get_contest(contest_id).await {
        Ok(c) => {
            println!("Contest {} ({:?}), ends {}", c.id, c.state, c.ends_at.to_rfc3339());
            for (i, p) in c.problems.iter().enumerate() {
                println!("{:3}. {} [{}] {}ms / {}MB", i + 1, p.name, p.id, p.time_limit_ms, p.memory_limit_mb);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
