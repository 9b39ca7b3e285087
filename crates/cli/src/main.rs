//! simplea2a CLI, the main entry point.
//!
//! Commands:
//! - `serve`   Start the scheduler and the HTTP gateway
//! - `run`     Execute one task inline and print its result
//! - `task`    Show a task with its steps and children
//! - `cancel`  Cancel a task that has not finished
//! - `agents`  List the agent directory
//! - `init`    Write a default configuration file

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod runtime;

#[derive(Parser)]
#[command(
    name = "simplea2a",
    about = "simplea2a: multi-agent task orchestration over LLM backends",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Configuration file (defaults to ~/.simplea2a/config.toml)
    #[arg(short, long, global = true, env = "SIMPLEA2A_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the scheduler and the HTTP gateway
    Serve {
        /// Override the gateway port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Execute one task inline and print its result and steps
    Run {
        /// Agent that receives the instruction
        #[arg(short, long)]
        agent: String,

        /// The instruction
        instruction: String,

        /// Context as a JSON object
        #[arg(long)]
        context: Option<String>,

        /// Wait for tasks handed off to other agents
        #[arg(short, long)]
        follow: bool,
    },

    /// Show a task with its steps and children
    Task {
        id: String,

        /// Print the raw JSON records
        #[arg(long)]
        json: bool,
    },

    /// Cancel a task that has not finished
    Cancel { id: String },

    /// List the agent directory
    Agents {
        /// Also print each agent's synthesized system prompt
        #[arg(long)]
        prompt: bool,
    },

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let config_path = cli.config;
    match cli.command {
        Commands::Serve { port } => commands::serve::run(config_path, port).await?,
        Commands::Run {
            agent,
            instruction,
            context,
            follow,
        } => commands::run::run(config_path, agent, instruction, context, follow).await?,
        Commands::Task { id, json } => commands::task::run(config_path, &id, json).await?,
        Commands::Cancel { id } => commands::cancel::run(config_path, &id).await?,
        Commands::Agents { prompt } => commands::agents::run(config_path, prompt).await?,
        Commands::Init { force } => commands::init::run(config_path, force)?,
    }

    Ok(())
}
