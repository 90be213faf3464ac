use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cmd;

#[derive(Parser)]
#[command(name = "atelier")]
#[command(version, about = "Human-in-the-loop content generation orchestrator")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the config file.
    #[arg(long, default_value = "atelier.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP control surface and event server
    Serve {
        /// Port to serve on (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run a single session from the terminal
    Run {
        /// Free-form brief describing what to generate
        brief: String,

        /// Use the scripted gateway instead of the configured endpoint
        #[arg(long)]
        dry_run: bool,

        /// Print events as JSON lines instead of human-readable text
        #[arg(long)]
        json: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the current configuration
    Show,
    /// Validate the config file
    Validate,
    /// Write a default atelier.toml
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("atelier={default_level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve { port } => cmd::cmd_serve(&cli.config, port).await,
        Commands::Run {
            brief,
            dry_run,
            json,
        } => cmd::cmd_run(&cli.config, brief, dry_run, json).await,
        Commands::Config { command } => cmd::cmd_config(&cli.config, command),
    }
}
