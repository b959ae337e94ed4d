//! orgchat CLI — the main entry point.
//!
//! Commands:
//! - `serve`     — Start the HTTP API server
//! - `assemble`  — Assemble a context window from a JSON history file
//! - `estimate`  — Estimate the token cost of a text
//! - `config`    — Show, locate, or validate configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "orgchat",
    about = "orgchat: budgeted chat context assembly with document retrieval",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Assemble the context a chat turn would send to the model
    Assemble {
        /// JSON file with the conversation history, oldest first
        #[arg(long)]
        history: std::path::PathBuf,

        /// JSON file with retrieved document chunks
        #[arg(long)]
        retrieval: Option<std::path::PathBuf>,

        /// Use the pinned budget
        #[arg(long)]
        pinned: bool,

        /// Budget profile: compact, extended, or custom
        #[arg(long)]
        profile: Option<String>,
    },

    /// Estimate the token cost of a text
    Estimate {
        /// The text to estimate
        text: String,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the default configuration file
    Default,
    /// Print the config file path
    Path,
    /// Validate the configuration
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Assemble {
            history,
            retrieval,
            pinned,
            profile,
        } => {
            commands::assemble::run(&history, retrieval.as_deref(), pinned, profile.as_deref())
                .await?
        }
        Commands::Estimate { text } => commands::estimate::run(&text),
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Default => commands::config_cmd::default(),
            ConfigAction::Path => commands::config_cmd::path(),
            ConfigAction::Validate => commands::config_cmd::validate().await?,
        },
    }

    Ok(())
}
