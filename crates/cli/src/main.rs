//! AgentGate CLI — the main entry point.
//!
//! Commands:
//! - `onboard`    — Write the default config and create the data folders
//! - `memory`     — Operate on the sandboxed memory store
//! - `knowledge`  — Inspect, rank and refresh agent knowledge
//! - `budget`     — Estimate the token cost of a transcript
//! - `config`     — Show, locate or validate the configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "agentgate",
    about = "AgentGate — rate, context and knowledge mediation for LLM agents",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default config and create the data folders
    Onboard,

    /// Operate on the memory store
    Memory {
        /// Restrict paths to this agent's category
        #[arg(short, long, global = true)]
        agent: Option<String>,

        #[command(subcommand)]
        command: MemoryCommand,
    },

    /// Inspect, rank and refresh agent knowledge
    Knowledge {
        #[command(subcommand)]
        command: KnowledgeCommand,
    },

    /// Token budget tools
    Budget {
        #[command(subcommand)]
        command: BudgetCommand,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum MemoryCommand {
    /// Show a directory listing or file contents
    View {
        path: String,
        /// Inclusive 1-based line range, e.g. `3 10`
        #[arg(long, num_args = 2, value_names = ["START", "END"])]
        range: Option<Vec<usize>>,
    },
    /// Create a new file
    Create { path: String, content: String },
    /// Replace one exact occurrence of text
    StrReplace { path: String, old: String, new: String },
    /// Insert text before a 1-based line
    Insert { path: String, line: usize, text: String },
    /// Delete a file or directory
    Delete { path: String },
    /// Move a file or directory
    Rename { old_path: String, new_path: String },
}

#[derive(Subcommand)]
enum KnowledgeCommand {
    /// List the documents of an agent's namespace
    List { agent: String },
    /// Show which documents a message would select
    Select {
        agent: String,
        message: String,
        /// Attachment file to include in the ranking corpus
        #[arg(long)]
        attachment: Option<std::path::PathBuf>,
    },
    /// Re-fetch an agent's namespace from the origin
    Refresh { agent: String },
}

#[derive(Subcommand)]
enum BudgetCommand {
    /// Estimate the cost of sending a JSON transcript (array of turns)
    Estimate {
        transcript: std::path::PathBuf,
        /// Instruction text file
        #[arg(long)]
        instructions: Option<std::path::PathBuf>,
        /// Pending user message
        #[arg(long, default_value = "")]
        message: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Load and validate the configuration
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Memory { agent, command } => {
            let agent = agent.as_deref();
            match command {
                MemoryCommand::View { path, range } => {
                    let range = range.and_then(|r| Some((*r.first()?, *r.get(1)?)));
                    commands::memory::view(agent, &path, range).await?
                }
                MemoryCommand::Create { path, content } => {
                    commands::memory::create(agent, &path, &content).await?
                }
                MemoryCommand::StrReplace { path, old, new } => {
                    commands::memory::str_replace(agent, &path, &old, &new).await?
                }
                MemoryCommand::Insert { path, line, text } => {
                    commands::memory::insert(agent, &path, line, &text).await?
                }
                MemoryCommand::Delete { path } => commands::memory::delete(agent, &path).await?,
                MemoryCommand::Rename { old_path, new_path } => {
                    commands::memory::rename(agent, &old_path, &new_path).await?
                }
            }
        }
        Commands::Knowledge { command } => match command {
            KnowledgeCommand::List { agent } => commands::knowledge::list(&agent).await?,
            KnowledgeCommand::Select {
                agent,
                message,
                attachment,
            } => commands::knowledge::select(&agent, &message, attachment.as_deref()).await?,
            KnowledgeCommand::Refresh { agent } => commands::knowledge::refresh(&agent).await?,
        },
        Commands::Budget { command } => match command {
            BudgetCommand::Estimate {
                transcript,
                instructions,
                message,
            } => commands::budget::estimate(&transcript, instructions.as_deref(), &message).await?,
        },
        Commands::Config { command } => match command {
            ConfigCommand::Show => commands::config_cmd::show().await?,
            ConfigCommand::Path => commands::config_cmd::path().await?,
            ConfigCommand::Validate => commands::config_cmd::validate().await?,
        },
    }

    Ok(())
}
