mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use grokker::config::GrokConfig;

#[derive(Parser)]
#[command(name = "grok", version, about = "Query a directory of documents with an LLM")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a knowledge base in the current directory
    Init {
        /// Chat model to use (see `grok models`)
        #[arg(long)]
        model: Option<String>,
    },
    /// Add documents and embed them
    Add {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Stop tracking documents
    Forget {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// List tracked documents
    Ls,
    /// Re-chunk and re-embed every document; drop documents missing on disk
    Refresh,
    /// Remove chunks of documents that are no longer tracked
    Prune,
    /// Ask a question
    Q {
        #[arg(required = true)]
        question: Vec<String>,
        /// Include the model's own knowledge, not just the documents
        #[arg(short, long)]
        global: bool,
    },
    /// Revise text read from stdin
    Revise {
        #[arg(short, long)]
        global: bool,
        /// Use the first paragraph of the input as the system message
        #[arg(short, long)]
        sysmsg_in: bool,
    },
    /// Continue text read from stdin
    Continue {
        #[arg(short, long)]
        global: bool,
    },
    /// List available chat models
    Models,
    /// Set the chat model
    Model { name: String },
    /// Show code and store versions
    Version,
    /// Manage the tokenizer
    Tokenizer {
        #[command(subcommand)]
        action: TokenizerAction,
    },
}

#[derive(Subcommand)]
enum TokenizerAction {
    /// Download the tokenizer to the configured path
    Download {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = GrokConfig::load()?;

    // stdout carries command output only.
    let filter = EnvFilter::try_new(&config.log.level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Tokenizer {
            action: TokenizerAction::Download { force },
        } => cli::tokenizer::download(&config, force).await,
        // The knowledge base and its provider are blocking.
        command => tokio::task::spawn_blocking(move || run(&config, command)).await?,
    }
}

fn run(config: &GrokConfig, command: Command) -> Result<()> {
    match command {
        Command::Init { model } => cli::documents::init(config, model.as_deref()),
        Command::Add { paths } => cli::documents::add(config, &paths),
        Command::Forget { paths } => cli::documents::forget(config, &paths),
        Command::Ls => cli::documents::ls(config),
        Command::Refresh => cli::documents::refresh(config),
        Command::Prune => cli::documents::prune(config),
        Command::Q { question, global } => cli::query::ask(config, &question.join(" "), global),
        Command::Revise { global, sysmsg_in } => cli::query::revise(config, global, sysmsg_in),
        Command::Continue { global } => cli::query::continue_text(config, global),
        Command::Models => cli::models::list(config),
        Command::Model { name } => cli::models::set(config, &name),
        Command::Version => cli::documents::version(config),
        Command::Tokenizer { .. } => unreachable!("handled before spawning"),
    }
}
