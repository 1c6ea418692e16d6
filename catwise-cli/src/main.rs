//! Catwise CLI - classify bank transactions from your terminal

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;
mod prompter;

use commands::{categories, classify, patterns, rerank, status, vendors};

/// Catwise - transaction classification in your terminal
#[derive(Parser)]
#[command(name = "cw", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify unclassified transactions
    Classify(classify::ClassifyArgs),

    /// Re-rank low-confidence classifications
    Rerank {
        /// Re-rank classifications below this confidence
        #[arg(long)]
        confidence_threshold: Option<f64>,
        /// Confirm improved suggestions interactively
        #[arg(long)]
        review: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show classification status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage categories
    Categories {
        #[command(subcommand)]
        command: categories::CategoryCommands,
    },

    /// Manage vendor rules
    Vendors {
        #[command(subcommand)]
        command: vendors::VendorCommands,
    },

    /// Manage check patterns
    Patterns {
        #[command(subcommand)]
        command: patterns::PatternCommands,
    },
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = run(cli);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so tables and prompts on stdout stay clean
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("catwise_core=info,catwise_cli=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Classify(args) => classify::run(args),
        Commands::Rerank {
            confidence_threshold,
            review,
            json,
        } => rerank::run(confidence_threshold, review, json),
        Commands::Status { json } => status::run(json),
        Commands::Categories { command } => categories::run(command),
        Commands::Vendors { command } => vendors::run(command),
        Commands::Patterns { command } => patterns::run(command),
    }
}
