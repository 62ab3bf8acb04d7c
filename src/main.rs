//! Mempool Assembler CLI Application
//!
//! Validates a directory of candidate transactions and builds a fee-ordered
//! block template from the valid ones.

use clap::{Parser, Subcommand};
use mempool_assembler::cli;
use mempool_assembler::config::AssemblerConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "assembler")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "Mempool validation and block template assembly", long_about = None)]
struct Cli {
    /// Configuration file (JSON); flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the mempool and write a block template
    Assemble {
        /// Directory of transaction records
        #[arg(short, long)]
        mempool: Option<PathBuf>,

        /// Template output file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Block weight limit
        #[arg(long)]
        max_weight: Option<usize>,

        /// Maximum number of transactions in the template
        #[arg(long)]
        max_txs: Option<usize>,

        /// Script execution budget per transaction (milliseconds)
        #[arg(long)]
        deadline_ms: Option<u64>,

        /// Validation worker threads
        #[arg(long)]
        threads: Option<usize>,

        /// Keep every valid transaction even when two spend the same outpoint
        #[arg(long)]
        allow_conflicts: bool,
    },

    /// Validate a single transaction record
    Validate {
        /// Transaction record file
        #[arg(short, long)]
        file: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AssemblerConfig::load(path)?,
        None => AssemblerConfig::default(),
    };

    match cli.command {
        Commands::Assemble {
            mempool,
            output,
            max_weight,
            max_txs,
            deadline_ms,
            threads,
            allow_conflicts,
        } => {
            if let Some(dir) = mempool {
                config.mempool_dir = dir;
            }
            if let Some(path) = output {
                config.output = path;
            }
            if let Some(weight) = max_weight {
                config.max_block_weight = weight;
            }
            if max_txs.is_some() {
                config.max_transactions = max_txs;
            }
            if deadline_ms.is_some() {
                config.script_deadline_ms = deadline_ms;
            }
            if threads.is_some() {
                config.threads = threads;
            }
            if allow_conflicts {
                config.reject_batch_conflicts = false;
            }
            config.check()?;

            cli::cmd_assemble(&config)?;
        }

        Commands::Validate { file } => {
            cli::cmd_validate(&file, &config)?;
        }
    }

    Ok(())
}
