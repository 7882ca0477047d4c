//! CLI argument parsing for QuantaLista.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "quantalista",
    about = "Dependency-aware task scheduler for simulated agents",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Queue directory (overrides config)
    #[arg(short, long, global = true)]
    pub queue_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run every pending task through the coordinator
    Daemon {
        /// Enqueue the built-in sample project first
        #[arg(long)]
        sample: bool,
    },

    /// Add a task to the pending queue
    Add {
        /// Task description
        description: String,

        /// Task ID (generated if omitted)
        #[arg(long)]
        id: Option<String>,

        /// Priority: high, medium or low
        #[arg(short, long, default_value = "low")]
        priority: String,

        /// Component label
        #[arg(long, default_value = "")]
        component: String,

        /// Simulated runtime in seconds
        #[arg(short, long, default_value_t = 1)]
        runtime: i64,

        /// IDs of tasks that must complete first
        #[arg(short, long, value_delimiter = ',')]
        depends: Vec<String>,
    },

    /// Show the queue folders
    List,
}
