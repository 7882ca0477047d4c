//! QuantaLista CLI entry point.

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;

mod cli;

use cli::{Cli, Command};
use quantalista::config::Config;
use quantalista::coordination::{RunOutcome, RunReport};
use quantalista::daemon::{self, Daemon, DaemonConfig};
use quantalista::queue::FileQueue;
use quantalista::task::{TaskId, TaskRecord};

fn log_builder(verbose: bool) -> env_logger::Builder {
    let mut builder = env_logger::Builder::from_default_env();
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder
}

fn setup_logging(verbose: bool) {
    log_builder(verbose).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    if let Some(queue_dir) = &cli.queue_dir {
        config.queue_dir = queue_dir.clone();
    }
    info!("Using queue directory: {}", config.queue_dir.display());

    let queue = FileQueue::new(&config.queue_dir);

    match cli.command {
        Command::Daemon { sample } => {
            if sample {
                queue.init().context("Failed to create queue directories")?;
                let count = daemon::enqueue_sample(&queue).context("Failed to enqueue sample project")?;
                println!("{} Enqueued {} sample tasks", "→".blue(), count);
            }
            let daemon = Daemon::new(DaemonConfig::from(&config), queue).context("Failed to start daemon")?;

            let rt = tokio::runtime::Runtime::new()?;
            let report = rt.block_on(daemon.run())?;
            print_report(&report);
            Ok(())
        }
        Command::Add {
            description,
            id,
            priority,
            component,
            runtime,
            depends,
        } => {
            let task_id = id.map(TaskId::from).unwrap_or_else(TaskId::generate);
            let record = TaskRecord {
                task_id: task_id.0.clone(),
                description,
                priority,
                dependencies: depends,
                component,
                max_runtime_sec: runtime,
            };
            record.clone().into_task().context("Invalid task")?;

            queue.init().context("Failed to create queue directories")?;
            let path = queue.enqueue(&record).context("Failed to enqueue task")?;
            println!("{} Added task: {}", "✓".green(), task_id.0.cyan());
            info!("Wrote {}", path.display());
            Ok(())
        }
        Command::List => {
            for (folder, names) in queue.list().context("Failed to read queue")? {
                println!("{} ({})", folder.title().bold(), names.len());
                for name in names {
                    println!("  {}", name);
                }
            }
            Ok(())
        }
    }
}

fn print_report(report: &RunReport) {
    match report.outcome {
        RunOutcome::Completed => println!(
            "{} All tasks finished in {} ticks ({:.1}s)",
            "✓".green(),
            report.ticks,
            report.elapsed.as_secs_f64()
        ),
        RunOutcome::Stalled => println!("{} Run stalled after {} ticks", "!".yellow(), report.ticks),
        RunOutcome::TickLimit => println!("{} Tick limit reached after {} ticks", "!".yellow(), report.ticks),
    }

    for id in &report.completed {
        println!("  {} {}", "✓".green(), id);
    }
    for id in &report.failed {
        println!("  {} {}", "✗".red(), id);
    }
    for stuck in &report.stuck {
        let waiting: Vec<&str> = stuck.unresolved.iter().map(|d| d.0.as_str()).collect();
        println!("  {} {} waiting on {}", "○".yellow(), stuck.id, waiting.join(", "));
    }
}
