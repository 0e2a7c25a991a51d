//! Engram CLI: pattern mining batch runs and memory statistics.
//!
//! Designed to run from cron or an orchestrator: `engram mine` walks
//! every agent database, extracts patterns, and prints a per-agent
//! report; `engram stats` prints the memory health table.

use clap::Parser;
use engram_core::{
    EngramConfig, MemoryStore, MineReport, NoopEventSink, list_agents, load_config, mine_agent,
    mine_all,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Engram: per-agent learning memory and pattern mining
#[derive(Parser, Debug)]
#[command(name = "engram", version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the memory directory
    #[arg(long)]
    memory_dir: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Mine patterns from decision history (all agents if none given)
    Mine {
        /// Agent to mine; omit to mine every agent
        agent: Option<String>,

        /// Print reports as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show memory statistics for all agents
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(dir) = cli.memory_dir {
        config.storage.memory_dir = Some(dir);
    }

    match cli.command {
        Commands::Mine { agent: Some(agent), json } => {
            let store = MemoryStore::open(&agent, &config.storage)?;
            let report = mine_agent(&store, &config.miner)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Commands::Mine { agent: None, json } => {
            let reports = mine_all(&config, &NoopEventSink).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                for report in &reports {
                    print_report(report);
                }
                let extracted: usize = reports.iter().map(|r| r.patterns_extracted).sum();
                let skipped = reports.iter().filter(|r| r.skipped).count();
                println!(
                    "\nMining complete: {} agents mined, {} skipped, {} new patterns",
                    reports.len() - skipped,
                    skipped,
                    extracted
                );
            }
        }
        Commands::Stats => print_stats_table(&config)?,
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        })
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn print_report(report: &MineReport) {
    if report.skipped {
        println!(
            "{}: skipped ({})",
            report.agent,
            report.skip_reason.as_deref().unwrap_or("unknown")
        );
        return;
    }
    println!(
        "{}: {} resolved decisions, {} patterns extracted, {} pruned",
        report.agent, report.resolved_decisions, report.patterns_extracted, report.patterns_pruned
    );
    for description in &report.new_patterns {
        println!("  - {description}");
    }
}

fn print_stats_table(config: &EngramConfig) -> anyhow::Result<()> {
    let memory_dir = config.storage.memory_dir();
    let agents = list_agents(&memory_dir);
    if agents.is_empty() {
        println!("No agent memory databases found in {}", memory_dir.display());
        return Ok(());
    }

    println!(
        "\n{:<12} {:>10} {:>10} {:>10} {:>8} {:>10}",
        "Agent", "Decisions", "Resolved", "Patterns", "WR", "DB Size"
    );
    println!("{}", "-".repeat(65));
    for agent in agents {
        let store = MemoryStore::open(&agent, &config.storage)?;
        let stats = store.stats()?;
        let win_rate = if stats.win_count + stats.loss_count > 0 {
            format!("{:.1}%", stats.win_rate)
        } else {
            "N/A".to_string()
        };
        println!(
            "{:<12} {:>10} {:>10} {:>10} {:>8} {:>9.1}KB",
            stats.agent,
            stats.total_decisions,
            stats.resolved_decisions,
            stats.active_patterns,
            win_rate,
            stats.db_size_kb
        );
    }
    println!();
    Ok(())
}
