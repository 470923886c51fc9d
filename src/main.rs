mod cli;
mod logging;

use std::io::{self, Write};
use std::sync::mpsc;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands};
use colored::*;
use dotenv::dotenv;
use file_sentinel::config::{self, AppConfig};
use file_sentinel::model::Snapshot;
use file_sentinel::{open_repository, scanner, Repository, Scheduler};
use tracing::{info, warn};

fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = config::load_configuration().context("Error loading configuration")?;
    let _guard = logging::init_logger(config.log_level, config.log_file_path.as_deref());
    for warning in &config.warnings {
        warn!("{}", warning);
    }

    let args = Cli::parse();

    match args.command.unwrap_or(Commands::Run) {
        Commands::Run => run_agent(&config),
        Commands::Scan => {
            let records = scanner::extract(&config.target_dir)?;
            let snapshot = Snapshot::build(&config.reporter_identity, &config.target_dir, records);
            print_snapshot(&snapshot);
            Ok(())
        }
        Commands::Show => {
            let repo = open_repository(&config)?;
            let snapshot = repo.read(&config.target_dir)?;
            print_snapshot(&snapshot);
            Ok(())
        }
        Commands::History => {
            let repo = open_repository(&config)?;
            let history = repo.history(&config.target_dir)?;
            println!("{} snapshot(s) stored", history.len());
            for snapshot in &history {
                println!();
                print_snapshot(snapshot);
            }
            Ok(())
        }
        Commands::Clear => {
            let prompt = format!(
                "Remove every stored snapshot of {}?",
                config.target_dir.display()
            );
            if confirm(&prompt)? {
                let repo = open_repository(&config)?;
                repo.clear(&config.target_dir)?;
                println!("Cleared {}", config.target_dir.display());
            }
            Ok(())
        }
        Commands::PrintConfig => {
            print!("{}", config);
            Ok(())
        }
    }
}

fn run_agent(config: &AppConfig) -> anyhow::Result<()> {
    info!("Starting File Sentinel...");
    let repo = open_repository(config).context("Error creating repository")?;
    let scheduler = Scheduler::from_config(repo, config);

    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
    ctrlc::set_handler(move || {
        info!("Received termination signal, finishing current cycle...");
        let _ = shutdown_tx.send(());
    })
    .context("Error installing signal handler")?;

    scheduler.run(&shutdown_rx);
    Ok(())
}

fn print_snapshot(snapshot: &Snapshot) {
    println!(
        "{} {} (reporter {}, captured {})",
        "Snapshot of".bold(),
        snapshot.scanned_path.display().to_string().cyan(),
        snapshot.reporter_identity.green(),
        snapshot.captured_at.to_rfc3339()
    );
    for record in &snapshot.records {
        let modified = record.modified_at.with_timezone(&chrono::Local);
        let name = if record.is_regular_file {
            record.name.normal()
        } else {
            record.name.blue()
        };
        println!(
            "  {} {:>12} {} {}",
            record.mode,
            record.size_bytes,
            modified.format("%Y-%m-%d %H:%M:%S"),
            name
        );
    }
    println!(
        "{} entries, {} bytes in regular files",
        snapshot.records.len(),
        snapshot.total_bytes()
    );
}

/// Ask a yes/no question on stdin. Anything but an explicit yes, including
/// end of input, counts as no.
fn confirm(prompt: &str) -> io::Result<bool> {
    let stdin = io::stdin();
    let mut answer = String::new();
    loop {
        print!("{} [y/N] ", prompt);
        io::stdout().flush()?;

        answer.clear();
        if stdin.read_line(&mut answer)? == 0 {
            return Ok(false);
        }
        match answer.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "" | "n" | "no" => return Ok(false),
            other => println!("Please answer y or n (got '{}')", other),
        }
    }
}
