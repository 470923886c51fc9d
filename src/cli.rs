use clap::{Parser, Subcommand};

#[derive(Debug, Parser)] // requires `derive` feature
#[command(name = "file-sentinel")]
#[command(about = "Periodically inventories a directory and stores snapshots", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan the target directory on every cycle until interrupted (default)
    Run,
    /// Scan the target directory once and print the entries without storing them
    Scan,
    /// Print the latest stored snapshot of the target directory
    Show,
    /// Print every stored snapshot of the target directory
    History,
    /// Remove stored snapshots of the target directory
    Clear,
    /// Print configuration values
    PrintConfig,
}
