use clap::{Parser, Subcommand};

/// Per-wallet transaction indexer for a public account-based ledger.
#[derive(Parser)]
#[command(name = "ledger-tx-indexer", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the polling/reconciliation scheduler until terminated (default).
    Run,
}
