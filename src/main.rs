use clap::Parser;

use ledger_tx_indexer::cli::{Cli, Command};
use ledger_tx_indexer::config::Config;
use ledger_tx_indexer::logging;
use ledger_tx_indexer::scheduler::Scheduler;
use ledger_tx_indexer::storage::sqlite::SqliteStorage;

fn main() -> anyhow::Result<()> {
    logging::init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(),
    }
}

/// Single-threaded cooperative runtime: no `rt-multi-thread`, since
/// intra-cycle parallelism is not allowed and a multi-threaded runtime
/// would only invite it by accident.
fn run() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let config = Config::from_env()?;
        let storage = SqliteStorage::open(&format!("{}/{}", config.store_uri, config.store_db_name))?;
        let mut scheduler = Scheduler::new(Box::new(storage), config).await?;
        scheduler.run().await?;
        Ok(())
    })
}
