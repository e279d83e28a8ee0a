//! Scheduler.
//!
//! Single-threaded cooperative cycle driver: poll every wallet, then
//! reconcile, then sleep out the remainder of one
//! `COLLECTION_FREQUENCY`-second period, repeat.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::config::Config;
use crate::error::Result;
use crate::ledger::LedgerClient;
use crate::model::UserConfig;
use crate::poller;
use crate::reconciler;
use crate::storage::Storage;

/// Static seed used when storage has no users at startup.
fn default_users() -> Vec<UserConfig> {
    Vec::new()
}

pub struct Scheduler {
    storage: Box<dyn Storage>,
    ledger: LedgerClient,
    config: Config,
    users: Vec<UserConfig>,
    last_user_refresh: Instant,
    shutting_down: Arc<AtomicBool>,
}

impl Scheduler {
    pub async fn new(storage: Box<dyn Storage>, config: Config) -> Result<Self> {
        let ledger = LedgerClient::new(config.ledger_rpc_url.clone())?;

        let mut users = storage.get_users().await?;
        if users.is_empty() {
            users = default_users();
            if !users.is_empty() {
                storage.put_users(&users).await?;
            }
        }

        Ok(Self {
            storage,
            ledger,
            config,
            users,
            last_user_refresh: Instant::now(),
            shutting_down: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Run cycles until a cooperative cancellation signal arrives. A
    /// signal only stops *scheduling new wallets* —
    /// the wallet currently mid-poll is allowed to finish before the
    /// driver exits. Returns `Ok(())` on clean shutdown.
    pub async fn run(&mut self) -> Result<()> {
        let shutting_down = self.shutting_down.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received, finishing the in-flight wallet and exiting");
                shutting_down.store(true, Ordering::SeqCst);
            }
        });

        while !self.shutting_down.load(Ordering::SeqCst) {
            self.run_cycle().await;
        }
        Ok(())
    }

    async fn run_cycle(&mut self) {
        let started = Instant::now();

        if self.last_user_refresh.elapsed() >= Duration::from_secs(self.config.user_config_refresh_interval_secs) {
            match self.storage.get_users().await {
                Ok(users) => self.users = users,
                Err(err) => error!(error = %err, "failed to refresh user config, continuing with stale list"),
            }
            self.last_user_refresh = Instant::now();
        }

        'users: for user in &self.users {
            let user_wallets: HashSet<String> = user.wallets.iter().cloned().collect();
            for wallet in &user.wallets {
                if self.shutting_down.load(Ordering::SeqCst) {
                    break 'users;
                }
                poller::poll_wallet(self.storage.as_ref(), &self.ledger, &self.config, &user.id, wallet, &user_wallets).await;
            }
        }

        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }

        if let Err(err) = reconciler::reconcile(self.storage.as_ref(), &self.ledger).await {
            error!(error = %err, "reconciler pass failed this cycle");
        }

        let elapsed = started.elapsed();
        let period = Duration::from_secs(self.config.collection_frequency_secs);
        if elapsed < period && !self.shutting_down.load(Ordering::SeqCst) {
            tokio::select! {
                _ = tokio::time::sleep(period - elapsed) => {}
                _ = wait_for_flag(&self.shutting_down) => {}
            }
        }
    }
}

async fn wait_for_flag(flag: &AtomicBool) {
    while !flag.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
