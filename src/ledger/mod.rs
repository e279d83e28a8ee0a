//! Ledger RPC client.

mod client;
mod wire;

pub use client::{paginate_account_tx, retry, LedgerClient};
pub use wire::{AccountOffersResponse, AccountTxEntry, AccountTxResponse};
