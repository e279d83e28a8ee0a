//! Wallet polling loop.

use std::collections::HashSet;

use rust_decimal::Decimal;
use tracing::{error, info};

use crate::analyzer;
use crate::classifier;
use crate::error::Result;
use crate::ledger::{paginate_account_tx, LedgerClient};
use crate::model::amount::Amount;
use crate::model::transaction::{EnrichedTransaction, RawTransaction};
use crate::storage::Storage;
use crate::trade_extractor;
use crate::{config::Config, lifecycle};

const DEFAULT_PAGE_LIMIT: u32 = 400;

/// Poll and process one `(user_id, wallet)` pair for one cycle.
/// Failures are logged and contained to this wallet; the cycle continues.
pub async fn poll_wallet(
    storage: &dyn Storage,
    ledger: &LedgerClient,
    config: &Config,
    user_id: &str,
    wallet: &str,
    user_wallets: &HashSet<String>,
) {
    let from_ledger = match storage.get_latest_ledger_index(user_id, wallet).await {
        Ok(Some(ledger_index)) => ledger_index,
        Ok(None) => config.from_ledger,
        Err(err) => {
            error!(%user_id, %wallet, error = %err, "could not read high-water mark, skipping wallet this cycle");
            return;
        }
    };

    let raw_transactions = match paginate_account_tx(ledger, wallet, from_ledger, DEFAULT_PAGE_LIMIT).await {
        Ok(txs) => txs,
        Err(err) => {
            error!(%user_id, %wallet, error = %err, "account_tx polling failed after retries, skipping wallet this cycle");
            return;
        }
    };

    let count = raw_transactions.len();
    for raw in raw_transactions {
        if let Err(err) = process_transaction(storage, &raw, user_id, user_wallets).await {
            error!(%user_id, hash = %raw.hash, error = %err, "failed to process transaction, continuing");
        }
    }

    info!(%user_id, %wallet, count, "wallet poll complete");
}

async fn process_transaction(
    storage: &dyn Storage,
    raw: &RawTransaction,
    user_id: &str,
    user_wallets: &HashSet<String>,
) -> Result<()> {
    let enriched = enrich(raw, user_wallets);
    storage.put_transaction(&enriched, user_id).await?;
    lifecycle::apply(storage, &enriched, user_id, user_wallets).await
}

/// Run the metadata analyzer, classifier, and trade extractor over one
/// raw transaction, producing the enriched record the lifecycle state
/// machine consumes.
pub fn enrich(raw: &RawTransaction, user_wallets: &HashSet<String>) -> EnrichedTransaction {
    let analyzed = analyzer::analyze(&raw.meta);
    let fee_native = drops_to_native(&raw.fields.fee_drops);

    let taker_gets = raw.fields.taker_gets.as_ref().and_then(|v| Amount::from_wire(v).ok());
    let taker_pays = raw.fields.taker_pays.as_ref().and_then(|v| Amount::from_wire(v).ok());
    let amount = raw.fields.amount.as_ref().and_then(|v| Amount::from_wire(v).ok());

    let nature = classifier::classify(raw, &analyzed.balance_changes, &analyzed.offer_nodes, user_wallets, fee_native);

    let transaction_result = raw
        .meta
        .get("TransactionResult")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    let timestamp = crate::model::transaction::ledger_time_to_utc(raw.fields.date);

    let trades = trade_extractor::extract_trades(
        &raw.hash,
        raw.ledger_index,
        timestamp,
        &raw.fields.account,
        fee_native,
        &analyzed.balance_changes,
        &analyzed.offer_nodes,
    );

    EnrichedTransaction {
        hash: raw.hash.clone(),
        ledger_index: raw.ledger_index,
        account: raw.fields.account.clone(),
        destination: raw.fields.destination.clone(),
        transaction_type: raw.fields.transaction_type.clone(),
        transaction_result,
        sequence: raw.fields.sequence,
        offer_sequence: raw.fields.offer_sequence,
        source_tag: raw.fields.source_tag,
        timestamp,
        fee_native,
        balance_changes: analyzed.balance_changes,
        offer_nodes: analyzed.offer_nodes,
        taker_gets,
        taker_pays,
        amount,
        nature,
        trades,
    }
}

fn drops_to_native(drops: &str) -> Decimal {
    drops
        .parse::<i64>()
        .map(|d| Decimal::new(d, 0) / Decimal::new(1_000_000, 0))
        .unwrap_or(Decimal::ZERO)
        .normalize()
}
