//! Order lifecycle state machine.
//!
//! Driven by (enriched transaction, user_id). Mutates storage through
//! idempotent upserts keyed by hash/`(account, sequence)`; never holds
//! the storage connection across more than one operation at a time.

use std::collections::HashSet;

use rust_decimal::Decimal;
use tracing::warn;

use crate::error::Result;
use crate::model::transaction::{EnrichedTransaction, Nature, NodeKind};
use crate::model::{Amount, CurrencyDelta, DepositWithdrawal, Offer, OfferStatus, ResolutionMethod, TransferKind};
use crate::storage::{OfferPatch, Storage};

/// Apply one enriched transaction's effects for `user_id` against
/// `storage`.
pub async fn apply(
    storage: &dyn Storage,
    tx: &EnrichedTransaction,
    user_id: &str,
    user_wallets: &HashSet<String>,
) -> Result<()> {
    if user_wallets.contains(&tx.account) {
        match tx.nature {
            Nature::OfferOpen => handle_offer_open(storage, tx, user_id).await?,
            Nature::OfferFilled => handle_offer_filled(storage, tx, user_id).await?,
            Nature::OfferCancel => handle_offer_cancel(storage, tx).await?,
            Nature::Withdrawal | Nature::InternalTransfer => {
                handle_transfer(storage, tx, user_id, &tx.account).await?
            }
            _ => {}
        }
    }
    if tx.nature == Nature::Deposit {
        if let Some(destination) = &tx.destination {
            if user_wallets.contains(destination) {
                handle_transfer(storage, tx, user_id, destination).await?;
            }
        }
    }

    handle_own_offers_consumed(storage, tx, user_wallets).await?;
    persist_trades(storage, tx, user_id).await?;

    Ok(())
}

/// Records the maker-side view of every trade this transaction produced.
/// Independent of whether the taker side is one of our tracked wallets —
/// a trade can be the only record of a counterparty's maker offer.
async fn persist_trades(storage: &dyn Storage, tx: &EnrichedTransaction, user_id: &str) -> Result<()> {
    for trade in &tx.trades {
        let mut trade = trade.clone();
        trade.user_id = Some(user_id.to_string());
        storage.put_trade(&trade).await?;
    }
    Ok(())
}

async fn handle_offer_open(storage: &dyn Storage, tx: &EnrichedTransaction, user_id: &str) -> Result<()> {
    let (Some(taker_gets), Some(taker_pays)) = (&tx.taker_gets, &tx.taker_pays) else {
        warn!(hash = %tx.hash, "offer_open without TakerGets/TakerPays, dropping");
        return Ok(());
    };

    if storage.get_terminal_offer(&tx.hash).await?.is_some() {
        warn!(hash = %tx.hash, "offer_open replayed after reaching a terminal status, no-op");
        return Ok(());
    }

    let offer = Offer {
        hash: tx.hash.clone(),
        account: tx.account.clone(),
        sequence: tx.sequence,
        user_id: user_id.to_string(),
        created_ledger_index: tx.ledger_index,
        last_checked_ledger: tx.ledger_index,
        taker_gets: taker_gets.clone(),
        taker_pays: taker_pays.clone(),
        filled_gets: None,
        filled_pays: None,
        status: OfferStatus::Open,
        created_date: tx.timestamp,
        resolved_date: None,
        resolved_ledger_index: None,
        cancel_tx_hash: None,
        trades: vec![],
        create_fee_native: tx.fee_native,
        cancel_fee_native: None,
        resolution_method: None,
    };
    storage.put_open_offer(&offer).await
}

async fn handle_offer_filled(storage: &dyn Storage, tx: &EnrichedTransaction, user_id: &str) -> Result<()> {
    let (Some(taker_gets), Some(taker_pays)) = (&tx.taker_gets, &tx.taker_pays) else {
        warn!(hash = %tx.hash, "offer_filled without TakerGets/TakerPays, dropping");
        return Ok(());
    };

    let own_balance = tx.balance_change_for(&tx.account);
    let filled_gets = own_balance
        .and_then(|bc| bc.balances.iter().find(|d| d.currency == taker_gets.currency && d.issuer == taker_gets.issuer))
        .map(|d| Amount { currency: d.currency.clone(), issuer: d.issuer.clone(), value: magnitude_excluding_fee(d, tx.fee_native) })
        .unwrap_or_else(|| taker_gets.clone());
    let filled_pays = own_balance
        .and_then(|bc| bc.balances.iter().find(|d| d.currency == taker_pays.currency && d.issuer == taker_pays.issuer))
        .map(|d| Amount { currency: d.currency.clone(), issuer: d.issuer.clone(), value: magnitude_excluding_fee(d, tx.fee_native) })
        .unwrap_or_else(|| taker_pays.clone());

    let offer = Offer {
        hash: tx.hash.clone(),
        account: tx.account.clone(),
        sequence: tx.sequence,
        user_id: user_id.to_string(),
        created_ledger_index: tx.ledger_index,
        last_checked_ledger: tx.ledger_index,
        taker_gets: taker_gets.clone(),
        taker_pays: taker_pays.clone(),
        filled_gets: Some(filled_gets),
        filled_pays: Some(filled_pays),
        status: OfferStatus::Filled,
        created_date: tx.timestamp,
        resolved_date: Some(tx.timestamp),
        resolved_ledger_index: Some(tx.ledger_index),
        cancel_tx_hash: None,
        trades: tx.trades.clone(),
        create_fee_native: tx.fee_native,
        cancel_fee_native: None,
        resolution_method: Some(ResolutionMethod::Direct),
    };
    storage.put_filled_offer(&offer).await
}

/// A balance delta's magnitude, with the native fee debit removed so a
/// filled leg reflects only what actually changed hands.
fn magnitude_excluding_fee(delta: &CurrencyDelta, fee_native: Decimal) -> Decimal {
    let magnitude = delta.value.abs();
    if delta.is_native() {
        magnitude - fee_native
    } else {
        magnitude
    }
}

async fn handle_offer_cancel(storage: &dyn Storage, tx: &EnrichedTransaction) -> Result<()> {
    let Some(sequence) = tx.offer_sequence else {
        warn!(hash = %tx.hash, "offer_cancel without OfferSequence, dropping");
        return Ok(());
    };

    let Some(offer) = storage.get_open_offer_by_sequence(&tx.account, sequence).await? else {
        warn!(account = %tx.account, sequence, "offer_cancel for unknown offer, dropping");
        return Ok(());
    };

    let patch = match offer.status {
        OfferStatus::Open => OfferPatch {
            status: Some(OfferStatus::Canceled),
            cancel_tx_hash: Some(tx.hash.clone()),
            cancel_fee_native: Some(tx.fee_native),
            resolved_date: Some(tx.timestamp),
            resolved_ledger_index: Some(tx.ledger_index),
            ..Default::default()
        },
        OfferStatus::PartiallyFilled => OfferPatch {
            status: Some(OfferStatus::Filled),
            resolution_method: Some(ResolutionMethod::Direct),
            cancel_tx_hash: Some(tx.hash.clone()),
            cancel_fee_native: Some(tx.fee_native),
            resolved_date: Some(tx.timestamp),
            resolved_ledger_index: Some(tx.ledger_index),
            ..Default::default()
        },
        OfferStatus::Filled | OfferStatus::Canceled => {
            warn!(hash = %offer.hash, "offer_cancel on already-terminal offer, dropping");
            return Ok(());
        }
    };

    storage.update_open_offer(&offer.hash, patch).await
}

/// Handles the "market_trade / Payment with own offer consumed" bullet:
/// any `Modified`/`Deleted` offer node owned by one of `user_wallets`
/// updates the corresponding persisted OPEN offer, independent of how
/// this transaction itself was classified.
async fn handle_own_offers_consumed(
    storage: &dyn Storage,
    tx: &EnrichedTransaction,
    user_wallets: &HashSet<String>,
) -> Result<()> {
    for node in &tx.offer_nodes {
        if !user_wallets.contains(&node.account) {
            continue;
        }
        if !matches!(node.kind, NodeKind::Modified | NodeKind::Deleted) {
            continue;
        }

        let Some(offer) = storage.get_open_offer_by_sequence(&node.account, node.sequence).await? else {
            continue;
        };

        let related_trade = tx
            .trades
            .iter()
            .find(|t| t.maker_address == node.account && t.related_offer_sequence == Some(node.sequence))
            .cloned();
        let mut trades = offer.trades.clone();
        if let Some(trade) = related_trade {
            trades.push(trade);
        }

        let patch = match node.kind {
            NodeKind::Deleted => OfferPatch {
                status: Some(OfferStatus::Filled),
                filled_gets: Some(offer.taker_gets.clone()),
                filled_pays: Some(offer.taker_pays.clone()),
                trades: Some(trades),
                resolution_method: Some(ResolutionMethod::Direct),
                resolved_date: Some(tx.timestamp),
                resolved_ledger_index: Some(tx.ledger_index),
                last_checked_ledger: Some(tx.ledger_index),
                ..Default::default()
            },
            _ => {
                let remaining_gets = node.final_taker_gets.clone().unwrap_or_else(|| offer.taker_gets.clone());
                let remaining_pays = node.final_taker_pays.clone().unwrap_or_else(|| offer.taker_pays.clone());
                let filled_gets = Amount::diff(&remaining_gets, &offer.taker_gets).unwrap_or(remaining_gets.clone());
                let filled_pays = Amount::diff(&remaining_pays, &offer.taker_pays).unwrap_or(remaining_pays.clone());
                OfferPatch {
                    status: Some(OfferStatus::PartiallyFilled),
                    filled_gets: Some(filled_gets),
                    filled_pays: Some(filled_pays),
                    trades: Some(trades),
                    last_checked_ledger: Some(tx.ledger_index),
                    ..Default::default()
                }
            }
        };

        storage.update_open_offer(&offer.hash, patch).await?;
    }
    Ok(())
}

async fn handle_transfer(
    storage: &dyn Storage,
    tx: &EnrichedTransaction,
    user_id: &str,
    target_account: &str,
) -> Result<()> {
    let Some(bc) = tx.balance_change_for(target_account) else {
        warn!(hash = %tx.hash, "deposit/withdrawal with no balance change for target, dropping");
        return Ok(());
    };
    let non_fee = bc.non_fee_currencies(tx.fee_native);
    let Some(delta) = non_fee.first() else {
        warn!(hash = %tx.hash, "deposit/withdrawal balance change is fee-only, dropping");
        return Ok(());
    };

    let is_sender = target_account == tx.account;
    let magnitude = delta.value.abs();
    let value = if is_sender && delta.is_native() {
        magnitude - tx.fee_native
    } else {
        magnitude
    };

    let kind = match tx.nature {
        Nature::Deposit => TransferKind::Deposit,
        Nature::Withdrawal => TransferKind::Withdrawal,
        Nature::InternalTransfer => TransferKind::InternalTransfer,
        _ => return Ok(()),
    };
    let fee_native = if kind == TransferKind::Deposit { Decimal::ZERO } else { tx.fee_native };

    let (from_address, to_address) = (
        tx.account.clone(),
        tx.destination.clone().unwrap_or_default(),
    );

    let record = DepositWithdrawal {
        hash: tx.hash.clone(),
        ledger_index: tx.ledger_index,
        timestamp: tx.timestamp,
        from_address,
        to_address,
        amount: Amount { currency: delta.currency.clone(), issuer: delta.issuer.clone(), value },
        kind,
        user_id: user_id.to_string(),
        fee_native,
    };
    storage.put_deposit_withdrawal(&record).await
}
