//! Trade extractor.
//!
//! Synthesizes the counterparty (maker) view of a transaction's fills,
//! either from balance-change analysis or, when that yields nothing, from
//! the raw offer-node diffs. Exactly one of the two paths runs per
//! transaction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::model::amount::Amount;
use crate::model::transaction::NodeKind;
use crate::model::{BalanceChange, OfferNodeRef, Trade};

/// Emit the maker-side trades for one transaction.
pub fn extract_trades(
    hash: &str,
    ledger_index: u32,
    timestamp: DateTime<Utc>,
    taker_address: &str,
    fee_native: Decimal,
    balance_changes: &[BalanceChange],
    offer_nodes: &[OfferNodeRef],
) -> Vec<Trade> {
    let mut trades = from_balance_changes(
        hash,
        ledger_index,
        timestamp,
        taker_address,
        fee_native,
        balance_changes,
        offer_nodes,
    );

    if trades.is_empty() {
        trades = from_offer_nodes(hash, ledger_index, timestamp, taker_address, fee_native, offer_nodes);
    }

    trades.sort_by(|a, b| {
        a.maker_address
            .cmp(&b.maker_address)
            .then(a.related_offer_sequence.cmp(&b.related_offer_sequence))
    });
    trades
}

fn from_balance_changes(
    hash: &str,
    ledger_index: u32,
    timestamp: DateTime<Utc>,
    taker_address: &str,
    fee_native: Decimal,
    balance_changes: &[BalanceChange],
    offer_nodes: &[OfferNodeRef],
) -> Vec<Trade> {
    let mut trades = Vec::new();

    for bc in balance_changes {
        if bc.account == taker_address {
            continue;
        }
        let non_fee = bc.non_fee_currencies(fee_native);
        let positives: Vec<_> = non_fee.iter().filter(|d| d.value.is_sign_positive() && !d.value.is_zero()).collect();
        let negatives: Vec<_> = non_fee.iter().filter(|d| d.value.is_sign_negative()).collect();

        if positives.len() != 1 || negatives.len() != 1 {
            continue;
        }

        let bought = positives[0];
        let sold = negatives[0];

        let matching_node = offer_nodes.iter().find(|n| n.account == bc.account);

        trades.push(Trade {
            hash: hash.to_string(),
            ledger_index,
            timestamp,
            taker_address: taker_address.to_string(),
            maker_address: bc.account.clone(),
            sold_amount: Amount {
                currency: sold.currency.clone(),
                issuer: sold.issuer.clone(),
                value: sold.value.abs(),
            },
            bought_amount: Amount {
                currency: bought.currency.clone(),
                issuer: bought.issuer.clone(),
                value: bought.value,
            },
            related_offer_sequence: matching_node.map(|n| n.sequence),
            related_offer_hash: matching_node.and_then(|n| n.previous_txn_id.clone()),
            user_id: None,
            fee_native,
        });
    }

    trades
}

fn from_offer_nodes(
    hash: &str,
    ledger_index: u32,
    timestamp: DateTime<Utc>,
    taker_address: &str,
    fee_native: Decimal,
    offer_nodes: &[OfferNodeRef],
) -> Vec<Trade> {
    let mut trades = Vec::new();

    for node in offer_nodes {
        if !matches!(node.kind, NodeKind::Modified | NodeKind::Deleted) {
            continue;
        }

        let (gets, pays) = match node.kind {
            NodeKind::Deleted => (node.final_taker_gets.clone(), node.final_taker_pays.clone()),
            _ => {
                let (Some(prev_gets), Some(final_gets)) =
                    (&node.previous_taker_gets, &node.final_taker_gets)
                else {
                    continue;
                };
                let (Some(prev_pays), Some(final_pays)) =
                    (&node.previous_taker_pays, &node.final_taker_pays)
                else {
                    continue;
                };
                let gets = Amount::diff(prev_gets, final_gets).ok();
                let pays = Amount::diff(prev_pays, final_pays).ok();
                (gets, pays)
            }
        };

        let (Some(gets), Some(pays)) = (gets, pays) else {
            continue;
        };

        trades.push(Trade {
            hash: hash.to_string(),
            ledger_index,
            timestamp,
            taker_address: taker_address.to_string(),
            maker_address: node.account.clone(),
            sold_amount: gets,
            bought_amount: pays,
            related_offer_sequence: Some(node.sequence),
            related_offer_hash: node.previous_txn_id.clone(),
            user_id: None,
            fee_native,
        });
    }

    trades
}
