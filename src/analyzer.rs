//! Metadata analyzer.
//!
//! Turns a transaction's raw `AffectedNodes` metadata into per-account
//! balance deltas and a normalized list of `Offer`-typed node diffs. Pure
//! function over JSON — no I/O, no storage, trivially unit-testable with
//! canned fixtures.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde_json::Value;

use crate::model::amount::NATIVE_CURRENCY;
use crate::model::balance::CurrencyDelta;
use crate::model::transaction::{AffectedNode, NodeKind};
use crate::model::{BalanceChange, OfferNodeRef};

const DROPS_PER_UNIT: i64 = 1_000_000;

/// Output of one analyzer pass.
#[derive(Debug, Default, Clone)]
pub struct AnalyzedMetadata {
    pub balance_changes: Vec<BalanceChange>,
    pub offer_nodes: Vec<OfferNodeRef>,
}

/// Analyze raw `meta`/`metaData`. Returns empty outputs (never an error)
/// when metadata is absent or an unexpanded string placeholder.
pub fn analyze(meta: &Value) -> AnalyzedMetadata {
    let nodes = match parse_affected_nodes(meta) {
        Some(nodes) => nodes,
        None => return AnalyzedMetadata::default(),
    };

    AnalyzedMetadata {
        balance_changes: compute_balance_changes(&nodes),
        offer_nodes: extract_offer_nodes(&nodes),
    }
}

fn parse_affected_nodes(meta: &Value) -> Option<Vec<AffectedNode>> {
    let object = meta.as_object()?;
    let raw_nodes = object.get("AffectedNodes")?.as_array()?;

    let mut nodes = Vec::with_capacity(raw_nodes.len());
    for raw in raw_nodes {
        if let Some(node) = parse_one_node(raw) {
            nodes.push(node);
        }
    }
    Some(nodes)
}

fn parse_one_node(raw: &Value) -> Option<AffectedNode> {
    let (kind, key) = if raw.get("CreatedNode").is_some() {
        (NodeKind::Created, "CreatedNode")
    } else if raw.get("ModifiedNode").is_some() {
        (NodeKind::Modified, "ModifiedNode")
    } else if raw.get("DeletedNode").is_some() {
        (NodeKind::Deleted, "DeletedNode")
    } else {
        return None;
    };

    let body = raw.get(key)?;
    let ledger_entry_type = body.get("LedgerEntryType")?.as_str()?.to_string();
    let final_fields = body.get("FinalFields").cloned().unwrap_or(Value::Null);
    let previous_fields = body.get("PreviousFields").cloned().unwrap_or(Value::Null);
    let previous_txn_id = body
        .get("PreviousTxnID")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    // CreatedNode carries its initial state under NewFields, not FinalFields.
    let final_fields = if final_fields.is_null() {
        body.get("NewFields").cloned().unwrap_or(Value::Null)
    } else {
        final_fields
    };

    Some(AffectedNode {
        kind,
        ledger_entry_type,
        final_fields,
        previous_fields,
        previous_txn_id,
    })
}

/// Aggregate signed per-account, per-currency deltas across AccountRoot
/// (native balance) and RippleState (issued-token trust line) nodes.
fn compute_balance_changes(nodes: &[AffectedNode]) -> Vec<BalanceChange> {
    let mut by_account: HashMap<String, Vec<CurrencyDelta>> = HashMap::new();

    for node in nodes {
        match node.ledger_entry_type.as_str() {
            "AccountRoot" => {
                if let Some((account, delta)) = account_root_delta(node) {
                    push_delta(&mut by_account, account, NATIVE_CURRENCY, None, delta);
                }
            }
            "RippleState" => {
                for (account, issuer, currency, delta) in ripple_state_deltas(node) {
                    push_delta(&mut by_account, account, &currency, Some(issuer), delta);
                }
            }
            _ => {}
        }
    }

    by_account
        .into_iter()
        .map(|(account, balances)| BalanceChange { account, balances })
        .collect()
}

fn push_delta(
    by_account: &mut HashMap<String, Vec<CurrencyDelta>>,
    account: String,
    currency: &str,
    issuer: Option<String>,
    delta: Decimal,
) {
    if delta.is_zero() {
        return;
    }
    let entry = by_account.entry(account).or_default();
    if let Some(existing) = entry
        .iter_mut()
        .find(|d| d.currency == currency && d.issuer == issuer)
    {
        existing.value += delta;
    } else {
        entry.push(CurrencyDelta {
            currency: currency.to_string(),
            issuer,
            value: delta,
        });
    }
}

fn account_root_delta(node: &AffectedNode) -> Option<(String, Decimal)> {
    let account = node
        .final_fields
        .get("Account")?
        .as_str()?
        .to_string();

    let final_drops: i64 = node
        .final_fields
        .get("Balance")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let previous_drops: i64 = node
        .previous_fields
        .get("Balance")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    let delta = Decimal::new(final_drops - previous_drops, 0) / Decimal::new(DROPS_PER_UNIT, 0);
    Some((account, delta.normalize()))
}

/// A trust-line delta is recorded relative to the line's `low`/`high`
/// endpoint accounts; the endpoint that did not post the delta is used
/// as the counterparty `issuer`, mirroring how `TakerGets`/`TakerPays`
/// already reference a token by its issuing address.
fn ripple_state_deltas(node: &AffectedNode) -> Vec<(String, String, String, Decimal)> {
    let low_account = node
        .final_fields
        .get("LowLimit")
        .and_then(|v| v.get("issuer"))
        .and_then(|v| v.as_str());
    let high_account = node
        .final_fields
        .get("HighLimit")
        .and_then(|v| v.get("issuer"))
        .and_then(|v| v.as_str());

    let (Some(low_account), Some(high_account)) = (low_account, high_account) else {
        return Vec::new();
    };

    let final_balance = node.final_fields.get("Balance");
    let previous_balance = node.previous_fields.get("Balance");

    let currency = final_balance
        .and_then(|v| v.get("currency"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    if currency.is_empty() {
        return Vec::new();
    }

    let final_value: Decimal = final_balance
        .and_then(|v| v.get("value"))
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
        .unwrap_or(Decimal::ZERO);
    let previous_value: Decimal = previous_balance
        .and_then(|v| v.get("value"))
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
        .unwrap_or(Decimal::ZERO);

    let delta = (final_value - previous_value).normalize();

    vec![
        (low_account.to_string(), high_account.to_string(), currency.clone(), delta),
        (high_account.to_string(), low_account.to_string(), currency, -delta),
    ]
}

/// Subset of nodes with `LedgerEntryType = Offer`.
fn extract_offer_nodes(nodes: &[AffectedNode]) -> Vec<OfferNodeRef> {
    nodes
        .iter()
        .filter(|n| n.is_offer())
        .filter_map(|n| {
            let account = n.account()?.to_string();
            let sequence = n.sequence()?;
            Some(OfferNodeRef {
                kind: n.kind,
                account,
                sequence,
                previous_txn_id: n.previous_txn_id.clone(),
                final_taker_gets: n.final_taker_gets(),
                final_taker_pays: n.final_taker_pays(),
                previous_taker_gets: n.previous_taker_gets(),
                previous_taker_pays: n.previous_taker_pays(),
            })
        })
        .collect()
}
