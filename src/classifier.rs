//! Classifier.
//!
//! Pure decision table over an enriched transaction and the current
//! user's wallet set. No I/O, no storage — callable from `#[cfg(test)]`
//! with hand-built fixtures, matching the metadata analyzer's style.

use std::collections::HashSet;

use crate::model::amount::Amount;
use crate::model::transaction::{NodeKind, Nature, RawTransaction};
use crate::model::{BalanceChange, OfferNodeRef};

/// Decide the [`Nature`] of a transaction for one user, evaluating
/// the decision table top-down; first match wins.
pub fn classify(
    raw: &RawTransaction,
    balance_changes: &[BalanceChange],
    offer_nodes: &[OfferNodeRef],
    user_wallets: &HashSet<String>,
    fee_native: rust_decimal::Decimal,
) -> Nature {
    let result = raw
        .meta
        .get("TransactionResult")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if result != "tesSUCCESS" {
        return Nature::Other;
    }

    let account = &raw.fields.account;
    let destination = raw.fields.destination.as_deref();

    match raw.fields.transaction_type.as_str() {
        "Payment" => classify_payment(account, destination, balance_changes, offer_nodes, user_wallets, fee_native),
        "OfferCreate" => classify_offer_create(account, balance_changes, offer_nodes, fee_native),
        "OfferCancel" => Nature::OfferCancel,
        _ => Nature::Other,
    }
}

fn classify_payment(
    account: &str,
    destination: Option<&str>,
    balance_changes: &[BalanceChange],
    offer_nodes: &[OfferNodeRef],
    user_wallets: &HashSet<String>,
    fee_native: rust_decimal::Decimal,
) -> Nature {
    let account_is_user = user_wallets.contains(account);
    let destination_is_user = destination.map(|d| user_wallets.contains(d)).unwrap_or(false);

    // Tie-break: cross-user AND market-trade both match ⇒ internal_transfer.
    if account_is_user && destination_is_user {
        return Nature::InternalTransfer;
    }
    if account_is_user && !destination_is_user {
        return Nature::Withdrawal;
    }
    if !account_is_user && destination_is_user {
        return Nature::Deposit;
    }
    // Neither side is a user wallet we track; fall through to the
    // sender's market-trade signal as the table's generic Payment rule.
    if is_market_trade_signal(account, balance_changes, offer_nodes, fee_native) {
        return Nature::MarketTrade;
    }
    Nature::Other
}

fn is_market_trade_signal(
    account: &str,
    balance_changes: &[BalanceChange],
    offer_nodes: &[OfferNodeRef],
    fee_native: rust_decimal::Decimal,
) -> bool {
    let sender_distinct_currencies = balance_changes
        .iter()
        .find(|bc| bc.account == account)
        .map(|bc| bc.non_fee_currencies(fee_native).len())
        .unwrap_or(0);

    let any_offer_touched = offer_nodes
        .iter()
        .any(|n| matches!(n.kind, NodeKind::Modified | NodeKind::Deleted));

    sender_distinct_currencies >= 2 || any_offer_touched
}

fn classify_offer_create(
    account: &str,
    balance_changes: &[BalanceChange],
    offer_nodes: &[OfferNodeRef],
    fee_native: rust_decimal::Decimal,
) -> Nature {
    let created_by_account = offer_nodes
        .iter()
        .any(|n| n.kind == NodeKind::Created && n.account == account);

    let account_balance_is_fee_only = balance_changes
        .iter()
        .find(|bc| bc.account == account)
        .map(|bc| bc.non_fee_currencies(fee_native).is_empty())
        .unwrap_or(true);

    if created_by_account && account_balance_is_fee_only {
        Nature::OfferOpen
    } else {
        Nature::OfferFilled
    }
}

/// True when `amount`'s value is within the native-fee tolerance of zero
/// after accounting for `fee_native` — used by callers that need the raw
/// boolean rather than a filtered list.
pub fn is_fee_only(amount: &Amount, fee_native: rust_decimal::Decimal) -> bool {
    amount.is_native() && Amount::is_fee_only_native(amount.value, fee_native)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::balance::CurrencyDelta;
    use crate::model::transaction::TxFields;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn raw(account: &str, destination: Option<&str>, tx_type: &str) -> RawTransaction {
        RawTransaction {
            hash: "H".to_string(),
            ledger_index: 10,
            fields: TxFields {
                account: account.to_string(),
                transaction_type: tx_type.to_string(),
                fee_drops: "10".to_string(),
                sequence: 1,
                date: 0,
                destination: destination.map(str::to_string),
                amount: None,
                taker_gets: None,
                taker_pays: None,
                offer_sequence: None,
                source_tag: None,
            },
            meta: serde_json::json!({"TransactionResult": "tesSUCCESS"}),
        }
    }

    fn users(wallets: &[&str]) -> HashSet<String> {
        wallets.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn internal_transfer_when_both_sides_owned() {
        let tx = raw("W1", Some("W2"), "Payment");
        let nature = classify(&tx, &[], &[], &users(&["W1", "W2"]), Decimal::ZERO);
        assert_eq!(nature, Nature::InternalTransfer);
    }

    #[test]
    fn deposit_when_only_destination_owned() {
        let tx = raw("external", Some("W1"), "Payment");
        let nature = classify(&tx, &[], &[], &users(&["W1"]), Decimal::ZERO);
        assert_eq!(nature, Nature::Deposit);
    }

    #[test]
    fn withdrawal_when_only_sender_owned_and_single_currency() {
        let tx = raw("W1", Some("external"), "Payment");
        let nature = classify(&tx, &[], &[], &users(&["W1"]), Decimal::ZERO);
        assert_eq!(nature, Nature::Withdrawal);
    }

    #[test]
    fn withdrawal_even_when_sender_touches_two_currencies() {
        // Withdrawal (row 2) sits above market_trade (row 4) in the
        // decision table and carries no market-trade condition of its
        // own: an owned sender crossing currencies on its way out is
        // still a withdrawal, not a market trade.
        let tx = raw("W1", Some("external"), "Payment");
        let balance_changes = vec![BalanceChange {
            account: "W1".to_string(),
            balances: vec![
                CurrencyDelta { currency: "NATIVE".to_string(), issuer: None, value: Decimal::from_str("-5").unwrap() },
                CurrencyDelta { currency: "USD".to_string(), issuer: Some("rIssuer".to_string()), value: Decimal::from_str("10").unwrap() },
            ],
        }];
        let nature = classify(&tx, &balance_changes, &[], &users(&["W1"]), Decimal::ZERO);
        assert_eq!(nature, Nature::Withdrawal);
    }

    #[test]
    fn market_trade_when_neither_side_is_tracked() {
        let tx = raw("external1", Some("external2"), "Payment");
        let balance_changes = vec![BalanceChange {
            account: "external1".to_string(),
            balances: vec![
                CurrencyDelta { currency: "NATIVE".to_string(), issuer: None, value: Decimal::from_str("-5").unwrap() },
                CurrencyDelta { currency: "USD".to_string(), issuer: Some("rIssuer".to_string()), value: Decimal::from_str("10").unwrap() },
            ],
        }];
        let nature = classify(&tx, &balance_changes, &[], &users(&["W1"]), Decimal::ZERO);
        assert_eq!(nature, Nature::MarketTrade);
    }

    #[test]
    fn non_success_result_is_other() {
        let mut tx = raw("W1", Some("W2"), "Payment");
        tx.meta = serde_json::json!({"TransactionResult": "tecUNFUNDED_PAYMENT"});
        let nature = classify(&tx, &[], &[], &users(&["W1", "W2"]), Decimal::ZERO);
        assert_eq!(nature, Nature::Other);
    }

    #[test]
    fn offer_create_with_created_node_and_fee_only_balance_is_open() {
        let offer_nodes = vec![OfferNodeRef {
            kind: NodeKind::Created,
            account: "A".to_string(),
            sequence: 100,
            previous_txn_id: None,
            final_taker_gets: None,
            final_taker_pays: None,
            previous_taker_gets: None,
            previous_taker_pays: None,
        }];
        let balance_changes = vec![BalanceChange {
            account: "A".to_string(),
            balances: vec![CurrencyDelta {
                currency: "NATIVE".to_string(),
                issuer: None,
                value: Decimal::from_str("-0.00001").unwrap(),
            }],
        }];
        let tx = raw("A", None, "OfferCreate");
        let fee = Decimal::from_str("0.00001").unwrap();
        let nature = classify(&tx, &balance_changes, &offer_nodes, &users(&["A"]), fee);
        assert_eq!(nature, Nature::OfferOpen);
    }

    #[test]
    fn offer_create_without_created_node_is_filled() {
        let tx = raw("A", None, "OfferCreate");
        let balance_changes = vec![BalanceChange {
            account: "A".to_string(),
            balances: vec![CurrencyDelta {
                currency: "NATIVE".to_string(),
                issuer: None,
                value: Decimal::from_str("-1000.00001").unwrap(),
            }],
        }];
        let nature = classify(&tx, &balance_changes, &[], &users(&["A"]), Decimal::from_str("0.00001").unwrap());
        assert_eq!(nature, Nature::OfferFilled);
    }

    #[test]
    fn offer_cancel_is_always_offer_cancel() {
        let tx = raw("A", None, "OfferCancel");
        let nature = classify(&tx, &[], &[], &users(&["A"]), Decimal::ZERO);
        assert_eq!(nature, Nature::OfferCancel);
    }
}
