//! Integration tests for the order lifecycle state machine against an
//! in-memory `SqliteStorage`, covering a handful of literal scenarios:
//! opening, filling, partial-filling, canceling, inferring a fill via
//! reconciliation, and distinguishing deposits from internal transfers.

use std::collections::HashSet;

use ledger_tx_indexer::ledger::LedgerClient;
use ledger_tx_indexer::model::transaction::{RawTransaction, TxFields};
use ledger_tx_indexer::model::{OfferStatus, ResolutionMethod};
use ledger_tx_indexer::storage::sqlite::SqliteStorage;
use ledger_tx_indexer::storage::Storage;
use ledger_tx_indexer::{lifecycle, poller, reconciler};
use rust_decimal::Decimal;
use serde_json::json;
use std::str::FromStr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn users(wallets: &[&str]) -> HashSet<String> {
    wallets.iter().map(|s| s.to_string()).collect()
}

fn raw_tx(
    hash: &str,
    account: &str,
    destination: Option<&str>,
    tx_type: &str,
    ledger_index: u32,
    sequence: u32,
    meta: serde_json::Value,
) -> RawTransaction {
    RawTransaction {
        hash: hash.to_string(),
        ledger_index,
        fields: TxFields {
            account: account.to_string(),
            transaction_type: tx_type.to_string(),
            fee_drops: "10".to_string(),
            sequence,
            date: 0,
            destination: destination.map(str::to_string),
            amount: None,
            taker_gets: Some(json!("1000000000")),
            taker_pays: Some(json!({"currency": "USD", "issuer": "rIssuer", "value": "500"})),
            offer_sequence: None,
            source_tag: None,
        },
        meta,
    }
}

#[tokio::test]
async fn scenario_1_open_offer() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let user_wallets = users(&["A"]);

    let raw = raw_tx(
        "H1",
        "A",
        None,
        "OfferCreate",
        100,
        100,
        json!({
            "TransactionResult": "tesSUCCESS",
            "AffectedNodes": [{
                "CreatedNode": {
                    "LedgerEntryType": "Offer",
                    "NewFields": {
                        "Account": "A",
                        "Sequence": 100,
                        "TakerGets": "1000000000",
                        "TakerPays": {"currency": "USD", "issuer": "rIssuer", "value": "500"}
                    }
                }
            }]
        }),
    );

    let enriched = poller::enrich(&raw, &user_wallets);
    lifecycle::apply(&storage, &enriched, "u1", &user_wallets).await.unwrap();

    let offer = storage.get_open_offer_by_sequence("A", 100).await.unwrap().unwrap();
    assert_eq!(offer.status, OfferStatus::Open);
    assert_eq!(offer.taker_gets.value, Decimal::from_str("1000").unwrap());
    assert_eq!(offer.create_fee_native, Decimal::from_str("0.00001").unwrap());
}

#[tokio::test]
async fn scenario_2_immediate_full_fill() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let user_wallets = users(&["A"]);

    let raw = raw_tx(
        "H2",
        "A",
        None,
        "OfferCreate",
        100,
        100,
        json!({
            "TransactionResult": "tesSUCCESS",
            "AffectedNodes": [{
                "ModifiedNode": {
                    "LedgerEntryType": "AccountRoot",
                    "FinalFields": {"Account": "A", "Balance": "998999990"},
                    "PreviousFields": {"Balance": "1999000000"}
                }
            }]
        }),
    );

    let enriched = poller::enrich(&raw, &user_wallets);
    assert_eq!(enriched.nature, ledger_tx_indexer::model::Nature::OfferFilled);

    lifecycle::apply(&storage, &enriched, "u1", &user_wallets).await.unwrap();

    assert!(storage.get_open_offer_by_sequence("A", 100).await.unwrap().is_none());
    let filled = storage.get_terminal_offer("H2").await.unwrap().unwrap();
    assert_eq!(filled.filled_gets.unwrap().value, Decimal::from_str("1000").unwrap());
    assert_eq!(filled.filled_pays.unwrap().value, Decimal::from_str("500").unwrap());
}

#[tokio::test]
async fn scenario_3_partial_fill_by_unrelated_payment() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let user_wallets = users(&["A"]);

    // A's resting offer pre-exists.
    let open_raw = raw_tx(
        "H_OPEN",
        "A",
        None,
        "OfferCreate",
        90,
        100,
        json!({
            "TransactionResult": "tesSUCCESS",
            "AffectedNodes": [{
                "CreatedNode": {
                    "LedgerEntryType": "Offer",
                    "NewFields": {
                        "Account": "A",
                        "Sequence": 100,
                        "TakerGets": "1000000000",
                        "TakerPays": {"currency": "USD", "issuer": "rIssuer", "value": "500"}
                    }
                }
            }]
        }),
    );
    let enriched_open = poller::enrich(&open_raw, &user_wallets);
    lifecycle::apply(&storage, &enriched_open, "u1", &user_wallets).await.unwrap();

    // Payment from B to C crosses A's offer.
    let crossing_raw = raw_tx(
        "H3",
        "B",
        Some("C"),
        "Payment",
        95,
        1,
        json!({
            "TransactionResult": "tesSUCCESS",
            "AffectedNodes": [{
                "ModifiedNode": {
                    "LedgerEntryType": "Offer",
                    "FinalFields": {
                        "Account": "A",
                        "Sequence": 100,
                        "TakerGets": "600000000",
                        "TakerPays": {"currency": "USD", "issuer": "rIssuer", "value": "300"}
                    },
                    "PreviousFields": {
                        "TakerGets": "1000000000",
                        "TakerPays": {"currency": "USD", "issuer": "rIssuer", "value": "500"}
                    }
                }
            }]
        }),
    );
    let enriched_crossing = poller::enrich(&crossing_raw, &user_wallets);
    lifecycle::apply(&storage, &enriched_crossing, "u1", &user_wallets).await.unwrap();

    let offer = storage.get_open_offer_by_sequence("A", 100).await.unwrap().unwrap();
    assert_eq!(offer.status, OfferStatus::PartiallyFilled);
    assert_eq!(offer.filled_gets.unwrap().value, Decimal::from_str("400").unwrap());
    assert_eq!(offer.filled_pays.unwrap().value, Decimal::from_str("200").unwrap());
    assert_eq!(offer.taker_gets.value, Decimal::from_str("1000").unwrap());
}

#[tokio::test]
async fn scenario_4_explicit_cancel_of_partially_filled_offer() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let user_wallets = users(&["A"]);

    let open_raw = raw_tx(
        "H_OPEN4",
        "A",
        None,
        "OfferCreate",
        90,
        100,
        json!({
            "TransactionResult": "tesSUCCESS",
            "AffectedNodes": [{
                "CreatedNode": {
                    "LedgerEntryType": "Offer",
                    "NewFields": {
                        "Account": "A",
                        "Sequence": 100,
                        "TakerGets": "1000000000",
                        "TakerPays": {"currency": "USD", "issuer": "rIssuer", "value": "500"}
                    }
                }
            }]
        }),
    );
    let enriched_open = poller::enrich(&open_raw, &user_wallets);
    lifecycle::apply(&storage, &enriched_open, "u1", &user_wallets).await.unwrap();

    let crossing_raw = raw_tx(
        "H_CROSS4",
        "B",
        Some("C"),
        "Payment",
        95,
        1,
        json!({
            "TransactionResult": "tesSUCCESS",
            "AffectedNodes": [{
                "ModifiedNode": {
                    "LedgerEntryType": "Offer",
                    "FinalFields": {
                        "Account": "A",
                        "Sequence": 100,
                        "TakerGets": "600000000",
                        "TakerPays": {"currency": "USD", "issuer": "rIssuer", "value": "300"}
                    },
                    "PreviousFields": {
                        "TakerGets": "1000000000",
                        "TakerPays": {"currency": "USD", "issuer": "rIssuer", "value": "500"}
                    }
                }
            }]
        }),
    );
    let enriched_crossing = poller::enrich(&crossing_raw, &user_wallets);
    lifecycle::apply(&storage, &enriched_crossing, "u1", &user_wallets).await.unwrap();

    let mut cancel_raw = raw_tx(
        "H4",
        "A",
        None,
        "OfferCancel",
        96,
        101,
        json!({"TransactionResult": "tesSUCCESS", "AffectedNodes": []}),
    );
    cancel_raw.fields.offer_sequence = Some(100);
    let enriched_cancel = poller::enrich(&cancel_raw, &user_wallets);
    assert_eq!(enriched_cancel.nature, ledger_tx_indexer::model::Nature::OfferCancel);
    lifecycle::apply(&storage, &enriched_cancel, "u1", &user_wallets).await.unwrap();

    assert!(storage.get_open_offer_by_sequence("A", 100).await.unwrap().is_none());
}

#[tokio::test]
async fn scenario_6_deposit_vs_internal_transfer() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let user_wallets = users(&["W1", "W2"]);

    let internal_raw = raw_tx(
        "H6A",
        "W1",
        Some("W2"),
        "Payment",
        10,
        1,
        json!({
            "TransactionResult": "tesSUCCESS",
            "AffectedNodes": [
                {"ModifiedNode": {"LedgerEntryType": "AccountRoot", "FinalFields": {"Account": "W1", "Balance": "994999990"}, "PreviousFields": {"Balance": "999999990"}}},
                {"ModifiedNode": {"LedgerEntryType": "AccountRoot", "FinalFields": {"Account": "W2", "Balance": "1005000000"}, "PreviousFields": {"Balance": "1000000000"}}}
            ]
        }),
    );
    let enriched_internal = poller::enrich(&internal_raw, &user_wallets);
    assert_eq!(enriched_internal.nature, ledger_tx_indexer::model::Nature::InternalTransfer);
    lifecycle::apply(&storage, &enriched_internal, "u1", &user_wallets).await.unwrap();

    let deposit_raw = raw_tx(
        "H6B",
        "external",
        Some("W1"),
        "Payment",
        11,
        1,
        json!({
            "TransactionResult": "tesSUCCESS",
            "AffectedNodes": [
                {"ModifiedNode": {"LedgerEntryType": "AccountRoot", "FinalFields": {"Account": "W1", "Balance": "999999990"}, "PreviousFields": {"Balance": "994999990"}}}
            ]
        }),
    );
    let enriched_deposit = poller::enrich(&deposit_raw, &user_wallets);
    assert_eq!(enriched_deposit.nature, ledger_tx_indexer::model::Nature::Deposit);
    lifecycle::apply(&storage, &enriched_deposit, "u1", &user_wallets).await.unwrap();
}

/// A single-shot local RPC stub: accepts one connection, drains the
/// request, and writes back `body` as a `200 OK` JSON response.
async fn spawn_rpc_stub(body: String) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 4096];
        let _ = socket.read(&mut buf).await.unwrap();
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
    });

    format!("http://{addr}")
}

#[tokio::test]
async fn scenario_5_inferred_fill_through_reconcile() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let user_wallets = users(&["A"]);

    let open_raw = raw_tx(
        "H_OPEN5",
        "A",
        None,
        "OfferCreate",
        90,
        100,
        json!({
            "TransactionResult": "tesSUCCESS",
            "AffectedNodes": [{
                "CreatedNode": {
                    "LedgerEntryType": "Offer",
                    "NewFields": {
                        "Account": "A",
                        "Sequence": 100,
                        "TakerGets": "1000000000",
                        "TakerPays": {"currency": "USD", "issuer": "rIssuer", "value": "500"}
                    }
                }
            }]
        }),
    );
    let enriched_open = poller::enrich(&open_raw, &user_wallets);
    lifecycle::apply(&storage, &enriched_open, "u1", &user_wallets).await.unwrap();
    assert!(storage.get_open_offer_by_sequence("A", 100).await.unwrap().is_some());

    // The account_offers response omits sequence 100: it's gone from the
    // live order book with no transaction ever observed for it, so the
    // reconciler must infer a fill.
    let rpc_url = spawn_rpc_stub(
        json!({
            "result": {
                "offers": [],
                "ledger_current_index": 500
            }
        })
        .to_string(),
    )
    .await;
    let client = LedgerClient::new(rpc_url).unwrap();

    reconciler::reconcile(&storage, &client).await.unwrap();

    assert!(storage.get_open_offer_by_sequence("A", 100).await.unwrap().is_none());
    let filled = storage.get_terminal_offer("H_OPEN5").await.unwrap().unwrap();
    assert_eq!(filled.status, OfferStatus::Filled);
    assert_eq!(filled.resolution_method, Some(ResolutionMethod::Inferred));
    assert_eq!(filled.filled_gets.unwrap().value, Decimal::from_str("1000").unwrap());
}
