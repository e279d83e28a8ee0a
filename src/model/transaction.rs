use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::amount::Amount;
use super::balance::BalanceChange;
use super::trade::Trade;

/// Seconds from the Unix epoch to the ledger epoch (2000-01-01T00:00:00Z),
/// per the ledger's epoch convention.
pub const LEDGER_EPOCH_OFFSET_SECS: i64 = 946_684_800;

pub fn ledger_time_to_utc(ripple_seconds: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ripple_seconds + LEDGER_EPOCH_OFFSET_SECS, 0).unwrap_or_default()
}

/// Which kind of ledger-object diff an [`AffectedNode`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Created,
    Modified,
    Deleted,
}

/// One entry of a transaction's `AffectedNodes` metadata, carrying
/// enough of the diff to drive both balance-change aggregation and offer
/// lifecycle decisions. Dynamic JSON fields are kept as [`serde_json::Value`]
/// since their shape varies by `ledger_entry_type`; only the fields the
/// core actually inspects (`Offer`'s `TakerGets`/`TakerPays`/`Account`/
/// `Sequence`) are pulled into strongly typed helpers on [`OfferNode`].
#[derive(Debug, Clone)]
pub struct AffectedNode {
    pub kind: NodeKind,
    pub ledger_entry_type: String,
    pub final_fields: serde_json::Value,
    pub previous_fields: serde_json::Value,
    pub previous_txn_id: Option<String>,
}

impl AffectedNode {
    pub fn is_offer(&self) -> bool {
        self.ledger_entry_type == "Offer"
    }

    pub fn account(&self) -> Option<&str> {
        self.final_fields
            .get("Account")
            .and_then(|v| v.as_str())
    }

    pub fn sequence(&self) -> Option<u32> {
        self.final_fields
            .get("Sequence")
            .and_then(|v| v.as_u64())
            .map(|v| v as u32)
    }

    pub fn final_taker_gets(&self) -> Option<Amount> {
        self.final_fields
            .get("TakerGets")
            .and_then(|v| Amount::from_wire(v).ok())
    }

    pub fn final_taker_pays(&self) -> Option<Amount> {
        self.final_fields
            .get("TakerPays")
            .and_then(|v| Amount::from_wire(v).ok())
    }

    pub fn previous_taker_gets(&self) -> Option<Amount> {
        self.previous_fields
            .get("TakerGets")
            .and_then(|v| Amount::from_wire(v).ok())
    }

    pub fn previous_taker_pays(&self) -> Option<Amount> {
        self.previous_fields
            .get("TakerPays")
            .and_then(|v| Amount::from_wire(v).ok())
    }
}

/// The semantic category a transaction is classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nature {
    Deposit,
    Withdrawal,
    InternalTransfer,
    MarketTrade,
    OfferOpen,
    OfferFilled,
    OfferCancel,
    Other,
}

/// The subset of top-level wire fields the core reads, normalized out of
/// the ledger node's `tx_json`/`tx` wrapper.
#[derive(Debug, Clone)]
pub struct TxFields {
    pub account: String,
    pub transaction_type: String,
    pub fee_drops: String,
    pub sequence: u32,
    pub date: i64,
    pub destination: Option<String>,
    pub amount: Option<serde_json::Value>,
    pub taker_gets: Option<serde_json::Value>,
    pub taker_pays: Option<serde_json::Value>,
    pub offer_sequence: Option<u32>,
    pub source_tag: Option<u32>,
}

/// A raw `account_tx` result entry after normalizing the `tx_json`/`tx`
/// and `meta`/`metaData` wrapper variance the ledger node's RPC exhibits
/// (tolerates both `meta`/`metaData` keys and both `tx_json`/`tx`
/// wrappers).
#[derive(Debug, Clone)]
pub struct RawTransaction {
    pub hash: String,
    pub ledger_index: u32,
    pub fields: TxFields,
    /// `Null` when absent, `String` when an unexpanded placeholder,
    /// `Object` otherwise — callers must branch on this.
    pub meta: serde_json::Value,
}

/// A transaction after enrichment by the metadata analyzer and
/// classifier.
#[derive(Debug, Clone)]
pub struct EnrichedTransaction {
    pub hash: String,
    pub ledger_index: u32,
    pub account: String,
    pub destination: Option<String>,
    pub transaction_type: String,
    pub transaction_result: String,
    pub sequence: u32,
    pub offer_sequence: Option<u32>,
    pub source_tag: Option<u32>,
    pub timestamp: DateTime<Utc>,
    pub fee_native: Decimal,
    pub balance_changes: Vec<BalanceChange>,
    pub offer_nodes: Vec<OfferNodeRef>,
    pub taker_gets: Option<Amount>,
    pub taker_pays: Option<Amount>,
    pub amount: Option<Amount>,
    pub nature: Nature,
    pub trades: Vec<Trade>,
}

impl EnrichedTransaction {
    pub fn is_success(&self) -> bool {
        self.transaction_result == "tesSUCCESS"
    }

    pub fn balance_change_for<'a>(&'a self, account: &str) -> Option<&'a BalanceChange> {
        self.balance_changes.iter().find(|bc| bc.account == account)
    }
}

/// A normalized reference to an `Offer`-typed [`AffectedNode`], tagged
/// with kind/owner/sequence for quick lifecycle dispatch.
#[derive(Debug, Clone)]
pub struct OfferNodeRef {
    pub kind: NodeKind,
    pub account: String,
    pub sequence: u32,
    pub previous_txn_id: Option<String>,
    pub final_taker_gets: Option<Amount>,
    pub final_taker_pays: Option<Amount>,
    pub previous_taker_gets: Option<Amount>,
    pub previous_taker_pays: Option<Amount>,
}
