//! Wire-format structs for the ledger node's JSON-RPC responses.
//!
//! Both `meta`/`metaData` and `tx_json`/`tx` key variants are normalized
//! into [`RawTransaction`]/[`TxFields`] at deserialization time via
//! `#[serde(alias = "...")]`.

use serde::Deserialize;
use serde_json::Value;

use crate::model::transaction::{RawTransaction, TxFields};

#[derive(Debug, Deserialize)]
pub struct AccountTxResponse {
    pub transactions: Vec<AccountTxEntry>,
    #[serde(default)]
    pub marker: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct AccountTxEntry {
    pub hash: Option<String>,
    pub ledger_index: Option<u32>,
    #[serde(alias = "tx_json", alias = "tx")]
    pub tx_json: Option<Value>,
    #[serde(alias = "metaData")]
    pub meta: Option<Value>,
}

impl AccountTxEntry {
    /// Normalize into a [`RawTransaction`], or `None` if the entry has no
    /// hash.
    pub fn into_raw(self) -> Option<RawTransaction> {
        let tx_json = self.tx_json.unwrap_or(Value::Null);
        let hash = self
            .hash
            .or_else(|| tx_json.get("hash").and_then(|v| v.as_str()).map(str::to_string))?;
        let ledger_index = self
            .ledger_index
            .or_else(|| tx_json.get("ledger_index").and_then(|v| v.as_u64()).map(|v| v as u32))
            .unwrap_or(0);

        let fields = TxFields {
            account: tx_json.get("Account")?.as_str()?.to_string(),
            transaction_type: tx_json.get("TransactionType")?.as_str()?.to_string(),
            fee_drops: tx_json.get("Fee").and_then(|v| v.as_str()).unwrap_or("0").to_string(),
            sequence: tx_json.get("Sequence").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
            date: tx_json.get("date").and_then(|v| v.as_i64()).unwrap_or(0),
            destination: tx_json.get("Destination").and_then(|v| v.as_str()).map(str::to_string),
            amount: tx_json.get("Amount").cloned(),
            taker_gets: tx_json.get("TakerGets").cloned(),
            taker_pays: tx_json.get("TakerPays").cloned(),
            offer_sequence: tx_json.get("OfferSequence").and_then(|v| v.as_u64()).map(|v| v as u32),
            source_tag: tx_json.get("SourceTag").and_then(|v| v.as_u64()).map(|v| v as u32),
        };

        Some(RawTransaction {
            hash,
            ledger_index,
            fields,
            meta: self.meta.unwrap_or(Value::Null),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct AccountOffersResponse {
    #[serde(default)]
    pub offers: Vec<AccountOfferEntry>,
    #[serde(default)]
    pub ledger_current_index: u32,
}

#[derive(Debug, Deserialize)]
pub struct AccountOfferEntry {
    pub seq: u32,
}

#[derive(Debug, Deserialize)]
pub struct TxResponse {
    pub hash: Option<String>,
    pub ledger_index: Option<u32>,
    #[serde(flatten)]
    pub entry: AccountTxEntryCompat,
}

/// `tx(hash)` returns the transaction fields at the top level rather than
/// nested under `tx_json`/`meta` the way `account_tx` does; this wrapper
/// lets [`TxResponse`] reuse [`AccountTxEntry::into_raw`] regardless.
#[derive(Debug, Deserialize)]
pub struct AccountTxEntryCompat {
    #[serde(alias = "tx_json", alias = "tx")]
    pub tx_json: Option<Value>,
    #[serde(alias = "metaData")]
    pub meta: Option<Value>,
}

impl TxResponse {
    pub fn into_raw(self) -> Option<RawTransaction> {
        let entry = AccountTxEntry {
            hash: self.hash,
            ledger_index: self.ledger_index,
            tx_json: self.entry.tx_json,
            meta: self.entry.meta,
        };
        entry.into_raw()
    }
}
