use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::amount::Amount;
use super::trade::Trade;

/// Lifecycle status of an [`Offer`]. Transitions are enforced in
/// [`crate::lifecycle`], not by the type system — storage round-trips a
/// plain enum that could in principle be corrupted out of band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferStatus {
    Open,
    PartiallyFilled,
    Filled,
    Canceled,
}

/// How a terminal status was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    /// The causing transaction (fill or cancel) was observed directly.
    Direct,
    /// The offer vanished from `account_offers` with no observed cause.
    Inferred,
}

/// A resting limit order, keyed by the hash of the transaction that
/// created it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub hash: String,
    pub account: String,
    pub sequence: u32,
    pub user_id: String,
    pub created_ledger_index: u32,
    pub last_checked_ledger: u32,
    pub taker_gets: Amount,
    pub taker_pays: Amount,
    pub filled_gets: Option<Amount>,
    pub filled_pays: Option<Amount>,
    pub status: OfferStatus,
    pub created_date: DateTime<Utc>,
    pub resolved_date: Option<DateTime<Utc>>,
    pub resolved_ledger_index: Option<u32>,
    pub cancel_tx_hash: Option<String>,
    pub trades: Vec<Trade>,
    pub create_fee_native: Decimal,
    pub cancel_fee_native: Option<Decimal>,
    pub resolution_method: Option<ResolutionMethod>,
}

impl Offer {
    /// I1: open-ended offers are unique on `(account, sequence)`.
    pub fn is_open_ended(&self) -> bool {
        matches!(
            self.status,
            OfferStatus::Open | OfferStatus::PartiallyFilled
        )
    }

    /// I2/I5: terminal records never mutate further.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, OfferStatus::Filled | OfferStatus::Canceled)
    }
}
