use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::amount::Amount;

/// The maker side of one matched slice, emitted by the trade extractor
/// and appended to the corresponding [`super::offer::Offer`] by the
/// lifecycle state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub hash: String,
    pub ledger_index: u32,
    pub timestamp: DateTime<Utc>,
    pub taker_address: String,
    pub maker_address: String,
    pub sold_amount: Amount,
    pub bought_amount: Amount,
    pub related_offer_sequence: Option<u32>,
    pub related_offer_hash: Option<String>,
    pub user_id: Option<String>,
    pub fee_native: Decimal,
}
