use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::amount::Amount;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    Deposit,
    Withdrawal,
    InternalTransfer,
}

/// A plain-Payment movement of funds, immutable after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositWithdrawal {
    pub hash: String,
    pub ledger_index: u32,
    pub timestamp: DateTime<Utc>,
    pub from_address: String,
    pub to_address: String,
    pub amount: Amount,
    pub kind: TransferKind,
    pub user_id: String,
    pub fee_native: Decimal,
}
