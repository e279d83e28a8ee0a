use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One currency's signed delta for a single account within a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyDelta {
    pub currency: String,
    pub issuer: Option<String>,
    pub value: Decimal,
}

impl CurrencyDelta {
    pub fn is_native(&self) -> bool {
        self.currency == crate::model::amount::NATIVE_CURRENCY && self.issuer.is_none()
    }
}

/// The signed balance deltas observed for one account in one transaction,
/// produced by the metadata analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub account: String,
    pub balances: Vec<CurrencyDelta>,
}

impl BalanceChange {
    /// Currencies touched, excluding a fee-only native delta.
    pub fn non_fee_currencies(&self, fee_native: Decimal) -> Vec<&CurrencyDelta> {
        self.balances
            .iter()
            .filter(|delta| {
                if delta.is_native() {
                    !crate::model::amount::Amount::is_fee_only_native(delta.value, fee_native)
                } else {
                    true
                }
            })
            .collect()
    }
}
