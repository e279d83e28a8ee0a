use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The ledger's native asset, one whole unit per 10^6 drops.
pub const NATIVE_CURRENCY: &str = "NATIVE";
const DROPS_PER_UNIT: i64 = 1_000_000;

/// Tolerance used when comparing a native-asset delta against a fee, in
/// whole units: `native_delta + fee_native ≈ 0`.
pub const FEE_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 6);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("cannot diff amounts of different currencies: {0} vs {1}")]
    MixedCurrency(String, String),
    #[error("malformed wire amount: {0}")]
    Malformed(String),
}

/// A ledger quantity: either the native asset or an issued token, carried
/// as an arbitrary-precision decimal. Never represented as `f64` —
/// float arithmetic for monetary values is a latent defect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Amount {
    pub currency: String,
    pub issuer: Option<String>,
    pub value: Decimal,
}

impl Amount {
    pub fn native(value: Decimal) -> Self {
        Amount {
            currency: NATIVE_CURRENCY.to_string(),
            issuer: None,
            value,
        }
    }

    pub fn issued(currency: impl Into<String>, issuer: impl Into<String>, value: Decimal) -> Self {
        Amount {
            currency: currency.into(),
            issuer: Some(issuer.into()),
            value,
        }
    }

    pub fn is_native(&self) -> bool {
        self.currency == NATIVE_CURRENCY && self.issuer.is_none()
    }

    fn currency_key(&self) -> (&str, Option<&str>) {
        (self.currency.as_str(), self.issuer.as_deref())
    }

    /// Parse a wire amount: either a drops string (native) or a
    /// `{currency, issuer?, value}` record (issued token).
    pub fn from_wire(wire: &serde_json::Value) -> Result<Self, AmountError> {
        match wire {
            serde_json::Value::String(drops) => {
                let drops: i64 = drops
                    .parse()
                    .map_err(|_| AmountError::Malformed(drops.clone()))?;
                let value = Decimal::new(drops, 0) / Decimal::new(DROPS_PER_UNIT, 0);
                Ok(Amount::native(value.normalize()))
            }
            serde_json::Value::Object(map) => {
                let currency = map
                    .get("currency")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| AmountError::Malformed(wire.to_string()))?
                    .to_string();
                let issuer = map
                    .get("issuer")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                let value_str = map
                    .get("value")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| AmountError::Malformed(wire.to_string()))?;
                let value: Decimal = value_str
                    .parse()
                    .map_err(|_| AmountError::Malformed(value_str.to_string()))?;
                Ok(Amount {
                    currency,
                    issuer,
                    value: value.normalize(),
                })
            }
            other => Err(AmountError::Malformed(other.to_string())),
        }
    }

    /// Absolute value of `current - previous`. Both amounts must be in
    /// the same currency/issuer.
    pub fn diff(previous: &Amount, current: &Amount) -> Result<Amount, AmountError> {
        if previous.currency_key() != current.currency_key() {
            return Err(AmountError::MixedCurrency(
                format!("{}/{:?}", previous.currency, previous.issuer),
                format!("{}/{:?}", current.currency, current.issuer),
            ));
        }
        Ok(Amount {
            currency: current.currency.clone(),
            issuer: current.issuer.clone(),
            value: (current.value - previous.value).abs().normalize(),
        })
    }

    /// True if the native delta is within [`FEE_TOLERANCE`] of exactly
    /// offsetting `fee_native` (i.e. this account's only native-asset
    /// change in the transaction was paying the fee).
    pub fn is_fee_only_native(native_delta: Decimal, fee_native: Decimal) -> bool {
        (native_delta + fee_native).abs() <= FEE_TOLERANCE
    }
}

impl PartialEq for Amount {
    fn eq(&self, other: &Self) -> bool {
        self.currency_key() == other.currency_key()
            && self.value.normalize() == other.value.normalize()
    }
}

impl Eq for Amount {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn native_drops_to_whole_units() {
        let amount = Amount::from_wire(&serde_json::json!("1000000000")).unwrap();
        assert!(amount.is_native());
        assert_eq!(amount.value, Decimal::from_str("1000").unwrap());
    }

    #[test]
    fn issued_token_roundtrip() {
        let wire = serde_json::json!({"currency": "USD", "issuer": "rIssuer", "value": "500"});
        let amount = Amount::from_wire(&wire).unwrap();
        assert!(!amount.is_native());
        assert_eq!(amount.value, Decimal::from_str("500").unwrap());
    }

    #[test]
    fn diff_rejects_mixed_currency() {
        let a = Amount::native(Decimal::new(1, 0));
        let b = Amount::issued("USD", "rIssuer", Decimal::new(1, 0));
        assert!(matches!(
            Amount::diff(&a, &b),
            Err(AmountError::MixedCurrency(_, _))
        ));
    }

    #[test]
    fn diff_is_absolute() {
        let previous = Amount::native(Decimal::from_str("1000").unwrap());
        let current = Amount::native(Decimal::from_str("600").unwrap());
        let d = Amount::diff(&previous, &current).unwrap();
        assert_eq!(d.value, Decimal::from_str("400").unwrap());
    }

    #[test]
    fn equality_ignores_trailing_zeros() {
        let a = Amount::native(Decimal::from_str("500.00").unwrap());
        let b = Amount::native(Decimal::from_str("500").unwrap());
        assert_eq!(a, b);
    }

    #[test]
    fn fee_only_detection_within_tolerance() {
        let native_delta = Decimal::from_str("-0.00001").unwrap();
        let fee = Decimal::from_str("0.00001").unwrap();
        assert!(Amount::is_fee_only_native(native_delta, fee));
    }

    #[test]
    fn fee_only_detection_rejects_large_delta() {
        let native_delta = Decimal::from_str("-1000.00001").unwrap();
        let fee = Decimal::from_str("0.00001").unwrap();
        assert!(!Amount::is_fee_only_native(native_delta, fee));
    }
}
