//! Storage interface.
//!
//! The core depends only on this trait; `sqlite` is the shipped backend.
//! An `async_trait` over `Send + Sync` so a future non-SQLite backend is
//! a drop-in.

pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::Result;
use crate::model::{DepositWithdrawal, EnrichedTransaction, Offer, OfferStatus, ResolutionMethod, Trade, UserConfig};

/// Partial update applied to a resting offer still in OPEN or
/// PARTIALLY_FILLED status. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct OfferPatch {
    pub status: Option<OfferStatus>,
    pub last_checked_ledger: Option<u32>,
    pub filled_gets: Option<crate::model::amount::Amount>,
    pub filled_pays: Option<crate::model::amount::Amount>,
    pub trades: Option<Vec<Trade>>,
    pub resolved_date: Option<DateTime<Utc>>,
    pub resolved_ledger_index: Option<u32>,
    pub cancel_tx_hash: Option<String>,
    pub cancel_fee_native: Option<Decimal>,
    pub resolution_method: Option<ResolutionMethod>,
}

impl OfferPatch {
    pub fn apply(self, offer: &mut Offer) {
        if let Some(status) = self.status {
            offer.status = status;
        }
        if let Some(v) = self.last_checked_ledger {
            offer.last_checked_ledger = v;
        }
        if let Some(v) = self.filled_gets {
            offer.filled_gets = Some(v);
        }
        if let Some(v) = self.filled_pays {
            offer.filled_pays = Some(v);
        }
        if let Some(v) = self.trades {
            offer.trades = v;
        }
        if let Some(v) = self.resolved_date {
            offer.resolved_date = Some(v);
        }
        if let Some(v) = self.resolved_ledger_index {
            offer.resolved_ledger_index = Some(v);
        }
        if let Some(v) = self.cancel_tx_hash {
            offer.cancel_tx_hash = Some(v);
        }
        if let Some(v) = self.cancel_fee_native {
            offer.cancel_fee_native = Some(v);
        }
        if let Some(v) = self.resolution_method {
            offer.resolution_method = Some(v);
        }
    }
}

/// Contractual operation set. Storage is otherwise opaque: no schema
/// beyond the field names here is dictated.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get_users(&self) -> Result<Vec<UserConfig>>;
    async fn put_users(&self, users: &[UserConfig]) -> Result<()>;

    async fn put_transaction(&self, tx: &EnrichedTransaction, user_id: &str) -> Result<()>;
    async fn get_latest_ledger_index(&self, user_id: &str, wallet: &str) -> Result<Option<u32>>;

    async fn put_open_offer(&self, offer: &Offer) -> Result<()>;
    async fn update_open_offer(&self, hash: &str, patch: OfferPatch) -> Result<()>;
    async fn delete_open_offer(&self, hash: &str) -> Result<()>;
    async fn get_open_offer_by_sequence(&self, account: &str, sequence: u32) -> Result<Option<Offer>>;
    async fn list_open_offers(&self) -> Result<Vec<Offer>>;

    async fn put_filled_offer(&self, offer: &Offer) -> Result<()>;
    async fn put_canceled_offer(&self, offer: &Offer) -> Result<()>;
    /// Look up `hash` in the filled/canceled stores, in that order.
    /// Used to keep replaying a creation event a no-op once an offer
    /// has reached a terminal status.
    async fn get_terminal_offer(&self, hash: &str) -> Result<Option<Offer>>;

    async fn put_deposit_withdrawal(&self, record: &DepositWithdrawal) -> Result<()>;

    async fn put_trade(&self, trade: &Trade) -> Result<()>;
    async fn list_trades(&self, related_offer_hash: &str) -> Result<Vec<Trade>>;
}
