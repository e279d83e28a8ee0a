pub mod amount;
pub mod balance;
pub mod deposit_withdrawal;
pub mod offer;
pub mod trade;
pub mod transaction;
pub mod user;

pub use amount::Amount;
pub use balance::{BalanceChange, CurrencyDelta};
pub use deposit_withdrawal::{DepositWithdrawal, TransferKind};
pub use offer::{Offer, OfferStatus, ResolutionMethod};
pub use trade::Trade;
pub use transaction::{
    AffectedNode, EnrichedTransaction, Nature, NodeKind, OfferNodeRef, RawTransaction, TxFields,
};
pub use user::UserConfig;
