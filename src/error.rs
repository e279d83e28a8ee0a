use thiserror::Error;

/// The error kinds the core distinguishes. Each variant carries the
/// propagation policy implied by its name: `Rpc` is retried by the
/// caller before surfacing here, `Store` aborts the current cycle,
/// `LifecycleViolation` is logged and dropped, `Invariant` is fatal.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("ledger RPC error: {0}")]
    Rpc(String),

    #[error("storage error: {0}")]
    Store(String),

    #[error("lifecycle violation: {0}")]
    LifecycleViolation(String),

    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Amount(#[from] crate::model::amount::AmountError),
}

pub type Result<T> = std::result::Result<T, IndexerError>;
