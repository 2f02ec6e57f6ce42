use crate::types::{Amount, OrderId};
use thiserror::Error;

/// The four error kinds named in the matching-engine spec, plus the
/// ambient database failure mode every entry point can hit.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("market error: {0}")]
    Market(String),

    #[error("order {0} has expired")]
    OrderExpired(OrderId),

    #[error("insufficient funds: needed {needed}, have {have}")]
    InsufficientFunds { needed: Amount, have: Amount },

    #[error("invalid lifecycle transition: {0}")]
    InvalidLifecycle(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
