//! Core domain logic for the futures matching engine: the ledger,
//! asset registry, contract lifecycle, order admission, and matching.
//!
//! Every operation here takes an open `sqlx::Transaction` rather than
//! holding its own connection or session — callers (the HTTP layer,
//! tests) own transaction boundaries and commit or roll back.

pub mod asset;
pub mod config;
pub mod contract;
pub mod error;
pub mod ledger;
pub mod market;
pub mod order;
pub mod transaction;
pub mod types;

pub use config::Config;
pub use error::{EngineError, EngineResult};
