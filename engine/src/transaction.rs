//! Settlement. §4.5/§4.6.
//!
//! A transaction row is created by [`crate::market::execute`] with
//! `executed_at` still null; `execute_trade` performs the actual
//! ledger moves and stamps it, idempotently.

use tracing::info;

use crate::error::EngineResult;
use crate::ledger;
use crate::types::{HoldingSource, Transaction, TransactionId};
use sqlx::{Postgres, Transaction as PgTransaction};

/// Moves the contract-asset claim to the bid side and the price-asset
/// payment to the ask side, then stamps `executed_at`. A no-op if the
/// transaction was already settled, so callers may retry freely.
pub async fn execute_trade(
    tx: &mut PgTransaction<'_, Postgres>,
    transaction_id: TransactionId,
) -> EngineResult<Transaction> {
    let txn = sqlx::query_as::<_, Transaction>(
        "SELECT * FROM transactions WHERE id = $1 FOR UPDATE",
    )
    .bind(transaction_id)
    .fetch_one(&mut **tx)
    .await?;

    if txn.executed_at.is_some() {
        return Ok(txn);
    }

    let ask_order = crate::order::load_for_update(tx, txn.ask_order_id).await?;
    let bid_order = crate::order::load_for_update(tx, txn.bid_order_id).await?;

    // `price` is the order's stated total obligation, not a per-unit
    // rate — the escrow debited at order creation was exactly `price`
    // or `volume` of contract_asset, so settlement moves that same
    // total, never `price * volume`.
    let payment = txn.price;

    let contract = crate::contract::load_active(tx, txn.contract_id).await?;

    // Lock both (user_id, asset_id) pairs in deterministic order before
    // touching either, so two settlements that share a pair in opposite
    // roles can't acquire the advisory locks in reversed order.
    let mut pairs = [
        (bid_order.user_id, contract.contract_asset_id),
        (ask_order.user_id, txn.asset_id),
    ];
    pairs.sort();
    for (user_id, asset_id) in pairs {
        ledger::lock_account(tx, user_id, asset_id).await?;
    }

    ledger::credit(
        tx,
        bid_order.user_id,
        contract.contract_asset_id,
        txn.volume,
        HoldingSource::InternalTrade,
        Some("trade settlement: contract claim to buyer"),
    )
    .await?;

    ledger::credit(
        tx,
        ask_order.user_id,
        txn.asset_id,
        payment,
        HoldingSource::InternalTrade,
        Some("trade settlement: payment to seller"),
    )
    .await?;

    sqlx::query("UPDATE transactions SET executed_at = now() WHERE id = $1")
        .bind(transaction_id)
        .execute(&mut **tx)
        .await?;

    info!(transaction_id, "trade settled");

    let settled = sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE id = $1")
        .bind(transaction_id)
        .fetch_one(&mut **tx)
        .await?;
    Ok(settled)
}
