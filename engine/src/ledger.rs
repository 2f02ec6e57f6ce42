//! Append-only holdings journal. §4.1.
//!
//! Every adjustment is a new row, never an update — the audit log is
//! the balance computation, and compensation is just the inverse
//! holding. Concurrency is handled with a Postgres advisory
//! transaction lock keyed on `(user_id, asset_id)`, the same pattern
//! `examples/other_examples/..._afterburn-mexchange...trade.rs` uses
//! to serialize the read-sum-then-insert without a table-wide lock.

use rust_decimal::Decimal;
use sqlx::{Postgres, Transaction};
use tracing::warn;

use crate::error::{EngineError, EngineResult};
use crate::types::{AssetId, Holding, HoldingSource, UserId};

/// Acquire the per-(user, asset) advisory lock for the remainder of
/// this database transaction. Must be taken before any balance read
/// that will be followed by a write, on both the credit and debit
/// paths, to prevent lost updates.
pub(crate) async fn lock_account(
    tx: &mut Transaction<'_, Postgres>,
    user_id: UserId,
    asset_id: AssetId,
) -> EngineResult<()> {
    sqlx::query("SELECT pg_advisory_xact_lock($1, $2)")
        .bind(user_id as i32)
        .bind(asset_id as i32)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Sum of all holding volumes for `(user, asset)`. Zero if no history.
pub async fn balance(
    tx: &mut Transaction<'_, Postgres>,
    user_id: UserId,
    asset_id: AssetId,
) -> EngineResult<Decimal> {
    let sum: Option<Decimal> = sqlx::query_scalar(
        "SELECT SUM(volume) FROM holdings WHERE user_id = $1 AND asset_id = $2",
    )
    .bind(user_id)
    .bind(asset_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(sum.unwrap_or(Decimal::ZERO))
}

async fn asset_is_removed(
    tx: &mut Transaction<'_, Postgres>,
    asset_id: AssetId,
) -> EngineResult<bool> {
    let removed: bool =
        sqlx::query_scalar("SELECT removed_at IS NOT NULL FROM assets WHERE id = $1")
            .bind(asset_id)
            .fetch_one(&mut **tx)
            .await?;
    Ok(removed)
}

async fn append(
    tx: &mut Transaction<'_, Postgres>,
    user_id: UserId,
    asset_id: AssetId,
    signed_volume: Decimal,
    source: HoldingSource,
    description: Option<&str>,
) -> EngineResult<Holding> {
    if signed_volume.is_zero() {
        return Err(EngineError::Market(
            "zero-volume holdings are forbidden".into(),
        ));
    }

    lock_account(tx, user_id, asset_id).await?;

    if asset_is_removed(tx, asset_id).await? {
        return Err(EngineError::Market(format!(
            "asset {asset_id} is removed and cannot back new holdings"
        )));
    }

    if signed_volume < Decimal::ZERO {
        let current = balance(tx, user_id, asset_id).await?;
        if current + signed_volume < Decimal::ZERO {
            warn!(user_id, asset_id, %current, delta = %signed_volume, "debit would drive balance negative");
            return Err(EngineError::InsufficientFunds {
                needed: -signed_volume,
                have: current,
            });
        }
    }

    let holding = sqlx::query_as::<_, Holding>(
        "INSERT INTO holdings (user_id, asset_id, volume, source, description)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING *",
    )
    .bind(user_id)
    .bind(asset_id)
    .bind(signed_volume)
    .bind(source)
    .bind(description)
    .fetch_one(&mut **tx)
    .await?;

    Ok(holding)
}

/// Credit `volume` of `asset` to `user`. `volume` must be positive.
pub async fn credit(
    tx: &mut Transaction<'_, Postgres>,
    user_id: UserId,
    asset_id: AssetId,
    volume: Decimal,
    source: HoldingSource,
    description: Option<&str>,
) -> EngineResult<Holding> {
    if volume <= Decimal::ZERO {
        return Err(EngineError::Market(
            "credit volume must be strictly positive".into(),
        ));
    }
    append(tx, user_id, asset_id, volume, source, description).await
}

/// Debit `volume` of `asset` from `user`. Fails with
/// `InsufficientFunds` if the resulting balance would go negative.
pub async fn debit(
    tx: &mut Transaction<'_, Postgres>,
    user_id: UserId,
    asset_id: AssetId,
    volume: Decimal,
    source: HoldingSource,
    description: Option<&str>,
) -> EngineResult<Holding> {
    if volume <= Decimal::ZERO {
        return Err(EngineError::Market(
            "debit volume must be strictly positive".into(),
        ));
    }
    append(tx, user_id, asset_id, -volume, source, description).await
}

/// Users whose summed volume in `asset` is strictly positive.
pub async fn holders(
    tx: &mut Transaction<'_, Postgres>,
    asset_id: AssetId,
) -> EngineResult<Vec<(UserId, Decimal)>> {
    let rows: Vec<(UserId, Decimal)> = sqlx::query_as(
        "SELECT user_id, SUM(volume) FROM holdings
         WHERE asset_id = $1
         GROUP BY user_id
         HAVING SUM(volume) > 0
         ORDER BY user_id",
    )
    .bind(asset_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_account_keys_do_not_panic_on_large_ids() {
        // advisory locks bind user/asset ids as int4; anything produced by
        // a BIGSERIAL within i32 range must round-trip through `as i32`.
        let user_id: UserId = 1_000_000;
        let asset_id: AssetId = 2_000_000;
        assert_eq!(user_id as i32, 1_000_000);
        assert_eq!(asset_id as i32, 2_000_000);
    }
}
