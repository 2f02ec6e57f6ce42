//! Futures contract lifecycle: issue, cancel, expire. §4.3.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Postgres, Transaction};
use tracing::info;

use crate::error::{EngineError, EngineResult};
use crate::ledger;
use crate::types::{Asset, AssetId, ContractId, Futures, HoldingSource, UserId};

/// Issues a new futures contract: mints `mint_volume` of a freshly
/// created contract-asset to the issuer and escrows `collateral_volume`
/// of the underlying asset out of the issuer's balance, all within the
/// caller's transaction.
pub async fn issue(
    tx: &mut Transaction<'_, Postgres>,
    issuer_id: UserId,
    expires_at: DateTime<Utc>,
    underlying_asset_id: AssetId,
    collateral_volume: Decimal,
    contract_asset_name: &str,
    mint_volume: Decimal,
) -> EngineResult<(Futures, Asset)> {
    if expires_at <= Utc::now() {
        return Err(EngineError::Market(
            "contract expiry must be in the future".into(),
        ));
    }

    let balance = ledger::balance(tx, issuer_id, underlying_asset_id).await?;
    if balance < collateral_volume {
        return Err(EngineError::InsufficientFunds {
            needed: collateral_volume,
            have: balance,
        });
    }

    let contract_asset = crate::asset::create(tx, contract_asset_name).await?;

    let contract_id: ContractId = sqlx::query_scalar(
        "INSERT INTO contracts (created_at, contract_type, issuer_id)
         VALUES (now(), 'Future', $1)
         RETURNING id",
    )
    .bind(issuer_id)
    .fetch_one(&mut **tx)
    .await?;

    sqlx::query(
        "INSERT INTO futures (id, cancelled, expired, expires_at, volume, asset_id, contract_asset_id)
         VALUES ($1, false, false, $2, $3, $4, $5)",
    )
    .bind(contract_id)
    .bind(expires_at)
    .bind(collateral_volume)
    .bind(underlying_asset_id)
    .bind(contract_asset.id)
    .execute(&mut **tx)
    .await?;

    let futures = load_for_update(tx, contract_id).await?;

    ledger::credit(
        tx,
        issuer_id,
        contract_asset.id,
        mint_volume,
        HoldingSource::InternalTrade,
        Some("futures contract mint"),
    )
    .await?;
    ledger::debit(
        tx,
        issuer_id,
        underlying_asset_id,
        collateral_volume,
        HoldingSource::InternalTrade,
        Some("futures contract collateral"),
    )
    .await?;

    info!(contract_id = futures.id, issuer_id, "issued futures contract");
    Ok((futures, contract_asset))
}

pub async fn load_for_update(
    tx: &mut Transaction<'_, Postgres>,
    contract_id: ContractId,
) -> EngineResult<Futures> {
    let futures = sqlx::query_as::<_, Futures>(
        "SELECT futures.id, contracts.created_at, contracts.issuer_id, futures.expires_at,
                futures.volume, futures.asset_id, futures.contract_asset_id,
                futures.cancelled, futures.expired
         FROM futures JOIN contracts ON contracts.id = futures.id
         WHERE futures.id = $1
         FOR UPDATE",
    )
    .bind(contract_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(futures)
}

/// Read-only lookup, used where §4.4 only needs to check
/// `can_be_used_in_order` rather than mutate the contract.
pub async fn load_active(
    tx: &mut Transaction<'_, Postgres>,
    contract_id: ContractId,
) -> EngineResult<Futures> {
    let futures = sqlx::query_as::<_, Futures>(
        "SELECT futures.id, contracts.created_at, contracts.issuer_id, futures.expires_at,
                futures.volume, futures.asset_id, futures.contract_asset_id,
                futures.cancelled, futures.expired
         FROM futures JOIN contracts ON contracts.id = futures.id
         WHERE futures.id = $1",
    )
    .bind(contract_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(futures)
}

/// §4.3 `cancel`. Returns `false` (not an error) on every precondition
/// failure, matching the source's boolean-return contract.
pub async fn cancel(
    tx: &mut Transaction<'_, Postgres>,
    contract_id: ContractId,
) -> EngineResult<bool> {
    let contract = load_for_update(tx, contract_id).await?;

    let holders = ledger::holders(tx, contract.contract_asset_id).await?;
    if holders.iter().any(|(uid, _)| *uid != contract.issuer_id) {
        info!(contract_id, "cancel refused: another user holds the contract asset");
        return Ok(false);
    }

    let has_open_orders: bool = sqlx::query_scalar(
        "SELECT EXISTS(
            SELECT 1 FROM orders
            WHERE contract_id = $1 AND state NOT IN ('Cancelled', 'Executed')
         )",
    )
    .bind(contract_id)
    .fetch_one(&mut **tx)
    .await?;
    if has_open_orders {
        info!(contract_id, "cancel refused: open orders remain");
        return Ok(false);
    }

    if contract.expired || contract.expires_at < Utc::now() {
        info!(contract_id, "cancel refused: contract already expired or past expiry");
        return Ok(false);
    }

    if contract.cancelled {
        return Ok(false);
    }

    ledger::credit(
        tx,
        contract.issuer_id,
        contract.asset_id,
        contract.volume,
        HoldingSource::InternalTrade,
        Some("futures contract cancel refund"),
    )
    .await?;

    let issuer_claim_balance = ledger::balance(tx, contract.issuer_id, contract.contract_asset_id).await?;
    if issuer_claim_balance > Decimal::ZERO {
        ledger::debit(
            tx,
            contract.issuer_id,
            contract.contract_asset_id,
            issuer_claim_balance,
            HoldingSource::InternalTrade,
            Some("futures contract cancel burn"),
        )
        .await?;
    }

    crate::asset::remove(tx, contract.contract_asset_id).await?;

    let order_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE contract_id = $1")
        .bind(contract_id)
        .fetch_one(&mut **tx)
        .await?;

    if order_count == 0 {
        sqlx::query("DELETE FROM futures WHERE id = $1")
            .bind(contract_id)
            .execute(&mut **tx)
            .await?;
        sqlx::query("DELETE FROM contracts WHERE id = $1")
            .bind(contract_id)
            .execute(&mut **tx)
            .await?;
    } else {
        sqlx::query("UPDATE futures SET cancelled = true WHERE id = $1")
            .bind(contract_id)
            .execute(&mut **tx)
            .await?;
    }

    info!(contract_id, "cancelled futures contract");
    Ok(true)
}

/// §4.3 `expire`. Idempotent: a no-op if already expired.
pub async fn expire(tx: &mut Transaction<'_, Postgres>, contract_id: ContractId) -> EngineResult<()> {
    let contract = load_for_update(tx, contract_id).await?;
    if contract.expired {
        return Ok(());
    }

    let holders = ledger::holders(tx, contract.contract_asset_id).await?;
    let total: Decimal = holders.iter().map(|(_, v)| *v).sum();

    if total > Decimal::ZERO {
        for (user_id, volume) in holders {
            let share = (volume / total) * contract.volume;
            if share > Decimal::ZERO {
                ledger::credit(
                    tx,
                    user_id,
                    contract.asset_id,
                    share,
                    HoldingSource::InternalTrade,
                    Some("futures contract expiry distribution"),
                )
                .await?;
            }
        }
    }

    sqlx::query("UPDATE futures SET expired = true WHERE id = $1")
        .bind(contract_id)
        .execute(&mut **tx)
        .await?;

    info!(contract_id, "expired futures contract");
    Ok(())
}
