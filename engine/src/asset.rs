//! Asset registry. §4.2.

use sqlx::{Postgres, Transaction};

use crate::error::EngineResult;
use crate::types::{Asset, AssetId};

/// Normalizes the name (trim + uppercase) and persists a new, active
/// asset. Names are unique among active assets only — a removed asset
/// vacates its name, enforced by the partial nature of the database's
/// UNIQUE constraint on a nullable column.
pub async fn create(tx: &mut Transaction<'_, Postgres>, name: &str) -> EngineResult<Asset> {
    let normalized = name.trim().to_uppercase();
    let asset = sqlx::query_as::<_, Asset>(
        "INSERT INTO assets (name) VALUES ($1) RETURNING *",
    )
    .bind(normalized)
    .fetch_one(&mut **tx)
    .await?;
    Ok(asset)
}

/// Soft-removes an asset: clears its name, remembers the old one, and
/// stamps `removed_at`. Idempotent — removing an already-removed asset
/// is a no-op.
pub async fn remove(tx: &mut Transaction<'_, Postgres>, asset_id: AssetId) -> EngineResult<()> {
    sqlx::query(
        "UPDATE assets
         SET previous_name = COALESCE(previous_name, name),
             name = NULL,
             removed_at = COALESCE(removed_at, now())
         WHERE id = $1",
    )
    .bind(asset_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn get(tx: &mut Transaction<'_, Postgres>, asset_id: AssetId) -> EngineResult<Asset> {
    let asset = sqlx::query_as::<_, Asset>("SELECT * FROM assets WHERE id = $1")
        .bind(asset_id)
        .fetch_one(&mut **tx)
        .await?;
    Ok(asset)
}
