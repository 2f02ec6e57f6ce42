//! Order admission and cancellation. §4.4.

use rust_decimal::Decimal;
use sqlx::postgres::types::PgInterval;
use sqlx::{Postgres, Transaction};
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};
use crate::ledger;
use crate::types::{AssetId, ContractId, Direction, HoldingSource, Order, OrderId, OrderState, OrderType, UserId};

fn interval_from_seconds(seconds: i64) -> PgInterval {
    PgInterval {
        months: 0,
        days: 0,
        microseconds: seconds * 1_000_000,
    }
}

/// §4.4 `create_order`. Escrows funds before persisting the order in
/// state `Created`.
#[allow(clippy::too_many_arguments)]
pub async fn create_order(
    tx: &mut Transaction<'_, Postgres>,
    user_id: UserId,
    price: Option<Decimal>,
    price_asset_id: AssetId,
    contract_id: ContractId,
    volume: Decimal,
    is_bid: bool,
    order_type: OrderType,
    expires_in_secs: Option<i64>,
) -> EngineResult<Order> {
    let price_asset = crate::asset::get(tx, price_asset_id).await?;
    if price_asset.is_removed() {
        return Err(EngineError::Market("price asset is removed".into()));
    }

    let contract = crate::contract::load_active(tx, contract_id).await?;
    let contract_asset = crate::asset::get(tx, contract.contract_asset_id).await?;
    if contract_asset.is_removed() {
        return Err(EngineError::Market("contract asset is removed".into()));
    }

    if !contract.can_be_used_in_order() {
        return Err(EngineError::InvalidLifecycle(format!(
            "contract {contract_id} is not active"
        )));
    }

    if volume <= Decimal::ZERO {
        return Err(EngineError::Market("order volume must be strictly positive".into()));
    }

    if matches!(order_type, OrderType::LimitOrder) && price.is_none() {
        return Err(EngineError::Market("limit orders require a price".into()));
    }

    if is_bid && matches!(order_type, OrderType::MarketOrder) && price.is_none() {
        // §9 open question, resolved: refuse rather than guess an escrow cap.
        return Err(EngineError::Market(
            "market bid orders must carry an explicit escrow cap".into(),
        ));
    }

    let direction = if is_bid { Direction::Bid } else { Direction::Ask };

    if is_bid {
        let obligation = price.expect("validated above");
        ledger::debit(
            tx,
            user_id,
            price_asset_id,
            obligation,
            HoldingSource::InternalTrade,
            Some("order escrow (bid)"),
        )
        .await?;
    } else {
        ledger::debit(
            tx,
            user_id,
            contract.contract_asset_id,
            volume,
            HoldingSource::InternalTrade,
            Some("order escrow (ask)"),
        )
        .await?;
    }

    let expires_in = expires_in_secs.map(interval_from_seconds);

    let order = sqlx::query_as::<_, Order>(
        "INSERT INTO orders (created_at, user_id, price, asset_id, volume, contract_id, expires_in, direction, order_type, state)
         VALUES (now(), $1, $2, $3, $4, $5, $6, $7, $8, 'Created')
         RETURNING *",
    )
    .bind(user_id)
    .bind(price)
    .bind(price_asset_id)
    .bind(volume)
    .bind(contract_id)
    .bind(expires_in)
    .bind(direction)
    .bind(order_type)
    .fetch_one(&mut **tx)
    .await?;

    info!(order_id = order.id, user_id, contract_id, "order created");
    Ok(order)
}

pub async fn load_for_update(
    tx: &mut Transaction<'_, Postgres>,
    order_id: OrderId,
) -> EngineResult<Order> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(order_id)
        .fetch_one(&mut **tx)
        .await?;
    Ok(order)
}

/// §4.4 `cancel`. Allowed only from `Created`/`InMarket`; refunds the
/// escrow on success.
pub async fn cancel(tx: &mut Transaction<'_, Postgres>, order_id: OrderId) -> EngineResult<bool> {
    let order = load_for_update(tx, order_id).await?;

    if !matches!(order.state, OrderState::Created | OrderState::InMarket) {
        warn!(order_id, state = ?order.state, "cannot cancel order in terminal state");
        return Ok(false);
    }

    let (refund_asset_id, refund_volume) = match order.direction {
        Direction::Ask => {
            let contract = crate::contract::load_for_update(tx, order.contract_id).await?;
            (contract.contract_asset_id, order.volume)
        }
        Direction::Bid => (
            order.asset_id,
            order
                .price
                .expect("bid orders always carry an explicit escrow amount"),
        ),
    };

    sqlx::query("UPDATE orders SET state = 'Cancelled' WHERE id = $1")
        .bind(order_id)
        .execute(&mut **tx)
        .await?;

    ledger::credit(
        tx,
        order.user_id,
        refund_asset_id,
        refund_volume,
        HoldingSource::InternalTrade,
        Some("order cancel refund"),
    )
    .await?;

    info!(order_id, "order cancelled and escrow refunded");
    Ok(true)
}
