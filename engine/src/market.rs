//! Matching engine. §4.5.
//!
//! `place` admits a `Created` order into the book and attempts to find
//! at most one counterparty; `execute` settles a matched pair.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{Postgres, Transaction};
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};
use crate::types::{Direction, Order, OrderId, OrderState, OrderType};
use crate::{order, transaction};

/// §4.5 `place(order)`. Transitions the order to `InMarket`, searches
/// for a counterparty under the §4.5 rules, and executes at most one
/// trade. Returns `Ok(None)` when the order rests in the book or (for
/// market orders) is auto-cancelled for lack of a candidate.
pub async fn place(
    tx: &mut Transaction<'_, Postgres>,
    order_id: OrderId,
) -> EngineResult<Option<crate::types::Transaction>> {
    let incoming = order::load_for_update(tx, order_id).await?;
    if !matches!(incoming.state, OrderState::Created) {
        return Err(EngineError::InvalidLifecycle(format!(
            "order {order_id} is not in state Created"
        )));
    }

    sqlx::query("UPDATE orders SET state = 'InMarket' WHERE id = $1")
        .bind(order_id)
        .execute(&mut **tx)
        .await?;
    info!(order_id, "order is now in market");

    let reciprocal = incoming.direction.reciprocal();

    let candidate = match incoming.order_type {
        OrderType::MarketOrder => find_market_candidate(tx, &incoming, reciprocal).await?,
        OrderType::LimitOrder => match find_exact_price_candidate(tx, &incoming, reciprocal).await? {
            Some(c) => Some(c),
            None => find_ratio_candidate(tx, &incoming, reciprocal).await?,
        },
    };

    match candidate {
        Some(counterparty) => {
            let txn = execute(tx, incoming.id, counterparty.id).await?;
            Ok(Some(txn))
        }
        None if matches!(incoming.order_type, OrderType::MarketOrder) => {
            info!(order_id, "no counterparty for market order, cancelling");
            order::cancel(tx, order_id).await?;
            Ok(None)
        }
        None => {
            info!(order_id, "limit order rests in the book");
            Ok(None)
        }
    }
}

async fn find_market_candidate(
    tx: &mut Transaction<'_, Postgres>,
    incoming: &Order,
    reciprocal: Direction,
) -> EngineResult<Option<Order>> {
    let query = match incoming.direction {
        Direction::Ask => {
            "SELECT * FROM orders
             WHERE contract_id = $1 AND direction = $2 AND state = 'InMarket'
               AND user_id <> $3 AND price IS NOT NULL AND volume >= $4
             ORDER BY price DESC, id ASC
             LIMIT 1"
        }
        Direction::Bid => {
            "SELECT * FROM orders
             WHERE contract_id = $1 AND direction = $2 AND state = 'InMarket'
               AND user_id <> $3 AND price IS NOT NULL AND volume <= $4
             ORDER BY price ASC, id ASC
             LIMIT 1"
        }
    };
    let candidate = sqlx::query_as::<_, Order>(query)
        .bind(incoming.contract_id)
        .bind(reciprocal)
        .bind(incoming.user_id)
        .bind(incoming.volume)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(candidate)
}

async fn find_exact_price_candidate(
    tx: &mut Transaction<'_, Postgres>,
    incoming: &Order,
    reciprocal: Direction,
) -> EngineResult<Option<Order>> {
    let query = match incoming.direction {
        Direction::Ask => {
            "SELECT * FROM orders
             WHERE contract_id = $1 AND direction = $2 AND state = 'InMarket'
               AND user_id <> $3 AND price >= $4
             ORDER BY price DESC, id ASC
             LIMIT 1"
        }
        Direction::Bid => {
            "SELECT * FROM orders
             WHERE contract_id = $1 AND direction = $2 AND state = 'InMarket'
               AND user_id <> $3 AND price <= $4
             ORDER BY price ASC, id ASC
             LIMIT 1"
        }
    };
    let price = incoming.price.expect("limit orders always carry a price");
    let candidate = sqlx::query_as::<_, Order>(query)
        .bind(incoming.contract_id)
        .bind(reciprocal)
        .bind(incoming.user_id)
        .bind(price)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(candidate)
}

async fn find_ratio_candidate(
    tx: &mut Transaction<'_, Postgres>,
    incoming: &Order,
    reciprocal: Direction,
) -> EngineResult<Option<Order>> {
    let ratio = incoming
        .price_to_volume()
        .expect("limit orders always carry a price");

    let query = match incoming.direction {
        Direction::Ask => {
            "SELECT * FROM orders
             WHERE contract_id = $1 AND direction = $2 AND state = 'InMarket'
               AND user_id <> $3 AND (price / volume) >= $4
             ORDER BY volume DESC, id ASC
             LIMIT 1"
        }
        Direction::Bid => {
            "SELECT * FROM orders
             WHERE contract_id = $1 AND direction = $2 AND state = 'InMarket'
               AND user_id <> $3 AND (price / volume) <= $4
             ORDER BY volume ASC, id ASC
             LIMIT 1"
        }
    };
    let candidate = sqlx::query_as::<_, Order>(query)
        .bind(incoming.contract_id)
        .bind(reciprocal)
        .bind(incoming.user_id)
        .bind(ratio)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(candidate)
}

/// Verifies an execution's limit, independent of persistence — the
/// formula from §4.5, extracted so it can be unit tested without a
/// database.
pub fn trade_price(
    earliest_direction: Direction,
    earliest_price: Option<Decimal>,
    latest_price: Option<Decimal>,
) -> Option<Decimal> {
    match (earliest_price, latest_price) {
        (None, None) => None,
        (None, Some(p)) => Some(p),
        (Some(p), None) => Some(p),
        (Some(ep), Some(lp)) => Some(match earliest_direction {
            Direction::Ask => ep.max(lp),
            Direction::Bid => ep.min(lp),
        }),
    }
}

fn verify_price(direction: Direction, limit: Option<Decimal>, price: Decimal) -> bool {
    match (direction, limit) {
        (_, None) => true,
        (Direction::Ask, Some(limit)) => limit <= price,
        (Direction::Bid, Some(limit)) => limit >= price,
    }
}

/// §4.5 execution contract. Re-verifies both orders' state inside this
/// transaction (the candidate search happened moments earlier and may
/// be stale under concurrent `place`/`cancel` calls).
pub async fn execute(
    tx: &mut Transaction<'_, Postgres>,
    first_id: OrderId,
    second_id: OrderId,
) -> EngineResult<crate::types::Transaction> {
    let (lo, hi) = if first_id <= second_id {
        (first_id, second_id)
    } else {
        (second_id, first_id)
    };
    let lo_order = order::load_for_update(tx, lo).await?;
    let hi_order = order::load_for_update(tx, hi).await?;
    let (first, second) = if first_id == lo { (lo_order, hi_order) } else { (hi_order, lo_order) };

    for o in [&first, &second] {
        if !matches!(o.state, OrderState::InMarket) {
            warn!(order_id = o.id, "execute: order is not InMarket");
            return Err(EngineError::Market(format!(
                "order {} is not in state InMarket",
                o.id
            )));
        }
    }

    let now = Utc::now();
    for o in [&first, &second] {
        if o.has_expired(now) {
            return Err(EngineError::OrderExpired(o.id));
        }
    }

    if first.direction == second.direction {
        return Err(EngineError::Market("orders have the same direction".into()));
    }
    if first.contract_id != second.contract_id {
        return Err(EngineError::Market("orders reference different contracts".into()));
    }
    if first.price.is_none() && second.price.is_none() {
        return Err(EngineError::Market("neither order specifies a price".into()));
    }

    let volume = first.volume.min(second.volume);

    let (earliest, latest) = if first.created_at <= second.created_at {
        (&first, &second)
    } else {
        (&second, &first)
    };

    let price = trade_price(earliest.direction, earliest.price, latest.price)
        .expect("at least one side has a price");

    if !verify_price(first.direction, first.price, price) || !verify_price(second.direction, second.price, price) {
        return Err(EngineError::Market(
            "computed price violates a resting limit".into(),
        ));
    }

    let (ask_order, bid_order) = if first.direction == Direction::Ask {
        (&first, &second)
    } else {
        (&second, &first)
    };

    sqlx::query("UPDATE orders SET state = 'Executed', executed_at = now() WHERE id = ANY($1)")
        .bind([ask_order.id, bid_order.id].as_slice())
        .execute(&mut **tx)
        .await?;

    let transaction_id: i64 = sqlx::query_scalar(
        "INSERT INTO transactions (contract_id, ask_order_id, bid_order_id, price, asset_id, volume)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING id",
    )
    .bind(first.contract_id)
    .bind(ask_order.id)
    .bind(bid_order.id)
    .bind(price)
    .bind(bid_order.asset_id)
    .bind(volume)
    .fetch_one(&mut **tx)
    .await?;

    transaction::execute_trade(tx, transaction_id).await?;

    info!(ask_order = ask_order.id, bid_order = bid_order.id, %price, %volume, "executed orders");

    let committed = sqlx::query_as::<_, crate::types::Transaction>(
        "SELECT * FROM transactions WHERE id = $1",
    )
    .bind(transaction_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(committed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn price_formation_tie_e5() {
        // E5: Ask created first at 20, Bid created second at 22, both vol 10.
        // Earliest is the Ask, so price = max(20, 22) = 22.
        let price = trade_price(Direction::Ask, Some(dec!(20)), Some(dec!(22)));
        assert_eq!(price, Some(dec!(22)));
    }

    #[test]
    fn price_formation_earliest_bid_takes_min() {
        let price = trade_price(Direction::Bid, Some(dec!(22)), Some(dec!(20)));
        assert_eq!(price, Some(dec!(20)));
    }

    #[test]
    fn price_formation_one_sided_null_price() {
        assert_eq!(trade_price(Direction::Ask, None, Some(dec!(15))), Some(dec!(15)));
        assert_eq!(trade_price(Direction::Bid, Some(dec!(15)), None), Some(dec!(15)));
    }

    #[test]
    fn verify_price_rejects_worse_than_limit() {
        // Ask wants at least 20, computed price of 18 must be rejected.
        assert!(!verify_price(Direction::Ask, Some(dec!(20)), dec!(18)));
        // Bid wants to pay at most 20, computed price of 22 must be rejected.
        assert!(!verify_price(Direction::Bid, Some(dec!(20)), dec!(22)));
    }

    #[test]
    fn verify_price_accepts_market_order_at_any_price() {
        assert!(verify_price(Direction::Ask, None, dec!(0.0001)));
        assert!(verify_price(Direction::Bid, None, dec!(1_000_000)));
    }
}
