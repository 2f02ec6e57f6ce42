//! Integration tests against a real Postgres instance. Each test gets
//! its own throwaway database with the crate's migrations applied,
//! mirroring the disposable-database pattern used for order-storage
//! tests in production orderbook services.

use chrono::{Duration, Utc};
use engine::types::{Direction, HoldingSource, OrderState, OrderType};
use engine::{asset, contract, ledger, market, order};
use rust_decimal_macros::dec;
use sqlx::PgPool;

async fn seed_user(pool: &PgPool, username: &str) -> i64 {
    sqlx::query_scalar("INSERT INTO users (username, password_hash) VALUES ($1, 'x') RETURNING id")
        .bind(username)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[sqlx::test(migrations = "./migrations")]
async fn normal_trade_and_expiry(pool: PgPool) {
    let u1 = seed_user(&pool, "u1").await;
    let u2 = seed_user(&pool, "u2").await;

    let mut tx = pool.begin().await.unwrap();
    let btc = asset::create(&mut tx, "BTC").await.unwrap();
    let usd = asset::create(&mut tx, "USD").await.unwrap();
    ledger::credit(&mut tx, u1, btc.id, dec!(1), HoldingSource::External, None)
        .await
        .unwrap();
    ledger::credit(&mut tx, u2, usd.id, dec!(20), HoldingSource::External, None)
        .await
        .unwrap();

    let (futures, _contract_asset) = contract::issue(
        &mut tx,
        u1,
        Utc::now() + Duration::days(14),
        btc.id,
        dec!(1),
        "FUTURE",
        dec!(100),
    )
    .await
    .unwrap();

    let ask = order::create_order(
        &mut tx,
        u1,
        Some(dec!(20)),
        usd.id,
        futures.id,
        dec!(50),
        false,
        OrderType::LimitOrder,
        None,
    )
    .await
    .unwrap();
    let bid = order::create_order(
        &mut tx,
        u2,
        Some(dec!(20)),
        usd.id,
        futures.id,
        dec!(50),
        true,
        OrderType::LimitOrder,
        None,
    )
    .await
    .unwrap();

    market::place(&mut tx, ask.id).await.unwrap();
    let result = market::place(&mut tx, bid.id).await.unwrap();
    let txn = result.expect("bid crosses the resting ask");
    assert_eq!(txn.price, dec!(20));

    contract::expire(&mut tx, futures.id).await.unwrap();
    assert_eq!(ledger::balance(&mut tx, u1, btc.id).await.unwrap(), dec!(0.5));
    assert_eq!(ledger::balance(&mut tx, u2, btc.id).await.unwrap(), dec!(0.5));

    // Expiring again is a no-op.
    contract::expire(&mut tx, futures.id).await.unwrap();
    assert_eq!(ledger::balance(&mut tx, u1, btc.id).await.unwrap(), dec!(0.5));
    assert_eq!(ledger::balance(&mut tx, u2, btc.id).await.unwrap(), dec!(0.5));

    tx.commit().await.unwrap();
}

#[sqlx::test(migrations = "./migrations")]
async fn insufficient_collateral_rejects_issuance(pool: PgPool) {
    let u1 = seed_user(&pool, "u1").await;
    let mut tx = pool.begin().await.unwrap();
    let usd = asset::create(&mut tx, "USD").await.unwrap();

    let result = contract::issue(
        &mut tx,
        u1,
        Utc::now() + Duration::days(1),
        usd.id,
        dec!(1),
        "FUTURE",
        dec!(100),
    )
    .await;

    assert!(result.is_err());
    tx.rollback().await.unwrap();
}

#[sqlx::test(migrations = "./migrations")]
async fn cancel_empty_contract_deletes_row(pool: PgPool) {
    let u1 = seed_user(&pool, "u1").await;
    let mut tx = pool.begin().await.unwrap();
    let usd = asset::create(&mut tx, "USD").await.unwrap();
    ledger::credit(&mut tx, u1, usd.id, dec!(1), HoldingSource::External, None)
        .await
        .unwrap();

    let (futures, _) = contract::issue(
        &mut tx,
        u1,
        Utc::now() + Duration::days(1),
        usd.id,
        dec!(1),
        "FUTURE",
        dec!(100),
    )
    .await
    .unwrap();

    let cancelled = contract::cancel(&mut tx, futures.id).await.unwrap();
    assert!(cancelled);
    assert_eq!(ledger::balance(&mut tx, u1, usd.id).await.unwrap(), dec!(1));

    let still_exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM contracts WHERE id = $1)")
            .bind(futures.id)
            .fetch_one(&mut *tx)
            .await
            .unwrap();
    assert!(!still_exists);

    tx.commit().await.unwrap();
}

#[sqlx::test(migrations = "./migrations")]
async fn cancel_blocked_by_open_order_then_marked_cancelled(pool: PgPool) {
    let u1 = seed_user(&pool, "u1").await;
    let mut tx = pool.begin().await.unwrap();
    let usd = asset::create(&mut tx, "USD").await.unwrap();
    ledger::credit(&mut tx, u1, usd.id, dec!(1), HoldingSource::External, None)
        .await
        .unwrap();

    let (futures, _) = contract::issue(
        &mut tx,
        u1,
        Utc::now() + Duration::days(1),
        usd.id,
        dec!(1),
        "FUTURE",
        dec!(100),
    )
    .await
    .unwrap();

    let ask = order::create_order(
        &mut tx,
        u1,
        Some(dec!(20)),
        usd.id,
        futures.id,
        dec!(50),
        false,
        OrderType::LimitOrder,
        None,
    )
    .await
    .unwrap();

    assert!(!contract::cancel(&mut tx, futures.id).await.unwrap());

    market::place(&mut tx, ask.id).await.unwrap();
    assert!(!contract::cancel(&mut tx, futures.id).await.unwrap());

    let order_cancelled = order::cancel(&mut tx, ask.id).await.unwrap();
    assert!(order_cancelled);
    assert_eq!(
        ledger::balance(&mut tx, u1, futures.contract_asset_id).await.unwrap(),
        dec!(100)
    );

    let contract_cancelled = contract::cancel(&mut tx, futures.id).await.unwrap();
    assert!(contract_cancelled);

    let cancelled_flag: bool = sqlx::query_scalar("SELECT cancelled FROM futures WHERE id = $1")
        .bind(futures.id)
        .fetch_one(&mut *tx)
        .await
        .unwrap();
    assert!(cancelled_flag);

    tx.commit().await.unwrap();
}

#[sqlx::test(migrations = "./migrations")]
async fn price_formation_tie_breaks_toward_earliest_direction(pool: PgPool) {
    let u1 = seed_user(&pool, "u1").await;
    let u2 = seed_user(&pool, "u2").await;
    let mut tx = pool.begin().await.unwrap();
    let usd = asset::create(&mut tx, "USD").await.unwrap();
    ledger::credit(&mut tx, u1, usd.id, dec!(100), HoldingSource::External, None)
        .await
        .unwrap();
    ledger::credit(&mut tx, u2, usd.id, dec!(100), HoldingSource::External, None)
        .await
        .unwrap();

    let (futures, _) = contract::issue(
        &mut tx,
        u1,
        Utc::now() + Duration::days(1),
        usd.id,
        dec!(1),
        "FUTURE",
        dec!(10),
    )
    .await
    .unwrap();

    let ask = order::create_order(
        &mut tx, u1, Some(dec!(20)), usd.id, futures.id, dec!(10), false,
        OrderType::LimitOrder, None,
    )
    .await
    .unwrap();
    let bid = order::create_order(
        &mut tx, u2, Some(dec!(22)), usd.id, futures.id, dec!(10), true,
        OrderType::LimitOrder, None,
    )
    .await
    .unwrap();

    market::place(&mut tx, ask.id).await.unwrap();
    let txn = market::place(&mut tx, bid.id).await.unwrap().unwrap();
    assert_eq!(txn.price, dec!(22));

    tx.commit().await.unwrap();
}

#[sqlx::test(migrations = "./migrations")]
async fn market_ask_with_no_bids_is_auto_cancelled(pool: PgPool) {
    let u1 = seed_user(&pool, "u1").await;
    let mut tx = pool.begin().await.unwrap();
    let usd = asset::create(&mut tx, "USD").await.unwrap();
    ledger::credit(&mut tx, u1, usd.id, dec!(1), HoldingSource::External, None)
        .await
        .unwrap();

    let (futures, _) = contract::issue(
        &mut tx,
        u1,
        Utc::now() + Duration::days(1),
        usd.id,
        dec!(1),
        "FUTURE",
        dec!(10),
    )
    .await
    .unwrap();

    let ask = order::create_order(
        &mut tx, u1, None, usd.id, futures.id, dec!(10), false,
        OrderType::MarketOrder, None,
    )
    .await
    .unwrap();

    let result = market::place(&mut tx, ask.id).await.unwrap();
    assert!(result.is_none());

    let stored = order::load_for_update(&mut tx, ask.id).await.unwrap();
    assert_eq!(stored.state, OrderState::Cancelled);
    assert_eq!(
        ledger::balance(&mut tx, u1, futures.contract_asset_id).await.unwrap(),
        dec!(10)
    );

    tx.commit().await.unwrap();
}

#[sqlx::test(migrations = "./migrations")]
async fn escrow_is_restored_on_cancel(pool: PgPool) {
    let u1 = seed_user(&pool, "u1").await;
    let mut tx = pool.begin().await.unwrap();
    let usd = asset::create(&mut tx, "USD").await.unwrap();
    ledger::credit(&mut tx, u1, usd.id, dec!(50), HoldingSource::External, None)
        .await
        .unwrap();

    let (futures, _) = contract::issue(
        &mut tx,
        u1,
        Utc::now() + Duration::days(1),
        usd.id,
        dec!(1),
        "FUTURE",
        dec!(10),
    )
    .await
    .unwrap();

    let before = ledger::balance(&mut tx, u1, usd.id).await.unwrap();
    let bid = order::create_order(
        &mut tx, u1, Some(dec!(30)), usd.id, futures.id, dec!(5), true,
        OrderType::LimitOrder, None,
    )
    .await
    .unwrap();
    let after_escrow = ledger::balance(&mut tx, u1, usd.id).await.unwrap();
    assert_eq!(before - after_escrow, dec!(30));

    assert!(order::cancel(&mut tx, bid.id).await.unwrap());
    let after_cancel = ledger::balance(&mut tx, u1, usd.id).await.unwrap();
    assert_eq!(after_cancel, before);

    tx.commit().await.unwrap();
}

#[sqlx::test(migrations = "./migrations")]
async fn market_bid_without_price_is_refused(pool: PgPool) {
    let u1 = seed_user(&pool, "u1").await;
    let mut tx = pool.begin().await.unwrap();
    let usd = asset::create(&mut tx, "USD").await.unwrap();
    ledger::credit(&mut tx, u1, usd.id, dec!(1), HoldingSource::External, None)
        .await
        .unwrap();
    let (futures, _) = contract::issue(
        &mut tx,
        u1,
        Utc::now() + Duration::days(1),
        usd.id,
        dec!(1),
        "FUTURE",
        dec!(10),
    )
    .await
    .unwrap();

    let result = order::create_order(
        &mut tx, u1, None, usd.id, futures.id, dec!(1), true,
        OrderType::MarketOrder, None,
    )
    .await;
    assert!(result.is_err());

    tx.rollback().await.unwrap();
}
