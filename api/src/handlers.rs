use axum::extract::{Path, Query, State};
use axum::Json;
use engine::types::{Amount, ContractId, OrderId};
use engine::{market, order};
use tracing::info;

use crate::dto::{
    AdmitOrderReq, BoolResp, ContractResp, InstrumentView, IssueContractReq, OrderFilter,
    OrderResp, PlaceOrderResp,
};
use crate::error::ApiError;
use crate::state::AppState;

pub async fn admit_order(
    State(state): State<AppState>,
    Json(req): Json<AdmitOrderReq>,
) -> Result<Json<OrderResp>, ApiError> {
    let mut tx = state.pool.begin().await?;
    let order = order::create_order(
        &mut tx,
        req.user_id,
        req.price,
        req.price_asset_id,
        req.contract_id,
        req.volume,
        req.is_bid,
        req.order_type,
        req.expires_in_secs,
    )
    .await?;
    tx.commit().await?;
    info!(order_id = order.id, "admitted order via HTTP");
    Ok(Json(order.into()))
}

pub async fn place_order(
    State(state): State<AppState>,
    Path(order_id): Path<OrderId>,
) -> Result<Json<PlaceOrderResp>, ApiError> {
    let mut tx = state.pool.begin().await?;
    let transaction = market::place(&mut tx, order_id).await?;
    let refreshed = order::load_for_update(&mut tx, order_id).await?;
    tx.commit().await?;
    Ok(Json(PlaceOrderResp {
        order: refreshed.into(),
        transaction: transaction.map(Into::into),
    }))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Path(order_id): Path<OrderId>,
) -> Result<Json<BoolResp>, ApiError> {
    let mut tx = state.pool.begin().await?;
    let ok = order::cancel(&mut tx, order_id).await?;
    tx.commit().await?;
    Ok(Json(BoolResp { ok }))
}

pub async fn issue_contract(
    State(state): State<AppState>,
    Json(req): Json<IssueContractReq>,
) -> Result<Json<ContractResp>, ApiError> {
    let mut tx = state.pool.begin().await?;
    let (futures, _contract_asset) = engine::contract::issue(
        &mut tx,
        req.issuer_id,
        req.expires_at,
        req.underlying_asset_id,
        req.collateral_volume,
        &req.contract_asset_name,
        req.mint_volume,
    )
    .await?;
    tx.commit().await?;
    Ok(Json(futures.into()))
}

pub async fn cancel_contract(
    State(state): State<AppState>,
    Path(contract_id): Path<ContractId>,
) -> Result<Json<BoolResp>, ApiError> {
    let mut tx = state.pool.begin().await?;
    let ok = engine::contract::cancel(&mut tx, contract_id).await?;
    tx.commit().await?;
    Ok(Json(BoolResp { ok }))
}

pub async fn expire_contract(
    State(state): State<AppState>,
    Path(contract_id): Path<ContractId>,
) -> Result<Json<BoolResp>, ApiError> {
    let mut tx = state.pool.begin().await?;
    engine::contract::expire(&mut tx, contract_id).await?;
    tx.commit().await?;
    Ok(Json(BoolResp { ok: true }))
}

pub async fn query_orders(
    State(state): State<AppState>,
    Query(filter): Query<OrderFilter>,
) -> Result<Json<Vec<OrderResp>>, ApiError> {
    // Every clause binds unconditionally so the three placeholders stay
    // aligned regardless of which filters the caller supplied.
    let orders = sqlx::query_as::<_, engine::types::Order>(
        "SELECT * FROM orders
         WHERE ($1::bigint IS NULL OR contract_id = $1)
           AND ($2::bigint IS NULL OR user_id = $2)
           AND ($3::order_state IS NULL OR state = $3)
         ORDER BY id DESC LIMIT 500",
    )
    .bind(filter.contract_id)
    .bind(filter.user_id)
    .bind(filter.state.and_then(|s| match s.as_str() {
        "Created" => Some(engine::types::OrderState::Created),
        "InMarket" => Some(engine::types::OrderState::InMarket),
        "Executed" => Some(engine::types::OrderState::Executed),
        "Cancelled" => Some(engine::types::OrderState::Cancelled),
        _ => None,
    }))
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(orders.into_iter().map(Into::into).collect()))
}

pub async fn query_instruments(
    State(state): State<AppState>,
) -> Result<Json<Vec<InstrumentView>>, ApiError> {
    let contract_ids: Vec<ContractId> =
        sqlx::query_scalar("SELECT id FROM contracts ORDER BY id")
            .fetch_all(&state.pool)
            .await?;

    let mut views = Vec::with_capacity(contract_ids.len());
    for contract_id in contract_ids {
        let (last_24h_volume, last_24h_avg_price): (Option<Amount>, Option<Amount>) =
            sqlx::query_as(
                "SELECT SUM(volume), AVG(price) FROM transactions
                 WHERE contract_id = $1 AND executed_at >= now() - INTERVAL '24 hours'",
            )
            .bind(contract_id)
            .fetch_one(&state.pool)
            .await?;

        let open_bids: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE contract_id = $1 AND direction = 'Bid' AND state IN ('Created', 'InMarket')",
        )
        .bind(contract_id)
        .fetch_one(&state.pool)
        .await?;
        let open_asks: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE contract_id = $1 AND direction = 'Ask' AND state IN ('Created', 'InMarket')",
        )
        .bind(contract_id)
        .fetch_one(&state.pool)
        .await?;

        let latest: Option<(Amount, Amount)> = sqlx::query_as(
            "SELECT price, volume FROM transactions
             WHERE contract_id = $1 AND executed_at IS NOT NULL
             ORDER BY executed_at DESC LIMIT 1",
        )
        .bind(contract_id)
        .fetch_optional(&state.pool)
        .await?;

        let best_bid: Option<Amount> = sqlx::query_scalar(
            "SELECT price FROM orders WHERE contract_id = $1 AND direction = 'Bid' AND state IN ('Created','InMarket') AND price IS NOT NULL ORDER BY price DESC LIMIT 1",
        )
        .bind(contract_id)
        .fetch_optional(&state.pool)
        .await?;
        let best_ask: Option<Amount> = sqlx::query_scalar(
            "SELECT price FROM orders WHERE contract_id = $1 AND direction = 'Ask' AND state IN ('Created','InMarket') AND price IS NOT NULL ORDER BY price ASC LIMIT 1",
        )
        .bind(contract_id)
        .fetch_optional(&state.pool)
        .await?;

        views.push(InstrumentView {
            contract_id,
            last_24h_volume: last_24h_volume.unwrap_or(Amount::ZERO),
            last_24h_avg_price,
            open_bids,
            open_asks,
            latest_executed_price: latest.as_ref().map(|(p, _)| *p),
            latest_executed_volume: latest.as_ref().map(|(_, v)| *v),
            best_bid,
            best_ask,
        });
    }

    Ok(Json(views))
}
