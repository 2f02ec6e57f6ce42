use chrono::{DateTime, Utc};
use engine::types::{Amount, AssetId, ContractId, Direction, OrderId, OrderType, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct AdmitOrderReq {
    pub user_id: UserId,
    pub price: Option<Amount>,
    pub price_asset_id: AssetId,
    pub contract_id: ContractId,
    pub volume: Amount,
    pub is_bid: bool,
    pub order_type: OrderType,
    pub expires_in_secs: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct OrderResp {
    pub id: OrderId,
    pub created_at: DateTime<Utc>,
    pub user_id: UserId,
    pub price: Option<Amount>,
    pub asset_id: AssetId,
    pub volume: Amount,
    pub contract_id: ContractId,
    pub direction: Direction,
    pub order_type: OrderType,
    pub state: String,
    pub executed_at: Option<DateTime<Utc>>,
}

impl From<engine::types::Order> for OrderResp {
    fn from(o: engine::types::Order) -> Self {
        OrderResp {
            id: o.id,
            created_at: o.created_at,
            user_id: o.user_id,
            price: o.price,
            asset_id: o.asset_id,
            volume: o.volume,
            contract_id: o.contract_id,
            direction: o.direction,
            order_type: o.order_type,
            state: format!("{:?}", o.state),
            executed_at: o.executed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionResp {
    pub id: engine::types::TransactionId,
    pub executed_at: Option<DateTime<Utc>>,
    pub contract_id: ContractId,
    pub ask_order_id: OrderId,
    pub bid_order_id: OrderId,
    pub price: Amount,
    pub asset_id: AssetId,
    pub volume: Amount,
}

impl From<engine::types::Transaction> for TransactionResp {
    fn from(t: engine::types::Transaction) -> Self {
        TransactionResp {
            id: t.id,
            executed_at: t.executed_at,
            contract_id: t.contract_id,
            ask_order_id: t.ask_order_id,
            bid_order_id: t.bid_order_id,
            price: t.price,
            asset_id: t.asset_id,
            volume: t.volume,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PlaceOrderResp {
    pub order: OrderResp,
    pub transaction: Option<TransactionResp>,
}

#[derive(Debug, Deserialize)]
pub struct IssueContractReq {
    pub issuer_id: UserId,
    pub expires_at: DateTime<Utc>,
    pub underlying_asset_id: AssetId,
    pub collateral_volume: Amount,
    pub contract_asset_name: String,
    pub mint_volume: Amount,
}

#[derive(Debug, Serialize)]
pub struct ContractResp {
    pub id: ContractId,
    pub created_at: DateTime<Utc>,
    pub issuer_id: UserId,
    pub expires_at: DateTime<Utc>,
    pub volume: Amount,
    pub asset_id: AssetId,
    pub contract_asset_id: AssetId,
    pub cancelled: bool,
    pub expired: bool,
}

impl From<engine::types::Futures> for ContractResp {
    fn from(f: engine::types::Futures) -> Self {
        ContractResp {
            id: f.id,
            created_at: f.created_at,
            issuer_id: f.issuer_id,
            expires_at: f.expires_at,
            volume: f.volume,
            asset_id: f.asset_id,
            contract_asset_id: f.contract_asset_id,
            cancelled: f.cancelled,
            expired: f.expired,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BoolResp {
    pub ok: bool,
}

#[derive(Debug, Deserialize)]
pub struct OrderFilter {
    pub contract_id: Option<ContractId>,
    pub user_id: Option<UserId>,
    pub state: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InstrumentView {
    pub contract_id: ContractId,
    pub last_24h_volume: Amount,
    pub last_24h_avg_price: Option<Amount>,
    pub open_bids: i64,
    pub open_asks: i64,
    pub latest_executed_price: Option<Amount>,
    pub latest_executed_volume: Option<Amount>,
    pub best_bid: Option<Amount>,
    pub best_ask: Option<Amount>,
}
