use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = i64;
pub type AssetId = i64;
pub type HoldingId = i64;
pub type ContractId = i64;
pub type OrderId = i64;
pub type TransactionId = i64;

/// Fixed-point money/volume type. Every NUMERIC column in the schema
/// lands here; floating point is never used for price or volume math.
pub type Amount = rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "holding_source")]
pub enum HoldingSource {
    InternalTrade,
    External,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "order_direction")]
pub enum Direction {
    Bid,
    Ask,
}

impl Direction {
    pub fn reciprocal(self) -> Direction {
        match self {
            Direction::Bid => Direction::Ask,
            Direction::Ask => Direction::Bid,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "order_kind")]
pub enum OrderType {
    MarketOrder,
    LimitOrder,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "order_state")]
pub enum OrderState {
    Created,
    InMarket,
    Executed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Asset {
    pub id: AssetId,
    pub name: Option<String>,
    pub previous_name: Option<String>,
    pub removed_at: Option<DateTime<Utc>>,
}

impl Asset {
    pub fn is_removed(&self) -> bool {
        self.removed_at.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Holding {
    pub id: HoldingId,
    pub user_id: UserId,
    pub asset_id: AssetId,
    pub volume: Amount,
    pub source: HoldingSource,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Futures {
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

impl Futures {
    /// §4.3: a contract may back new orders only while active.
    pub fn can_be_used_in_order(&self) -> bool {
        !self.cancelled && !self.expired && Utc::now() <= self.expires_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Order {
    pub id: OrderId,
    pub created_at: DateTime<Utc>,
    pub user_id: UserId,
    pub price: Option<Amount>,
    pub asset_id: AssetId,
    pub volume: Amount,
    pub contract_id: ContractId,
    pub expires_in: Option<sqlx::postgres::types::PgInterval>,
    pub direction: Direction,
    pub order_type: OrderType,
    pub state: OrderState,
    pub executed_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Natural expiry semantics (see DESIGN.md open-question decision):
    /// an order has expired once `now >= created_at + expires_in`.
    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        let Some(interval) = &self.expires_in else {
            return false;
        };
        let micros = interval.microseconds
            + (interval.days as i64) * 86_400_000_000
            + (interval.months as i64) * 30 * 86_400_000_000;
        let deadline = self.created_at + chrono::Duration::microseconds(micros);
        now >= deadline
    }

    pub fn price_to_volume(&self) -> Option<Amount> {
        self.price.map(|p| p / self.volume)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Transaction {
    pub id: TransactionId,
    pub executed_at: Option<DateTime<Utc>>,
    pub contract_id: ContractId,
    pub ask_order_id: OrderId,
    pub bid_order_id: OrderId,
    pub price: Amount,
    pub asset_id: AssetId,
    pub volume: Amount,
}
