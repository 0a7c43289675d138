use async_trait::async_trait;

use crate::models::{Kline, OrderSide, PositionSnapshot};
use crate::Result;

/// One leverage band offered for a symbol
#[derive(Debug, Clone, PartialEq)]
pub struct LeverageTier {
    pub bracket: u32,
    pub initial_leverage: u32,
    pub notional_cap: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderKind {
    Market,
    /// Trailing stop that arms once price reaches `activation_price`
    TrailingStop {
        activation_price: f64,
        callback_rate: f64,
    },
    /// Stop-limit: a limit order at `limit_price` placed once `stop_price` trades
    StopLimit { stop_price: f64, limit_price: f64 },
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Market => "MARKET",
            OrderKind::TrailingStop { .. } => "TRAILING_STOP_MARKET",
            OrderKind::StopLimit { .. } => "STOP",
        }
    }
}

/// Fully specified order; prices and quantity are already rounded
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub quantity: f64,
    pub reduce_only: bool,
    /// Client-assigned id, lets a retry check whether the order already exists
    pub client_order_id: String,
}

/// Exchange acknowledgement for a submitted or looked-up order
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub order_id: i64,
    pub client_order_id: String,
    pub status: String,
}

/// The slice of a margin exchange's trading API the engine depends on.
///
/// One instance is shared by every symbol loop, so implementations own any
/// request throttling.
#[async_trait]
pub trait FuturesExchange: Send + Sync {
    /// Most recent klines, oldest first
    async fn klines(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Kline>>;

    /// Current position for the symbol (zero amount when flat)
    async fn position(&self, symbol: &str) -> Result<PositionSnapshot>;

    /// Free balance of a margin asset
    async fn free_balance(&self, asset: &str) -> Result<f64>;

    async fn leverage_tiers(&self, symbol: &str) -> Result<Vec<LeverageTier>>;

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()>;

    /// Submit an order. Never retried blindly by callers.
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck>;

    /// Look an order up by client id; None when the exchange has no such order
    async fn find_order(&self, symbol: &str, client_order_id: &str) -> Result<Option<OrderAck>>;
}
