//! Order and position records shared between the trade façade and the
//! per-exchange trade adapters.
//!
//! Variant names use `SCREAMING_SNAKE_CASE` to match the string values the
//! exchanges and the wire format use, so we suppress the Rust naming
//! convention lint.
#![allow(non_camel_case_types)]

use serde::{Deserialize, Serialize};

use crate::util;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Buy or sell side of an order or public trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderAction {
    BUY,
    SELL,
}

/// Type of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    LIMIT,
    MARKET,
}

/// Core order lifecycle states.
///
/// Exchange-specific status strings are normalized into this enum by the
/// trade adapters; see the per-adapter mapping tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Created locally, nothing heard from the exchange yet.
    NONE,
    /// Accepted by the exchange.
    SUBMITTED,
    /// Partially filled.
    #[serde(rename = "PARTIAL-FILLED")]
    PARTIAL_FILLED,
    /// Fully filled.
    FILLED,
    /// Canceled.
    CANCELED,
    /// Rejected, expired, or otherwise dead.
    FAILED,
}

impl OrderStatus {
    /// Terminal states remove the order from the open-order map.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::FILLED | Self::CANCELED | Self::FAILED)
    }
}

/// Futures trade direction. Spot orders carry [`TradeType::NONE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeType {
    NONE,
    BUY_OPEN,
    SELL_OPEN,
    BUY_CLOSE,
    SELL_CLOSE,
}

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

/// One order as tracked by a trade adapter.
///
/// Owned by the adapter managing its exchange session; strategies observe
/// clones delivered through `order_update_callback`.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    /// Exchange platform name, e.g. `binance`.
    pub platform: String,
    /// Trading account name.
    pub account: String,
    /// Strategy name the order belongs to.
    pub strategy: String,
    /// Exchange order id.
    pub order_id: String,
    /// Client-assigned order id.
    pub client_order_id: String,
    /// Trading pair in canonical form, e.g. `BTC/USDT`.
    pub symbol: String,
    pub action: OrderAction,
    pub order_type: OrderType,
    /// Order price as the exchange reported it.
    pub price: String,
    /// Total order quantity.
    pub quantity: String,
    /// Unfilled quantity.
    pub remain: f64,
    pub status: OrderStatus,
    /// Average fill price.
    pub avg_price: String,
    pub trade_type: TradeType,
    /// Trading fee charged so far.
    pub fee: String,
    /// Creation time, epoch milliseconds.
    pub ctime: i64,
    /// Last update time, epoch milliseconds.
    pub utime: i64,
}

/// Seed fields for a newly discovered or created order; the rest of the
/// [`Order`] record takes its defaults from here.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub platform: String,
    pub account: String,
    pub strategy: String,
    pub order_id: String,
    pub client_order_id: String,
    pub symbol: String,
    pub action: OrderAction,
    pub order_type: OrderType,
    pub price: String,
    pub quantity: String,
    /// Creation time; `None` means now.
    pub ctime: Option<i64>,
}

impl Order {
    /// Build an order in state [`OrderStatus::NONE`] with `remain`
    /// defaulting to the full quantity.
    pub fn create(new: NewOrder) -> Self {
        let now = util::timestamp_ms();
        let remain = new.quantity.parse::<f64>().unwrap_or(0.0);
        Self {
            platform: new.platform,
            account: new.account,
            strategy: new.strategy,
            order_id: new.order_id,
            client_order_id: new.client_order_id,
            symbol: new.symbol,
            action: new.action,
            order_type: new.order_type,
            price: new.price,
            quantity: new.quantity,
            remain,
            status: OrderStatus::NONE,
            avg_price: "0".to_owned(),
            trade_type: TradeType::NONE,
            fee: "0".to_owned(),
            ctime: new.ctime.unwrap_or(now),
            utime: now,
        }
    }
}

impl std::fmt::Display for Order {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Order[{} {} {:?} {:?} price={} quantity={} remain={} status={:?}]",
            self.platform,
            self.symbol,
            self.action,
            self.order_type,
            self.price,
            self.quantity,
            self.remain,
            self.status,
        )
    }
}

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// Futures position per (platform, account, strategy, symbol).
///
/// Updated only by the owning trade adapter.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Position {
    pub platform: String,
    pub account: String,
    pub strategy: String,
    pub symbol: String,
    pub short_quantity: f64,
    pub short_avg_price: f64,
    pub long_quantity: f64,
    pub long_avg_price: f64,
    /// Liquidation price.
    pub liquid_price: f64,
    /// Last update, epoch milliseconds.
    pub timestamp: i64,
}

impl Position {
    pub fn new(platform: &str, account: &str, strategy: &str, symbol: &str) -> Self {
        Self {
            platform: platform.to_owned(),
            account: account.to_owned(),
            strategy: strategy.to_owned(),
            symbol: symbol.to_owned(),
            ..Self::default()
        }
    }

    /// Replace the position figures. A `timestamp` of `None` means now.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        short_quantity: f64,
        short_avg_price: f64,
        long_quantity: f64,
        long_avg_price: f64,
        liquid_price: f64,
        timestamp: Option<i64>,
    ) {
        self.short_quantity = short_quantity;
        self.short_avg_price = short_avg_price;
        self.long_quantity = long_quantity;
        self.long_avg_price = long_avg_price;
        self.liquid_price = liquid_price;
        self.timestamp = timestamp.unwrap_or_else(util::timestamp_ms);
    }
}
