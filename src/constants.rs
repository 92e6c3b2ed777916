//! Constants shared across the runtime.
//!
//! Contains platform identifiers, default exchange endpoints, broker
//! exchange names, and the periodic-task intervals used by the adapters.
//! These are used internally but are also exported for advanced usage.

// ---------------------------------------------------------------------------
// Platform names
// ---------------------------------------------------------------------------

/// Binance spot. <https://www.binance.com>
pub const BINANCE: &str = "binance";

/// OKEx spot. <https://www.okex.com>
pub const OKEX: &str = "okex";

// ---------------------------------------------------------------------------
// Default endpoints
// ---------------------------------------------------------------------------

/// Default Binance REST host.
pub const BINANCE_API_HOST: &str = "https://api.binance.com";

/// Default Binance WebSocket host (combined streams + user data).
pub const BINANCE_WSS: &str = "wss://stream.binance.com:9443";

/// Default OKEx REST host.
pub const OKEX_API_HOST: &str = "https://www.okex.com";

/// Default OKEx WebSocket host; the v3 path is appended per connection.
pub const OKEX_WSS: &str = "wss://real.okex.com:8443";

// ---------------------------------------------------------------------------
// Broker topology
// ---------------------------------------------------------------------------

/// Topic exchange carrying order book snapshots.
pub const EXCHANGE_ORDERBOOK: &str = "Orderbook";

/// Topic exchange carrying public trades.
pub const EXCHANGE_TRADE: &str = "Trade";

/// Topic exchange carrying candlesticks.
pub const EXCHANGE_KLINE: &str = "Kline";

/// All pre-declared topic exchanges.
pub const EXCHANGES: [&str; 3] = [EXCHANGE_ORDERBOOK, EXCHANGE_TRADE, EXCHANGE_KLINE];

// ---------------------------------------------------------------------------
// Intervals
// ---------------------------------------------------------------------------

/// Periodic-task intervals, in heartbeat ticks (seconds).
pub mod intervals {
    /// WebSocket health-check interval.
    pub const WS_CHECK_SECS: u64 = 10;

    /// Event bus channel health-check interval.
    pub const BUS_CHECK_SECS: u64 = 10;

    /// Delay before the first bind-and-consume pass, letting other
    /// subsystems register their subscriptions after boot.
    pub const BUS_FIRST_BIND_DELAY_SECS: u64 = 5;

    /// OKEx literal ping interval (market and trade sessions).
    pub const OKEX_PING_SECS: u64 = 5;

    /// Binance user-data WebSocket protocol ping interval.
    pub const BINANCE_PING_SECS: u64 = 10;

    /// Binance listen-key keepalive interval (30 minutes).
    pub const LISTEN_KEY_REFRESH_SECS: u64 = 60 * 30;
}

/// Default number of levels per side published in an order book event.
pub const DEFAULT_ORDERBOOK_LENGTH: usize = 10;

/// Default prefetch count for single-subscriber event queues.
pub const DEFAULT_PREFETCH_COUNT: u16 = 1;
