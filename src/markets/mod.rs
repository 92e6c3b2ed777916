//! Per-exchange market adapters.
//!
//! A market adapter owns one outbound WebSocket, normalizes the exchange's
//! feed into [`Orderbook`](crate::market::Orderbook) /
//! [`Trade`](crate::market::Trade) / [`Kline`](crate::market::Kline), and
//! publishes the results on the event bus.

pub mod binance;
pub mod okex;

use std::sync::Arc;

use crate::config::MarketConfig;
use crate::constants::{self, DEFAULT_ORDERBOOK_LENGTH};
use crate::error::{QuantError, Result};
use crate::event::EventBus;
use crate::tasks::Heartbeat;

/// Construction parameters common to every market adapter.
#[derive(Debug, Clone)]
pub struct MarketParams {
    pub platform: String,
    /// Exchange WebSocket host override.
    pub wss: Option<String>,
    /// Symbols in canonical `BASE/QUOTE` form.
    pub symbols: Vec<String>,
    /// Channels to subscribe: `orderbook` / `trade` / `kline`.
    pub channels: Vec<String>,
    /// Levels per side in published order book events.
    pub orderbook_length: usize,
}

impl MarketParams {
    /// Build parameters from one `MARKETS` config entry.
    pub fn from_config(platform: &str, config: &MarketConfig) -> Self {
        Self {
            platform: platform.to_owned(),
            wss: config.wss.clone(),
            symbols: config.symbols.clone(),
            channels: config.channels.clone(),
            orderbook_length: config.orderbook_length.unwrap_or(DEFAULT_ORDERBOOK_LENGTH),
        }
    }
}

/// Shared runtime services a market adapter needs.
#[derive(Clone)]
pub struct MarketDeps {
    pub heartbeat: Arc<Heartbeat>,
    pub bus: EventBus,
}

/// Handle keeping a running market adapter alive.
pub trait MarketAdapter: Send + Sync {
    /// The platform this adapter feeds from.
    fn platform(&self) -> &str;
}

/// Start the market adapter for `params.platform`.
pub fn spawn(params: MarketParams, deps: &MarketDeps) -> Result<Arc<dyn MarketAdapter>> {
    match params.platform.as_str() {
        constants::BINANCE => {
            let adapter = binance::BinanceMarket::new(params, deps)?;
            Ok(adapter as Arc<dyn MarketAdapter>)
        }
        constants::OKEX => {
            let adapter = okex::OkexMarket::new(params, deps)?;
            Ok(adapter as Arc<dyn MarketAdapter>)
        }
        other => Err(QuantError::InvalidArgument(format!("market platform error: {other}"))),
    }
}
