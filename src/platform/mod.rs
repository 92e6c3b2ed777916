//! Per-exchange trade adapters.
//!
//! Each sub-module pairs a REST client with an authenticated user-data
//! WebSocket session and implements [`TradeAdapter`](crate::trade::TradeAdapter).

pub mod binance;
pub mod okex;

use std::sync::Arc;

use crate::constants;
use crate::error::{QuantError, Result};
use crate::trade::{TradeAdapter, TradeCallbacks, TradeDeps, TradeParams};

/// Build the trade adapter for `params.platform`.
pub async fn build(
    params: TradeParams,
    callbacks: TradeCallbacks,
    deps: &TradeDeps,
) -> Result<Arc<dyn TradeAdapter>> {
    match params.platform.as_str() {
        constants::BINANCE => {
            let adapter = binance::BinanceTrade::new(params, callbacks, deps).await?;
            Ok(adapter as Arc<dyn TradeAdapter>)
        }
        constants::OKEX => {
            let adapter = okex::OkexTrade::new(params, callbacks, deps)?;
            Ok(adapter as Arc<dyn TradeAdapter>)
        }
        other => Err(QuantError::InvalidArgument(format!("platform error: {other}"))),
    }
}
