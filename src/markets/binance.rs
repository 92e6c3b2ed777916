//! Binance spot market adapter.
//!
//! Binance carries the subscription in the combined-stream URL
//! (`/stream?streams=btcusdt@depth20/btcusdt@trade/...`), so there is no
//! subscribe frame and no keepalive to send. Depth messages are fixed-depth
//! snapshots published verbatim (truncated to the configured length); no
//! book state is kept.
//!
//! Reference: <https://github.com/binance/binance-spot-api-docs/blob/master/web-socket-streams.md>

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::constants::BINANCE_WSS;
use crate::error::{QuantError, Result};
use crate::event::{Event, EventBus};
use crate::market::{BookLevel, Kline, KlineKind, Orderbook, Trade};
use crate::order::OrderAction;
use crate::util;
use crate::ws::{WsClient, WsHandler};

use super::{MarketAdapter, MarketDeps, MarketParams};

/// Binance market feed session.
pub struct BinanceMarket {
    platform: String,
    orderbook_length: usize,
    /// Wire channel name → canonical symbol, e.g. `btcusdt@trade` → `BTC/USDT`.
    channel_to_symbol: HashMap<String, String>,
    ws: WsClient,
    bus: EventBus,
}

impl BinanceMarket {
    /// Build the combined-stream URL and open the connection.
    pub fn new(params: MarketParams, deps: &MarketDeps) -> Result<Arc<Self>> {
        let wss = params.wss.clone().unwrap_or_else(|| BINANCE_WSS.to_owned());

        let mut channel_to_symbol = HashMap::new();
        let mut streams = Vec::new();
        for channel in &params.channels {
            let suffix = match channel.as_str() {
                "kline" => "kline_1m",
                "orderbook" => "depth20",
                "trade" => "trade",
                other => {
                    tracing::error!(channel = other, "channel error");
                    continue;
                }
            };
            for symbol in &params.symbols {
                let stream = format!("{}@{}", symbol.replace('/', "").to_lowercase(), suffix);
                channel_to_symbol.insert(stream.clone(), symbol.clone());
                streams.push(stream);
            }
        }
        if streams.is_empty() {
            return Err(QuantError::InvalidArgument("no valid channels configured".into()));
        }

        let url = format!("{}/stream?streams={}", wss, streams.join("/"));
        let adapter = Arc::new(Self {
            platform: params.platform,
            orderbook_length: params.orderbook_length,
            channel_to_symbol,
            ws: WsClient::new(url),
            bus: deps.bus.clone(),
        });

        let handler: Arc<dyn WsHandler> = adapter.clone();
        adapter.ws.start(Arc::downgrade(&handler), &deps.heartbeat);
        Ok(adapter)
    }

    async fn process(&self, msg: Value) {
        let Some(channel) = msg.get("stream").and_then(Value::as_str) else {
            return;
        };
        let Some(symbol) = self.channel_to_symbol.get(channel) else {
            tracing::warn!(channel, "unknown channel");
            return;
        };
        let Some(data) = msg.get("data") else {
            return;
        };

        let event_type = data.get("e").and_then(Value::as_str);
        if event_type == Some("kline") {
            self.process_kline(symbol, data).await;
        } else if channel.ends_with("depth20") {
            self.process_orderbook(symbol, data).await;
        } else if event_type == Some("trade") {
            self.process_trade(symbol, data).await;
        }
    }

    async fn process_kline(&self, symbol: &str, data: &Value) {
        let Some(k) = data.get("k") else { return };
        let field = |key: &str| k.get(key).and_then(Value::as_str).unwrap_or("0").to_owned();
        let kline = Kline {
            platform: self.platform.clone(),
            symbol: symbol.to_owned(),
            open: field("o"),
            high: field("h"),
            low: field("l"),
            close: field("c"),
            volume: field("q"),
            timestamp: k.get("t").and_then(Value::as_i64).unwrap_or_default(),
            kline_type: KlineKind::Kline,
        };
        self.publish(Event::kline(&kline, self.bus.server_id())).await;
        tracing::debug!(symbol, ?kline, "kline");
    }

    /// Fixed-depth snapshot: truncate and publish verbatim.
    async fn process_orderbook(&self, symbol: &str, data: &Value) {
        let orderbook = self.parse_orderbook(symbol, data);
        self.publish(Event::orderbook(&orderbook, self.bus.server_id())).await;
        tracing::debug!(symbol, "orderbook");
    }

    fn parse_orderbook(&self, symbol: &str, data: &Value) -> Orderbook {
        let levels = |side: &str| -> Vec<BookLevel> {
            data.get(side)
                .and_then(Value::as_array)
                .map(|rows| {
                    rows.iter()
                        .take(self.orderbook_length)
                        .filter_map(|row| {
                            let price = row.get(0)?.as_str()?.to_owned();
                            let quantity = row.get(1)?.as_str()?.to_owned();
                            Some([price, quantity])
                        })
                        .collect()
                })
                .unwrap_or_default()
        };
        Orderbook {
            platform: self.platform.clone(),
            symbol: symbol.to_owned(),
            asks: levels("asks"),
            bids: levels("bids"),
            timestamp: util::timestamp_ms(),
        }
    }

    async fn process_trade(&self, symbol: &str, data: &Value) {
        // `m` marks the buyer as the maker, i.e. a sell-side taker.
        let action = if data.get("m").and_then(Value::as_bool).unwrap_or(false) {
            OrderAction::SELL
        } else {
            OrderAction::BUY
        };
        let trade = Trade {
            platform: self.platform.clone(),
            symbol: symbol.to_owned(),
            action,
            price: data.get("p").and_then(Value::as_str).unwrap_or("0").to_owned(),
            quantity: data.get("q").and_then(Value::as_str).unwrap_or("0").to_owned(),
            timestamp: data.get("T").and_then(Value::as_i64).unwrap_or_default(),
        };
        self.publish(Event::trade(&trade, self.bus.server_id())).await;
        tracing::debug!(symbol, ?trade, "trade");
    }

    async fn publish(&self, event: Event) {
        if let Err(e) = self.bus.publish(&event).await {
            tracing::error!(error = %e, routing_key = %event.routing_key, "publish error");
        }
    }
}

#[async_trait]
impl WsHandler for BinanceMarket {
    async fn on_text(&self, value: Value) {
        self.process(value).await;
    }
}

impl MarketAdapter for BinanceMarket {
    fn platform(&self) -> &str {
        &self.platform
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn adapter() -> Arc<BinanceMarket> {
        let mut channel_to_symbol = HashMap::new();
        channel_to_symbol.insert("btcusdt@depth20".to_owned(), "BTC/USDT".to_owned());
        channel_to_symbol.insert("btcusdt@trade".to_owned(), "BTC/USDT".to_owned());
        Arc::new(BinanceMarket {
            platform: "binance".to_owned(),
            orderbook_length: 2,
            channel_to_symbol,
            ws: WsClient::new("wss://example.invalid/stream"),
            bus: EventBus::disconnected("srv-test"),
        })
    }

    #[tokio::test]
    async fn stream_url_covers_channels_times_symbols() {
        let deps = MarketDeps {
            heartbeat: crate::tasks::Heartbeat::new(0),
            bus: EventBus::disconnected("srv-test"),
        };
        let params = MarketParams {
            platform: "binance".to_owned(),
            wss: None,
            symbols: vec!["BTC/USDT".to_owned(), "ETH/USDT".to_owned()],
            channels: vec!["orderbook".to_owned(), "trade".to_owned()],
            orderbook_length: 10,
        };
        let adapter = BinanceMarket::new(params, &deps).unwrap();
        let url = adapter.ws.url();
        assert!(url.starts_with("wss://stream.binance.com:9443/stream?streams="));
        for stream in [
            "btcusdt@depth20",
            "ethusdt@depth20",
            "btcusdt@trade",
            "ethusdt@trade",
        ] {
            assert!(url.contains(stream), "missing {stream} in {url}");
        }
        assert_eq!(adapter.channel_to_symbol.len(), 4);
    }

    #[test]
    fn channels_without_any_valid_entry_are_rejected() {
        let deps = MarketDeps {
            heartbeat: crate::tasks::Heartbeat::new(0),
            bus: EventBus::disconnected("srv-test"),
        };
        let params = MarketParams {
            platform: "binance".to_owned(),
            wss: None,
            symbols: vec!["BTC/USDT".to_owned()],
            channels: vec!["ticker".to_owned()],
            orderbook_length: 10,
        };
        assert!(BinanceMarket::new(params, &deps).is_err());
    }

    #[test]
    fn depth_snapshot_is_truncated_to_configured_length() {
        let adapter = adapter();
        let data = json!({
            "asks": [["100.1", "1"], ["100.2", "2"], ["100.3", "3"]],
            "bids": [["100.0", "1"], ["99.9", "2"], ["99.8", "3"]],
        });
        let orderbook = adapter.parse_orderbook("BTC/USDT", &data);
        assert_eq!(
            orderbook.asks,
            vec![
                ["100.1".to_owned(), "1".to_owned()],
                ["100.2".to_owned(), "2".to_owned()],
            ]
        );
        assert_eq!(
            orderbook.bids,
            vec![
                ["100.0".to_owned(), "1".to_owned()],
                ["99.9".to_owned(), "2".to_owned()],
            ]
        );
        assert!(orderbook.timestamp > 0);
    }

    #[tokio::test]
    async fn unknown_stream_is_dropped() {
        let adapter = adapter();
        let msg = json!({"stream": "ethusdt@trade", "data": {"e": "trade"}});
        adapter.process(msg).await;
    }
}
