//! OKEx spot market adapter.
//!
//! The v3 feed sends raw-deflate binary frames. One subscribe frame covers
//! the cross product of channels and symbols; a literal `"ping"` keepalive
//! goes out every five seconds and `"pong"` replies are consumed silently.
//!
//! Depth data arrives as a full snapshot (`action: "partial"`) followed by
//! deltas (`action: "update"`). The adapter maintains an in-memory book per
//! symbol and republishes the truncated sorted view after every applied
//! delta. Book levels are keyed by fixed-point price (1e-8 scale) so level
//! identity never depends on float equality.
//!
//! Reference: <https://www.okex.com/docs/en/#spot_ws-depth>

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::constants::{OKEX_WSS, intervals::OKEX_PING_SECS};
use crate::error::{QuantError, Result};
use crate::event::{Event, EventBus};
use crate::locker;
use crate::market::{BookLevel, Kline, KlineKind, Orderbook, Trade};
use crate::order::OrderAction;
use crate::util;
use crate::ws::{WsClient, WsHandler};

use super::{MarketAdapter, MarketDeps, MarketParams};

/// Fixed-point price scale: eight decimal places.
const PRICE_SCALE: f64 = 100_000_000.0;

fn price_key(price: &str) -> Option<u64> {
    let value: f64 = price.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some((value * PRICE_SCALE).round() as u64)
}

fn format_price(key: u64) -> String {
    format!("{}.{:08}", key / PRICE_SCALE as u64, key % PRICE_SCALE as u64)
}

fn format_quantity(quantity: f64) -> String {
    format!("{quantity:.8}")
}

// ---------------------------------------------------------------------------
// Book state
// ---------------------------------------------------------------------------

/// In-memory order book for one symbol.
struct Book {
    asks: BTreeMap<u64, f64>,
    bids: BTreeMap<u64, f64>,
    timestamp: i64,
}

impl Book {
    fn new(timestamp: i64) -> Self {
        Self {
            asks: BTreeMap::new(),
            bids: BTreeMap::new(),
            timestamp,
        }
    }

    /// Seed one side from snapshot rows (`[[price, quantity, ...], ...]`).
    fn seed_side(side: &mut BTreeMap<u64, f64>, rows: &[Value]) {
        for row in rows {
            let (Some(price), Some(quantity)) = (level_price(row), level_quantity(row)) else {
                continue;
            };
            side.insert(price, quantity);
        }
    }

    fn seed(rows_asks: &[Value], rows_bids: &[Value], timestamp: i64) -> Self {
        let mut book = Self::new(timestamp);
        Self::seed_side(&mut book.asks, rows_asks);
        Self::seed_side(&mut book.bids, rows_bids);
        book
    }

    /// Apply delta rows: zero quantity removes a level, non-zero replaces.
    fn apply(&mut self, rows_asks: &[Value], rows_bids: &[Value], timestamp: i64) {
        self.timestamp = timestamp;
        for (side, rows) in [(&mut self.asks, rows_asks), (&mut self.bids, rows_bids)] {
            for row in rows {
                let (Some(price), Some(quantity)) = (level_price(row), level_quantity(row)) else {
                    continue;
                };
                if quantity == 0.0 {
                    side.remove(&price);
                } else {
                    side.insert(price, quantity);
                }
            }
        }
    }

    /// Truncated sorted view: top `depth` asks ascending, bids descending.
    /// Returns `None` (with a warning) for an empty or crossed book.
    fn top(&self, symbol: &str, depth: usize) -> Option<(Vec<BookLevel>, Vec<BookLevel>)> {
        let (Some(best_ask), Some(best_bid)) =
            (self.asks.keys().next(), self.bids.keys().next_back())
        else {
            tracing::warn!(symbol, "one-sided order book, dropping");
            return None;
        };
        if best_ask <= best_bid {
            tracing::warn!(
                symbol,
                ask1 = %format_price(*best_ask),
                bid1 = %format_price(*best_bid),
                "crossed order book, dropping"
            );
            return None;
        }

        let asks = self
            .asks
            .iter()
            .take(depth)
            .map(|(price, quantity)| [format_price(*price), format_quantity(*quantity)])
            .collect();
        let bids = self
            .bids
            .iter()
            .rev()
            .take(depth)
            .map(|(price, quantity)| [format_price(*price), format_quantity(*quantity)])
            .collect();
        Some((asks, bids))
    }
}

fn level_price(row: &Value) -> Option<u64> {
    price_key(row.get(0)?.as_str()?)
}

fn level_quantity(row: &Value) -> Option<f64> {
    row.get(1)?.as_str()?.parse().ok()
}

fn rows<'a>(data: &'a Value, side: &str) -> &'a [Value] {
    data.get(side).and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// OKEx market feed session.
pub struct OkexMarket {
    platform: String,
    symbols: Vec<String>,
    channels: Vec<String>,
    orderbook_length: usize,
    books: Mutex<HashMap<String, Book>>,
    ws: WsClient,
    bus: EventBus,
}

impl OkexMarket {
    /// Open the connection and register the keepalive loop.
    pub fn new(params: MarketParams, deps: &MarketDeps) -> Result<Arc<Self>> {
        if params.symbols.is_empty() {
            return Err(QuantError::InvalidArgument("no symbols configured".into()));
        }
        let wss = params.wss.clone().unwrap_or_else(|| OKEX_WSS.to_owned());

        let mut symbols = params.symbols.clone();
        symbols.sort_unstable();
        symbols.dedup();

        let adapter = Arc::new(Self {
            platform: params.platform,
            symbols,
            channels: params.channels,
            orderbook_length: params.orderbook_length,
            books: Mutex::new(HashMap::new()),
            ws: WsClient::new(format!("{wss}/ws/v3")),
            bus: deps.bus.clone(),
        });

        let handler: Arc<dyn WsHandler> = adapter.clone();
        adapter.ws.start(Arc::downgrade(&handler), &deps.heartbeat);

        let pinger = Arc::downgrade(&adapter);
        deps.heartbeat.register(OKEX_PING_SECS, move |_, _| {
            let pinger = pinger.clone();
            async move {
                if let Some(adapter) = pinger.upgrade() {
                    let _ = adapter.ws.send_text("ping").await;
                }
            }
        });

        Ok(adapter)
    }

    /// Subscribe frame arguments: channels × symbols.
    fn subscribe_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for channel in &self.channels {
            let prefix = match channel.as_str() {
                "orderbook" => "spot/depth",
                "trade" => "spot/trade",
                "kline" => "spot/candle60s",
                other => {
                    tracing::error!(channel = other, "channel error");
                    continue;
                }
            };
            for symbol in &self.symbols {
                args.push(format!("{prefix}:{}", symbol.replace('/', "-")));
            }
        }
        args
    }

    /// `BTC-USDT` → `BTC/USDT`, filtered against the configured symbols.
    fn symbol_of(&self, data: &Value) -> Option<String> {
        let symbol = data.get("instrument_id")?.as_str()?.replace('-', "/");
        self.symbols.contains(&symbol).then_some(symbol)
    }

    async fn process(&self, msg: Value) {
        match msg.get("table").and_then(Value::as_str) {
            Some("spot/depth") => {
                let action = msg.get("action").and_then(Value::as_str);
                let entries = msg.get("data").and_then(Value::as_array).cloned().unwrap_or_default();
                match action {
                    Some("partial") => {
                        for data in &entries {
                            self.process_snapshot(data).await;
                        }
                    }
                    Some("update") => {
                        for data in &entries {
                            self.process_delta(data).await;
                        }
                    }
                    _ => tracing::warn!(payload = %msg, "unhandled depth message"),
                }
            }
            Some("spot/trade") => {
                for data in msg.get("data").and_then(Value::as_array).into_iter().flatten() {
                    self.process_trade(data).await;
                }
            }
            Some("spot/candle60s") => {
                for data in msg.get("data").and_then(Value::as_array).into_iter().flatten() {
                    self.process_kline(data).await;
                }
            }
            _ => {}
        }
    }

    /// Replace the symbol's book with a fresh snapshot.
    async fn process_snapshot(&self, data: &Value) {
        let Some(symbol) = self.symbol_of(data) else { return };
        let timestamp = self.data_timestamp(data);
        locker::run(&format!("okex.market.book.{symbol}"), true, async {
            let book = Book::seed(rows(data, "asks"), rows(data, "bids"), timestamp);
            self.books.lock().expect("book table poisoned").insert(symbol.clone(), book);
        })
        .await;
    }

    /// Apply one delta and republish the truncated view.
    async fn process_delta(&self, data: &Value) {
        let Some(symbol) = self.symbol_of(data) else { return };
        let timestamp = self.data_timestamp(data);
        let locker_name = format!("okex.market.book.{symbol}");
        let orderbook = locker::run(&locker_name, true, async {
            let mut books = self.books.lock().expect("book table poisoned");
            let book = books.get_mut(&symbol)?;
            book.apply(rows(data, "asks"), rows(data, "bids"), timestamp);
            let (asks, bids) = book.top(&symbol, self.orderbook_length)?;
            Some(Orderbook {
                platform: self.platform.clone(),
                symbol: symbol.clone(),
                asks,
                bids,
                timestamp: book.timestamp,
            })
        })
        .await
        .flatten();

        if let Some(orderbook) = orderbook {
            self.publish(Event::orderbook(&orderbook, self.bus.server_id())).await;
            tracing::debug!(symbol = %orderbook.symbol, "orderbook");
        }
    }

    async fn process_trade(&self, data: &Value) {
        let Some(symbol) = self.symbol_of(data) else { return };
        let action = if data.get("side").and_then(Value::as_str) == Some("buy") {
            OrderAction::BUY
        } else {
            OrderAction::SELL
        };
        let price: f64 = data
            .get("price")
            .and_then(Value::as_str)
            .and_then(|p| p.parse().ok())
            .unwrap_or(0.0);
        let size: f64 = data
            .get("size")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0);
        let trade = Trade {
            platform: self.platform.clone(),
            symbol,
            action,
            price: format_quantity(price),
            quantity: format_quantity(size),
            timestamp: self.data_timestamp(data),
        };
        self.publish(Event::trade(&trade, self.bus.server_id())).await;
        tracing::debug!(symbol = %trade.symbol, ?trade, "trade");
    }

    async fn process_kline(&self, data: &Value) {
        let Some(symbol) = self.symbol_of(data) else { return };
        let Some(candle) = data.get("candle").and_then(Value::as_array) else {
            return;
        };
        if candle.len() < 6 {
            return;
        }
        let field = |index: usize| -> String {
            let raw: f64 = candle[index].as_str().and_then(|v| v.parse().ok()).unwrap_or(0.0);
            format_quantity(raw)
        };
        let timestamp = candle[0]
            .as_str()
            .and_then(|t| util::utctime_str_to_ms(t).ok())
            .unwrap_or_else(util::timestamp_ms);
        let kline = Kline {
            platform: self.platform.clone(),
            symbol,
            open: field(1),
            high: field(2),
            low: field(3),
            close: field(4),
            volume: field(5),
            timestamp,
            kline_type: KlineKind::Kline,
        };
        self.publish(Event::kline(&kline, self.bus.server_id())).await;
        tracing::debug!(symbol = %kline.symbol, ?kline, "kline");
    }

    fn data_timestamp(&self, data: &Value) -> i64 {
        data.get("timestamp")
            .and_then(Value::as_str)
            .and_then(|t| util::utctime_str_to_ms(t).ok())
            .unwrap_or_else(util::timestamp_ms)
    }

    async fn publish(&self, event: Event) {
        if let Err(e) = self.bus.publish(&event).await {
            tracing::error!(error = %e, routing_key = %event.routing_key, "publish error");
        }
    }
}

#[async_trait]
impl WsHandler for OkexMarket {
    /// Send one subscribe frame covering channels × symbols.
    async fn on_connected(&self) {
        let args = self.subscribe_args();
        if args.is_empty() {
            return;
        }
        let subscribe = json!({"op": "subscribe", "args": args});
        match self.ws.send_json(&subscribe).await {
            Ok(()) => tracing::info!("market channels subscribed"),
            Err(e) => tracing::error!(error = %e, "subscribe frame send error"),
        }
    }

    async fn on_binary(&self, data: Vec<u8>) {
        let text = match util::inflate_raw(&data) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "undecodable frame");
                return;
            }
        };
        if text == "pong" {
            return;
        }
        match serde_json::from_str::<Value>(&text) {
            Ok(msg) => self.process(msg).await,
            Err(e) => tracing::warn!(error = %e, frame = %text, "unparsable frame"),
        }
    }
}

impl MarketAdapter for OkexMarket {
    fn platform(&self) -> &str {
        &self.platform
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::DeflateEncoder;
    use serde_json::json;
    use std::io::Write;

    fn levels(rows: &[(&str, &str)]) -> Vec<Value> {
        rows.iter().map(|(p, q)| json!([p, q])).collect()
    }

    #[test]
    fn price_key_is_fixed_point_at_1e8() {
        assert_eq!(price_key("100"), Some(10_000_000_000));
        assert_eq!(price_key("0.00000001"), Some(1));
        assert_eq!(price_key("not-a-price"), None);
        assert_eq!(format_price(10_000_000_000), "100.00000000");
        assert_eq!(format_price(1), "0.00000001");
    }

    #[test]
    fn delta_application_removes_and_replaces_levels() {
        // Seed: asks {100: 1, 101: 2}, bids {99: 1}.
        let mut book = Book::seed(
            &levels(&[("100", "1"), ("101", "2")]),
            &levels(&[("99", "1")]),
            1,
        );
        // Delta: remove ask 100, add ask 102 with quantity 3.
        book.apply(&levels(&[("100", "0"), ("102", "3")]), &[], 2);

        let (asks, bids) = book.top("BTC/USDT", 10).unwrap();
        assert_eq!(
            asks,
            vec![
                ["101.00000000".to_owned(), "2.00000000".to_owned()],
                ["102.00000000".to_owned(), "3.00000000".to_owned()],
            ]
        );
        assert_eq!(bids, vec![["99.00000000".to_owned(), "1.00000000".to_owned()]]);
        assert_eq!(book.timestamp, 2);
    }

    #[test]
    fn crossed_book_is_dropped() {
        let mut book = Book::seed(
            &levels(&[("100", "1"), ("101", "2")]),
            &levels(&[("99", "1")]),
            1,
        );
        // Delta drives the best bid up to the best ask.
        book.apply(&[], &levels(&[("100", "5")]), 2);
        assert!(book.top("BTC/USDT", 10).is_none());
    }

    #[test]
    fn one_sided_book_is_dropped() {
        let book = Book::seed(&levels(&[("100", "1")]), &[], 1);
        assert!(book.top("BTC/USDT", 10).is_none());
    }

    #[test]
    fn view_is_truncated_and_sorted() {
        let book = Book::seed(
            &levels(&[("103", "1"), ("101", "1"), ("102", "1")]),
            &levels(&[("97", "1"), ("99", "1"), ("98", "1")]),
            1,
        );
        let (asks, bids) = book.top("BTC/USDT", 2).unwrap();
        let ask_prices: Vec<&str> = asks.iter().map(|l| l[0].as_str()).collect();
        let bid_prices: Vec<&str> = bids.iter().map(|l| l[0].as_str()).collect();
        assert_eq!(ask_prices, vec!["101.00000000", "102.00000000"]);
        assert_eq!(bid_prices, vec!["99.00000000", "98.00000000"]);
    }

    fn adapter() -> Arc<OkexMarket> {
        Arc::new(OkexMarket {
            platform: "okex".to_owned(),
            symbols: vec!["BTC/USDT".to_owned()],
            channels: vec!["orderbook".to_owned(), "trade".to_owned(), "kline".to_owned()],
            orderbook_length: 10,
            books: Mutex::new(HashMap::new()),
            ws: WsClient::new("wss://example.invalid/ws/v3"),
            bus: EventBus::disconnected("srv-test"),
        })
    }

    fn deflate(text: &str) -> Vec<u8> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn subscribe_args_cover_channels_times_symbols() {
        let adapter = adapter();
        assert_eq!(
            adapter.subscribe_args(),
            vec![
                "spot/depth:BTC-USDT",
                "spot/trade:BTC-USDT",
                "spot/candle60s:BTC-USDT",
            ]
        );
    }

    #[tokio::test]
    async fn snapshot_then_delta_updates_book_state() {
        let adapter = adapter();
        let snapshot = json!({
            "table": "spot/depth",
            "action": "partial",
            "data": [{
                "instrument_id": "BTC-USDT",
                "asks": [["100", "1"], ["101", "2"]],
                "bids": [["99", "1"]],
                "timestamp": "2019-03-04T09:14:27.806Z",
            }],
        });
        adapter.on_binary(deflate(&snapshot.to_string())).await;
        assert!(adapter.books.lock().unwrap().contains_key("BTC/USDT"));

        let delta = json!({
            "table": "spot/depth",
            "action": "update",
            "data": [{
                "instrument_id": "BTC-USDT",
                "asks": [["100", "0"], ["102", "3"]],
                "bids": [],
                "timestamp": "2019-03-04T09:14:28.806Z",
            }],
        });
        adapter.on_binary(deflate(&delta.to_string())).await;

        let books = adapter.books.lock().unwrap();
        let book = books.get("BTC/USDT").unwrap();
        assert_eq!(book.asks.len(), 2);
        assert!(!book.asks.contains_key(&price_key("100").unwrap()));
        assert!(book.asks.contains_key(&price_key("102").unwrap()));
    }

    #[tokio::test]
    async fn delta_for_unseeded_symbol_is_ignored() {
        let adapter = adapter();
        let delta = json!({
            "table": "spot/depth",
            "action": "update",
            "data": [{
                "instrument_id": "BTC-USDT",
                "asks": [["100", "1"]],
                "bids": [],
                "timestamp": "2019-03-04T09:14:28.806Z",
            }],
        });
        adapter.on_binary(deflate(&delta.to_string())).await;
        assert!(adapter.books.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unconfigured_symbols_are_filtered() {
        let adapter = adapter();
        let snapshot = json!({
            "table": "spot/depth",
            "action": "partial",
            "data": [{
                "instrument_id": "ETH-USDT",
                "asks": [["100", "1"]],
                "bids": [["99", "1"]],
                "timestamp": "2019-03-04T09:14:27.806Z",
            }],
        });
        adapter.on_binary(deflate(&snapshot.to_string())).await;
        assert!(adapter.books.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn pong_frames_are_consumed_silently() {
        let adapter = adapter();
        adapter.on_binary(deflate("pong")).await;
        assert!(adapter.books.lock().unwrap().is_empty());
    }
}
