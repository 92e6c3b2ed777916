//! Binance spot trade adapter.
//!
//! REST requests are signed by appending an HMAC-SHA256 hex signature over
//! the query string, with the API key in the `X-MBX-APIKEY` header. The
//! user-data stream is an unauthenticated WebSocket whose URL embeds a
//! short-lived listen key obtained (and kept alive) over REST.
//!
//! Reference: <https://github.com/binance/binance-spot-api-docs>

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;
use sha2::Sha256;

use crate::constants::{
    BINANCE, BINANCE_API_HOST, BINANCE_WSS,
    intervals::{BINANCE_PING_SECS, LISTEN_KEY_REFRESH_SECS},
};
use crate::error::{QuantError, Result};
use crate::http::HttpClient;
use crate::locker;
use crate::order::{NewOrder, Order, OrderAction, OrderStatus, OrderType};
use crate::tasks::{self, Heartbeat};
use crate::trade::{RevokeResult, TradeAdapter, TradeCallbacks, TradeDeps, TradeParams};
use crate::util;
use crate::ws::{WsClient, WsHandler};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// REST client
// ---------------------------------------------------------------------------

/// Binance spot REST API client.
pub struct BinanceRest {
    host: String,
    access_key: String,
    secret_key: String,
    http: Arc<HttpClient>,
}

impl BinanceRest {
    pub fn new(host: &str, access_key: &str, secret_key: &str, http: Arc<HttpClient>) -> Self {
        Self {
            host: host.trim_end_matches('/').to_owned(),
            access_key: access_key.to_owned(),
            secret_key: secret_key.to_owned(),
            http,
        }
    }

    /// Account balances and permissions. Signed.
    pub async fn get_user_account(&self) -> Result<Value> {
        let params = vec![("timestamp", util::timestamp_ms().to_string())];
        self.request(Method::GET, "/api/v3/account", params, true).await
    }

    /// Exchange server time.
    pub async fn get_server_time(&self) -> Result<Value> {
        self.request(Method::GET, "/api/v3/time", Vec::new(), false).await
    }

    /// Exchange trading rules and symbol list.
    pub async fn get_exchange_info(&self) -> Result<Value> {
        self.request(Method::GET, "/api/v3/exchangeInfo", Vec::new(), false).await
    }

    /// 24-hour rolling ticker for `symbol` (raw form, e.g. `BTCUSDT`).
    pub async fn get_latest_ticker(&self, symbol: &str) -> Result<Value> {
        let params = vec![("symbol", symbol.to_owned())];
        self.request(Method::GET, "/api/v3/ticker/24hr", params, false).await
    }

    /// Order book snapshot. `limit` per the exchange enum (5/10/20/...).
    pub async fn get_orderbook(&self, symbol: &str, limit: u32) -> Result<Value> {
        let params = vec![("symbol", symbol.to_owned()), ("limit", limit.to_string())];
        self.request(Method::GET, "/api/v3/depth", params, false).await
    }

    /// Candles for `symbol`. `interval` is an exchange interval string
    /// (`1m`, `5m`, `1h`, ...).
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        start: Option<i64>,
        end: Option<i64>,
        limit: u32,
    ) -> Result<Value> {
        let mut params = vec![
            ("symbol", symbol.to_owned()),
            ("interval", interval.to_owned()),
            ("limit", limit.to_string()),
        ];
        if let (Some(start), Some(end)) = (start, end) {
            params.push(("startTime", start.to_string()));
            params.push(("endTime", end.to_string()));
        }
        self.request(Method::GET, "/api/v3/klines", params, false).await
    }

    /// Most recent public trades.
    pub async fn get_latest_trade(&self, symbol: &str, limit: u32) -> Result<Value> {
        let params = vec![("symbol", symbol.to_owned()), ("limit", limit.to_string())];
        self.request(Method::GET, "/api/v3/trades", params, false).await
    }

    /// Place an order. Signed.
    pub async fn create_order(
        &self,
        action: OrderAction,
        symbol: &str,
        price: &str,
        quantity: &str,
        order_type: OrderType,
        client_order_id: &str,
    ) -> Result<Value> {
        let side = match action {
            OrderAction::BUY => "BUY",
            OrderAction::SELL => "SELL",
        };
        let mut params = vec![
            ("symbol", symbol.to_owned()),
            ("side", side.to_owned()),
        ];
        match order_type {
            OrderType::LIMIT => {
                params.push(("type", "LIMIT".to_owned()));
                params.push(("timeInForce", "GTC".to_owned()));
                params.push(("quantity", quantity.to_owned()));
                params.push(("price", price.to_owned()));
            }
            OrderType::MARKET => {
                params.push(("type", "MARKET".to_owned()));
                params.push(("quantity", quantity.to_owned()));
            }
        }
        params.push(("recvWindow", "5000".to_owned()));
        params.push(("newOrderRespType", "FULL".to_owned()));
        params.push(("timestamp", util::timestamp_ms().to_string()));
        if !client_order_id.is_empty() {
            params.push(("newClientOrderId", client_order_id.to_owned()));
        }
        self.request(Method::POST, "/api/v3/order", params, true).await
    }

    /// Cancel an unfilled order. Signed.
    pub async fn revoke_order(&self, symbol: &str, order_id: &str) -> Result<Value> {
        let params = vec![
            ("symbol", symbol.to_owned()),
            ("orderId", order_id.to_owned()),
            ("timestamp", util::timestamp_ms().to_string()),
        ];
        self.request(Method::DELETE, "/api/v3/order", params, true).await
    }

    /// Status of one order. Signed.
    pub async fn get_order_status(&self, symbol: &str, order_id: &str) -> Result<Value> {
        let params = vec![
            ("symbol", symbol.to_owned()),
            ("orderId", order_id.to_owned()),
            ("timestamp", util::timestamp_ms().to_string()),
        ];
        self.request(Method::GET, "/api/v3/order", params, true).await
    }

    /// Every order for `symbol`: active, canceled, filled. Signed.
    pub async fn get_all_orders(&self, symbol: &str) -> Result<Value> {
        let params = vec![
            ("symbol", symbol.to_owned()),
            ("timestamp", util::timestamp_ms().to_string()),
        ];
        self.request(Method::GET, "/api/v3/allOrders", params, true).await
    }

    /// Open orders for `symbol`. Signed.
    pub async fn get_open_orders(&self, symbol: &str) -> Result<Value> {
        let params = vec![
            ("symbol", symbol.to_owned()),
            ("timestamp", util::timestamp_ms().to_string()),
        ];
        self.request(Method::GET, "/api/v3/openOrders", params, true).await
    }

    /// Start a user-data stream; returns `{"listenKey": ...}`.
    pub async fn get_listen_key(&self) -> Result<Value> {
        self.request(Method::POST, "/api/v3/userDataStream", Vec::new(), false).await
    }

    /// Keep a user-data stream alive.
    pub async fn put_listen_key(&self, listen_key: &str) -> Result<Value> {
        let params = vec![("listenKey", listen_key.to_owned())];
        self.request(Method::PUT, "/api/v3/userDataStream", params, false).await
    }

    /// Close a user-data stream.
    pub async fn delete_listen_key(&self, listen_key: &str) -> Result<Value> {
        let params = vec![("listenKey", listen_key.to_owned())];
        self.request(Method::DELETE, "/api/v3/userDataStream", params, false).await
    }

    /// Perform one request. Binance takes every parameter in the query
    /// string; `auth` appends the HMAC signature over it.
    async fn request(
        &self,
        method: Method,
        uri: &str,
        params: Vec<(&str, String)>,
        auth: bool,
    ) -> Result<Value> {
        let mut query = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        if auth && !query.is_empty() {
            let signature = self.sign(&query);
            query.push_str(&format!("&signature={signature}"));
        }

        let url = if query.is_empty() {
            format!("{}{}", self.host, uri)
        } else {
            format!("{}{}?{}", self.host, uri, query)
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            "X-MBX-APIKEY",
            HeaderValue::from_str(&self.access_key)
                .map_err(|_| QuantError::InvalidArgument("access key is not a valid header".into()))?,
        );

        let (_status, value) = self
            .http
            .fetch(method, &url, None, None, Some(headers), REQUEST_TIMEOUT)
            .await?;
        Ok(value)
    }

    fn sign(&self, query: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

// ---------------------------------------------------------------------------
// Status mapping
// ---------------------------------------------------------------------------

/// Normalize a Binance order status string into the core state machine.
fn map_status(status: &str) -> Option<OrderStatus> {
    match status {
        "NEW" => Some(OrderStatus::SUBMITTED),
        "PARTIALLY_FILLED" => Some(OrderStatus::PARTIAL_FILLED),
        "FILLED" => Some(OrderStatus::FILLED),
        "CANCELED" => Some(OrderStatus::CANCELED),
        "REJECTED" | "EXPIRED" => Some(OrderStatus::FAILED),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Trade adapter
// ---------------------------------------------------------------------------

/// Binance spot trade session: REST + user-data WebSocket + open-order map.
pub struct BinanceTrade {
    account: String,
    strategy: String,
    symbol: String,
    /// Wire symbol, e.g. `BTCUSDT`.
    raw_symbol: String,
    wss: String,
    rest: BinanceRest,
    callbacks: TradeCallbacks,
    listen_key: Mutex<Option<String>>,
    ws: Mutex<Option<WsClient>>,
    orders: Mutex<HashMap<String, Order>>,
}

impl BinanceTrade {
    /// Validate parameters, register the periodic tasks, and schedule the
    /// WebSocket boot. Returns an error for any missing required parameter;
    /// the caller surfaces it through the strategy callbacks.
    pub async fn new(
        params: TradeParams,
        callbacks: TradeCallbacks,
        deps: &TradeDeps,
    ) -> Result<Arc<Self>> {
        if params.account.as_deref().unwrap_or_default().is_empty() {
            return Err(QuantError::InvalidArgument("param account miss".into()));
        }
        if params.strategy.is_empty() {
            return Err(QuantError::InvalidArgument("param strategy miss".into()));
        }
        if params.symbol.is_empty() {
            return Err(QuantError::InvalidArgument("param symbol miss".into()));
        }
        let access_key = params.access_key.clone().unwrap_or_default();
        if access_key.is_empty() {
            return Err(QuantError::InvalidArgument("param access_key miss".into()));
        }
        let secret_key = params.secret_key.clone().unwrap_or_default();
        if secret_key.is_empty() {
            return Err(QuantError::InvalidArgument("param secret_key miss".into()));
        }

        let host = params.host.clone().unwrap_or_else(|| BINANCE_API_HOST.to_owned());
        let wss = params.wss.clone().unwrap_or_else(|| BINANCE_WSS.to_owned());
        let symbol = params.symbol.clone();

        let adapter = Arc::new(Self {
            account: params.account.clone().unwrap_or_default(),
            strategy: params.strategy.clone(),
            raw_symbol: symbol.replace('/', ""),
            symbol,
            wss,
            rest: BinanceRest::new(&host, &access_key, &secret_key, deps.http.clone()),
            callbacks,
            listen_key: Mutex::new(None),
            ws: Mutex::new(None),
            orders: Mutex::new(HashMap::new()),
        });

        let refresher = Arc::downgrade(&adapter);
        deps.heartbeat.register(LISTEN_KEY_REFRESH_SECS, move |_, _| {
            let refresher = refresher.clone();
            async move {
                if let Some(adapter) = refresher.upgrade() {
                    adapter.reset_listen_key().await;
                }
            }
        });

        let pinger = Arc::downgrade(&adapter);
        deps.heartbeat.register(BINANCE_PING_SECS, move |_, _| {
            let pinger = pinger.clone();
            async move {
                if let Some(adapter) = pinger.upgrade() {
                    adapter.send_heartbeat().await;
                }
            }
        });

        let boot = adapter.clone();
        let heartbeat = deps.heartbeat.clone();
        tasks::spawn(async move {
            boot.init_websocket(heartbeat).await;
        });

        Ok(adapter)
    }

    /// Fetch the listen key and open the user-data WebSocket.
    async fn init_websocket(self: Arc<Self>, heartbeat: Arc<Heartbeat>) {
        let listen_key = match self.rest.get_listen_key().await {
            Ok(value) => match value.get("listenKey").and_then(Value::as_str) {
                Some(key) => key.to_owned(),
                None => {
                    self.fail_init(format!("get listen key failed: {value}")).await;
                    return;
                }
            },
            Err(e) => {
                self.fail_init(format!("get listen key failed: {e}")).await;
                return;
            }
        };

        let url = format!("{}/ws/{}", self.wss, listen_key);
        *self.listen_key.lock().expect("listen key slot poisoned") = Some(listen_key);

        let ws = WsClient::new(url);
        *self.ws.lock().expect("ws slot poisoned") = Some(ws.clone());
        let handler: Arc<dyn WsHandler> = self.clone();
        ws.start(Arc::downgrade(&handler), &heartbeat);
    }

    /// Keep the listen key alive. Loop task, every 30 minutes.
    async fn reset_listen_key(&self) {
        let listen_key = self
            .listen_key
            .lock()
            .expect("listen key slot poisoned")
            .clone();
        let Some(listen_key) = listen_key else {
            tracing::error!("listen key not initialized");
            return;
        };
        match self.rest.put_listen_key(&listen_key).await {
            Ok(_) => tracing::info!("listen key refreshed"),
            Err(e) => tracing::error!(error = %e, "listen key refresh error"),
        }
    }

    /// Protocol-level ping. Loop task, every 10 seconds.
    async fn send_heartbeat(&self) {
        let ws = self.ws.lock().expect("ws slot poisoned").clone();
        if let Some(ws) = ws {
            let _ = ws.ping().await;
        }
    }

    async fn fail_init(&self, message: String) {
        tracing::error!(error = %message, "Binance trade init error");
        self.callbacks.on_error(&message).await;
        self.callbacks.on_init(false).await;
    }

    /// Apply one order update: get-or-create the record, mutate it, fire
    /// the callback with a copy, drop it on a terminal status.
    async fn handle_execution_report(&self, msg: &Value) {
        if msg.get("s").and_then(Value::as_str) != Some(self.raw_symbol.as_str()) {
            return;
        }
        let Some(status) = msg.get("X").and_then(Value::as_str).and_then(map_status) else {
            tracing::warn!(payload = %msg, "unknown order status");
            self.callbacks.on_error("order status error").await;
            return;
        };
        let order_id = match msg.get("i") {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) => s.clone(),
            _ => return,
        };

        let quantity = msg.get("q").and_then(Value::as_str).unwrap_or("0").to_owned();
        let filled: f64 = msg
            .get("z")
            .and_then(Value::as_str)
            .and_then(|z| z.parse().ok())
            .unwrap_or(0.0);
        let total: f64 = quantity.parse().unwrap_or(0.0);

        let updated = {
            let mut orders = self.orders.lock().expect("order map poisoned");
            let order = orders.entry(order_id.clone()).or_insert_with(|| {
                Order::create(NewOrder {
                    platform: BINANCE.to_owned(),
                    account: self.account.clone(),
                    strategy: self.strategy.clone(),
                    order_id: order_id.clone(),
                    client_order_id: msg
                        .get("c")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_owned(),
                    symbol: self.symbol.clone(),
                    action: if msg.get("S").and_then(Value::as_str) == Some("BUY") {
                        OrderAction::BUY
                    } else {
                        OrderAction::SELL
                    },
                    order_type: if msg.get("o").and_then(Value::as_str) == Some("LIMIT") {
                        OrderType::LIMIT
                    } else {
                        OrderType::MARKET
                    },
                    price: msg.get("p").and_then(Value::as_str).unwrap_or("0").to_owned(),
                    quantity,
                    ctime: msg.get("O").and_then(Value::as_i64),
                })
            });
            order.remain = total - filled;
            order.status = status;
            if let Some(utime) = msg.get("T").and_then(Value::as_i64) {
                order.utime = utime;
            }
            let updated = order.clone();
            if status.is_terminal() {
                orders.remove(&order_id);
            }
            updated
        };

        self.callbacks.on_order_update(updated).await;
    }
}

#[async_trait]
impl WsHandler for BinanceTrade {
    /// User-data stream is live: seed the open-order map from REST and
    /// report readiness.
    async fn on_connected(&self) {
        tracing::info!("Binance user-data stream connected");
        let order_infos = match self.rest.get_open_orders(&self.raw_symbol).await {
            Ok(Value::Array(infos)) => infos,
            Ok(other) => {
                self.fail_init(format!("get open orders error: {other}")).await;
                return;
            }
            Err(e) => {
                self.fail_init(format!("get open orders error: {e}")).await;
                return;
            }
        };

        for info in order_infos {
            let Some(status) = info.get("status").and_then(Value::as_str).and_then(map_status)
            else {
                tracing::warn!(order = %info, "unknown order status in snapshot");
                self.callbacks.on_error("order status error").await;
                continue;
            };
            let order_id = match info.get("orderId") {
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::String(s)) => s.clone(),
                _ => continue,
            };
            let quantity = info.get("origQty").and_then(Value::as_str).unwrap_or("0").to_owned();
            let executed: f64 = info
                .get("executedQty")
                .and_then(Value::as_str)
                .and_then(|q| q.parse().ok())
                .unwrap_or(0.0);

            let mut order = Order::create(NewOrder {
                platform: BINANCE.to_owned(),
                account: self.account.clone(),
                strategy: self.strategy.clone(),
                order_id: order_id.clone(),
                client_order_id: info
                    .get("clientOrderId")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned(),
                symbol: self.symbol.clone(),
                action: if info.get("side").and_then(Value::as_str) == Some("BUY") {
                    OrderAction::BUY
                } else {
                    OrderAction::SELL
                },
                order_type: if info.get("type").and_then(Value::as_str) == Some("LIMIT") {
                    OrderType::LIMIT
                } else {
                    OrderType::MARKET
                },
                price: info.get("price").and_then(Value::as_str).unwrap_or("0").to_owned(),
                quantity: quantity.clone(),
                ctime: info.get("time").and_then(Value::as_i64),
            });
            order.remain = quantity.parse::<f64>().unwrap_or(0.0) - executed;
            order.status = status;
            if let Some(utime) = info.get("updateTime").and_then(Value::as_i64) {
                order.utime = utime;
            }

            self.orders
                .lock()
                .expect("order map poisoned")
                .insert(order_id, order.clone());
            self.callbacks.on_order_update(order).await;
        }

        self.callbacks.on_init(true).await;
    }

    /// Serialized user-data message handler.
    async fn on_text(&self, value: Value) {
        locker::run("BinanceTrade.process", true, async {
            if value.get("e").and_then(Value::as_str) == Some("executionReport") {
                self.handle_execution_report(&value).await;
            }
        })
        .await;
    }
}

#[async_trait]
impl TradeAdapter for BinanceTrade {
    async fn create_order(
        &self,
        action: OrderAction,
        price: &str,
        quantity: &str,
        order_type: OrderType,
        client_order_id: &str,
    ) -> Result<String> {
        let result = self
            .rest
            .create_order(action, &self.raw_symbol, price, quantity, order_type, client_order_id)
            .await;
        match result {
            Ok(value) => match value.get("orderId") {
                Some(Value::Number(n)) => Ok(n.to_string()),
                Some(Value::String(s)) => Ok(s.clone()),
                _ => {
                    let e = QuantError::exchange(format!("create order failed: {value}"));
                    self.callbacks.on_error(&e).await;
                    Err(e)
                }
            },
            Err(e) => {
                self.callbacks.on_error(&e).await;
                Err(e)
            }
        }
    }

    async fn revoke_order(&self, order_ids: &[String]) -> Result<RevokeResult> {
        // Zero ids: cancel everything open for the session symbol.
        if order_ids.is_empty() {
            let open = match self.rest.get_open_orders(&self.raw_symbol).await {
                Ok(Value::Array(infos)) => infos,
                Ok(other) => return Err(QuantError::exchange(format!("open orders error: {other}"))),
                Err(e) => {
                    self.callbacks.on_error(&e).await;
                    return Err(e);
                }
            };
            for info in open {
                let order_id = match info.get("orderId") {
                    Some(Value::Number(n)) => n.to_string(),
                    Some(Value::String(s)) => s.clone(),
                    _ => continue,
                };
                if let Err(e) = self.rest.revoke_order(&self.raw_symbol, &order_id).await {
                    self.callbacks.on_error(&e).await;
                    return Err(e);
                }
            }
            return Ok(RevokeResult::All);
        }

        if order_ids.len() == 1 {
            return match self.rest.revoke_order(&self.raw_symbol, &order_ids[0]).await {
                Ok(_) => Ok(RevokeResult::One(order_ids[0].clone())),
                Err(e) => {
                    self.callbacks.on_error(&e).await;
                    Err(e)
                }
            };
        }

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        for order_id in order_ids {
            match self.rest.revoke_order(&self.raw_symbol, order_id).await {
                Ok(_) => succeeded.push(order_id.clone()),
                Err(e) => {
                    self.callbacks.on_error(&e).await;
                    failed.push((order_id.clone(), e.to_string()));
                }
            }
        }
        Ok(RevokeResult::Many { succeeded, failed })
    }

    async fn get_open_order_ids(&self) -> Result<Vec<String>> {
        match self.rest.get_open_orders(&self.raw_symbol).await {
            Ok(Value::Array(infos)) => Ok(infos
                .iter()
                .filter_map(|info| match info.get("orderId") {
                    Some(Value::Number(n)) => Some(n.to_string()),
                    Some(Value::String(s)) => Some(s.clone()),
                    _ => None,
                })
                .collect()),
            Ok(other) => Err(QuantError::exchange(format!("open orders error: {other}"))),
            Err(e) => {
                self.callbacks.on_error(&e).await;
                Err(e)
            }
        }
    }

    fn orders(&self) -> HashMap<String, Order> {
        self.orders.lock().expect("order map poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    fn adapter_on(host: &str, callbacks: TradeCallbacks) -> Arc<BinanceTrade> {
        Arc::new(BinanceTrade {
            account: "test@quant".to_owned(),
            strategy: "s1".to_owned(),
            symbol: "BTC/USDT".to_owned(),
            raw_symbol: "BTCUSDT".to_owned(),
            wss: BINANCE_WSS.to_owned(),
            rest: BinanceRest::new(host, "ak", "sk", Arc::new(HttpClient::new(None))),
            callbacks,
            listen_key: Mutex::new(None),
            ws: Mutex::new(None),
            orders: Mutex::new(HashMap::new()),
        })
    }

    fn adapter_with_callbacks(callbacks: TradeCallbacks) -> Arc<BinanceTrade> {
        adapter_on(BINANCE_API_HOST, callbacks)
    }

    /// One-connection-per-request HTTP stub standing in for the exchange.
    /// Returns the listen port and a counter of cancel requests served.
    async fn mock_exchange() -> (u16, Arc<std::sync::atomic::AtomicUsize>) {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let cancels = Arc::new(AtomicUsize::new(0));
        let counter = cancels.clone();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else { break };
                let counter = counter.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]);
                    let line = request.lines().next().unwrap_or_default();

                    let body = if line.starts_with("GET /api/v3/openOrders") {
                        json!([
                            {
                                "orderId": 1, "status": "NEW", "clientOrderId": "c1",
                                "side": "BUY", "type": "LIMIT", "price": "10",
                                "origQty": "1", "executedQty": "0",
                                "time": 1i64, "updateTime": 1i64,
                            },
                            {
                                "orderId": 2, "status": "PARTIALLY_FILLED", "clientOrderId": "c2",
                                "side": "SELL", "type": "LIMIT", "price": "11",
                                "origQty": "2", "executedQty": "1",
                                "time": 2i64, "updateTime": 2i64,
                            },
                        ])
                        .to_string()
                    } else if line.starts_with("DELETE /api/v3/order") {
                        counter.fetch_add(1, Ordering::SeqCst);
                        json!({"orderId": 1, "status": "CANCELED"}).to_string()
                    } else if line.starts_with("POST /api/v3/order") {
                        json!({"orderId": 333, "status": "NEW"}).to_string()
                    } else {
                        "{}".to_owned()
                    };

                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        (port, cancels)
    }

    fn execution_report(order_id: u64, status: &str, filled: &str) -> Value {
        json!({
            "e": "executionReport",
            "s": "BTCUSDT",
            "i": order_id,
            "c": "client-1",
            "S": "BUY",
            "o": "LIMIT",
            "p": "50000",
            "q": "1.0",
            "z": filled,
            "X": status,
            "O": 1_600_000_000_000i64,
            "T": 1_600_000_000_500i64,
        })
    }

    #[test]
    fn status_mapping_matches_exchange_strings() {
        assert_eq!(map_status("NEW"), Some(OrderStatus::SUBMITTED));
        assert_eq!(map_status("PARTIALLY_FILLED"), Some(OrderStatus::PARTIAL_FILLED));
        assert_eq!(map_status("FILLED"), Some(OrderStatus::FILLED));
        assert_eq!(map_status("CANCELED"), Some(OrderStatus::CANCELED));
        assert_eq!(map_status("REJECTED"), Some(OrderStatus::FAILED));
        assert_eq!(map_status("EXPIRED"), Some(OrderStatus::FAILED));
        assert_eq!(map_status("PENDING_CANCEL"), None);
    }

    #[test]
    fn query_signature_is_hex_hmac() {
        let rest = BinanceRest::new(
            BINANCE_API_HOST,
            "ak",
            "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j",
            Arc::new(HttpClient::new(None)),
        );
        // Worked example from the Binance API documentation.
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            rest.sign(query),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[tokio::test]
    async fn order_lifecycle_fires_callbacks_and_clears_terminal_orders() {
        let updates: Arc<StdMutex<Vec<(OrderStatus, f64)>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = updates.clone();
        let callbacks = TradeCallbacks {
            order_update: Some(Arc::new(move |order: Order| {
                let sink = sink.clone();
                Box::pin(async move {
                    sink.lock().unwrap().push((order.status, order.remain));
                })
            })),
            ..TradeCallbacks::default()
        };
        let adapter = adapter_with_callbacks(callbacks);

        adapter.on_text(execution_report(7, "NEW", "0")).await;
        adapter.on_text(execution_report(7, "PARTIALLY_FILLED", "0.5")).await;
        adapter.on_text(execution_report(7, "FILLED", "1.0")).await;

        let seen = updates.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                (OrderStatus::SUBMITTED, 1.0),
                (OrderStatus::PARTIAL_FILLED, 0.5),
                (OrderStatus::FILLED, 0.0),
            ]
        );
        assert!(adapter.orders().is_empty());
    }

    #[tokio::test]
    async fn updates_for_other_symbols_are_ignored() {
        let adapter = adapter_with_callbacks(TradeCallbacks::default());
        let mut msg = execution_report(9, "NEW", "0");
        msg["s"] = json!("ETHUSDT");
        adapter.on_text(msg).await;
        assert!(adapter.orders().is_empty());
    }

    #[tokio::test]
    async fn unknown_status_fires_error_and_mutates_nothing() {
        let errors: Arc<StdMutex<Vec<String>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = errors.clone();
        let callbacks = TradeCallbacks {
            error: Some(Arc::new(move |message| {
                let sink = sink.clone();
                Box::pin(async move {
                    sink.lock().unwrap().push(message);
                })
            })),
            ..TradeCallbacks::default()
        };
        let adapter = adapter_with_callbacks(callbacks);

        adapter.on_text(execution_report(11, "PENDING_CANCEL", "0")).await;

        assert!(adapter.orders().is_empty());
        assert_eq!(errors.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn revoke_all_issues_one_cancel_per_open_order() {
        let (port, cancels) = mock_exchange().await;
        let adapter = adapter_on(&format!("http://127.0.0.1:{port}"), TradeCallbacks::default());

        let result = adapter.revoke_order(&[]).await.unwrap();
        assert_eq!(result, RevokeResult::All);
        assert_eq!(cancels.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn open_order_ids_come_from_the_exchange_snapshot() {
        let (port, _) = mock_exchange().await;
        let adapter = adapter_on(&format!("http://127.0.0.1:{port}"), TradeCallbacks::default());

        let ids = adapter.get_open_order_ids().await.unwrap();
        assert_eq!(ids, vec!["1".to_owned(), "2".to_owned()]);
    }

    #[tokio::test]
    async fn create_order_returns_the_exchange_order_id() {
        let (port, _) = mock_exchange().await;
        let adapter = adapter_on(&format!("http://127.0.0.1:{port}"), TradeCallbacks::default());

        let order_id = adapter
            .create_order(OrderAction::BUY, "50000", "0.01", OrderType::LIMIT, "client-7")
            .await
            .unwrap();
        assert_eq!(order_id, "333");
    }

    #[tokio::test]
    async fn revoke_many_collects_successes_and_failures() {
        let (port, cancels) = mock_exchange().await;
        let adapter = adapter_on(&format!("http://127.0.0.1:{port}"), TradeCallbacks::default());

        let ids = vec!["1".to_owned(), "2".to_owned(), "3".to_owned()];
        let result = adapter.revoke_order(&ids).await.unwrap();
        match result {
            RevokeResult::Many { succeeded, failed } => {
                assert_eq!(succeeded, ids);
                assert!(failed.is_empty());
            }
            other => panic!("expected Many, got {other:?}"),
        }
        assert_eq!(cancels.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn missing_params_are_rejected() {
        let deps = TradeDeps {
            heartbeat: Heartbeat::new(0),
            http: Arc::new(HttpClient::new(None)),
        };
        let params = TradeParams {
            strategy: "s1".to_owned(),
            platform: BINANCE.to_owned(),
            symbol: "BTC/USDT".to_owned(),
            account: Some("a".to_owned()),
            access_key: Some("k".to_owned()),
            // secret_key missing
            ..TradeParams::default()
        };
        let err = BinanceTrade::new(params, TradeCallbacks::default(), &deps)
            .await
            .err()
            .expect("missing secret key must fail");
        assert!(err.to_string().contains("secret_key"));
    }
}
