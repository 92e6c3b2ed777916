//! OKEx spot trade adapter.
//!
//! REST requests are signed with HMAC-SHA256 over
//! `timestamp + METHOD + path + body`, Base64-encoded, and sent in the
//! `OK-ACCESS-*` headers. The user-data session is the public v3 WebSocket
//! with a sign-on frame: after `login` succeeds the adapter seeds its
//! open-order map over REST and subscribes the private order channel.
//! Every frame arrives raw-deflate compressed.
//!
//! Reference: <https://www.okex.com/docs/en/>

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{Value, json};
use sha2::Sha256;

use crate::constants::{OKEX, OKEX_API_HOST, OKEX_WSS, intervals::OKEX_PING_SECS};
use crate::error::{QuantError, Result};
use crate::http::{HttpClient, RequestBody};
use crate::locker;
use crate::order::{NewOrder, Order, OrderAction, OrderStatus, OrderType};
use crate::trade::{RevokeResult, TradeAdapter, TradeCallbacks, TradeDeps, TradeParams};
use crate::util;
use crate::ws::{WsClient, WsHandler};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// REST client
// ---------------------------------------------------------------------------

/// OKEx spot REST API client.
pub struct OkexRest {
    host: String,
    access_key: String,
    secret_key: String,
    passphrase: String,
    http: Arc<HttpClient>,
}

impl OkexRest {
    pub fn new(
        host: &str,
        access_key: &str,
        secret_key: &str,
        passphrase: &str,
        http: Arc<HttpClient>,
    ) -> Self {
        Self {
            host: host.trim_end_matches('/').to_owned(),
            access_key: access_key.to_owned(),
            secret_key: secret_key.to_owned(),
            passphrase: passphrase.to_owned(),
            http,
        }
    }

    /// Spot account balances. Signed.
    pub async fn get_user_account(&self) -> Result<Value> {
        self.request(Method::GET, "/api/spot/v3/accounts", Vec::new(), None).await
    }

    /// Place an order. Signed.
    pub async fn create_order(
        &self,
        action: OrderAction,
        symbol: &str,
        price: &str,
        quantity: &str,
        order_type: OrderType,
        client_oid: &str,
    ) -> Result<Value> {
        let side = match action {
            OrderAction::BUY => "buy",
            OrderAction::SELL => "sell",
        };
        let mut body = json!({
            "side": side,
            "instrument_id": symbol,
            "margin_trading": 1,
        });
        match order_type {
            OrderType::LIMIT => {
                body["type"] = json!("limit");
                body["price"] = json!(price);
                body["size"] = json!(quantity);
            }
            OrderType::MARKET => {
                body["type"] = json!("market");
                match action {
                    // Market buys spend quote currency, market sells spend base.
                    OrderAction::BUY => body["notional"] = json!(quantity),
                    OrderAction::SELL => body["size"] = json!(quantity),
                }
            }
        }
        if !client_oid.is_empty() {
            body["client_oid"] = json!(client_oid);
        }
        self.request(Method::POST, "/api/spot/v3/orders", Vec::new(), Some(body)).await
    }

    /// Cancel one unfilled order. Signed.
    pub async fn revoke_order(&self, symbol: &str, order_id: &str) -> Result<Value> {
        let uri = format!("/api/spot/v3/cancel_orders/{order_id}");
        let body = json!({"instrument_id": symbol});
        let result = self.request(Method::POST, &uri, Vec::new(), Some(body)).await?;
        if result.get("result").and_then(Value::as_bool) == Some(true) {
            Ok(result)
        } else {
            Err(QuantError::exchange(format!("revoke order failed: {result}")))
        }
    }

    /// Cancel up to ten orders in one request. Signed.
    pub async fn revoke_orders(&self, symbol: &str, order_ids: &[String]) -> Result<Value> {
        if order_ids.len() > 10 {
            tracing::warn!("only ten orders are revoked per request");
        }
        let body = json!([{
            "instrument_id": symbol,
            "order_ids": order_ids.iter().take(10).collect::<Vec<_>>(),
        }]);
        self.request(Method::POST, "/api/spot/v3/cancel_batch_orders", Vec::new(), Some(body))
            .await
    }

    /// Open and partially filled orders for `symbol`. Signed.
    pub async fn get_open_orders(&self, symbol: &str, limit: u32) -> Result<Value> {
        let params = vec![
            ("instrument_id", symbol.to_owned()),
            ("limit", limit.to_string()),
        ];
        self.request(Method::GET, "/api/spot/v3/orders_pending", params, None).await
    }

    /// Status of one order. Signed.
    pub async fn get_order_status(&self, symbol: &str, order_id: &str) -> Result<Value> {
        let uri = format!("/api/spot/v3/orders/{order_id}");
        let params = vec![("instrument_id", symbol.to_owned())];
        self.request(Method::GET, &uri, params, None).await
    }

    /// Perform one signed request. The signature covers the path including
    /// the sorted query string and the raw JSON body.
    async fn request(
        &self,
        method: Method,
        uri: &str,
        mut params: Vec<(&str, String)>,
        body: Option<Value>,
    ) -> Result<Value> {
        let mut uri = uri.to_owned();
        if !params.is_empty() {
            params.sort_by(|a, b| a.0.cmp(b.0));
            let query = params
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&");
            uri.push('?');
            uri.push_str(&query);
        }
        let url = format!("{}{}", self.host, uri);

        let body_str = body.map(|b| b.to_string()).unwrap_or_default();
        let timestamp = util::timestamp_str_3f();
        let message = format!("{timestamp}{}{uri}{body_str}", method.as_str());
        let signature = self.sign(&message);

        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            "OK-ACCESS-KEY",
            HeaderValue::from_str(&self.access_key)
                .map_err(|_| QuantError::InvalidArgument("access key is not a valid header".into()))?,
        );
        headers.insert(
            "OK-ACCESS-SIGN",
            HeaderValue::from_str(&signature)
                .map_err(|_| QuantError::InvalidArgument("signature is not a valid header".into()))?,
        );
        headers.insert(
            "OK-ACCESS-TIMESTAMP",
            HeaderValue::from_str(&timestamp)
                .map_err(|_| QuantError::InvalidArgument("timestamp is not a valid header".into()))?,
        );
        headers.insert(
            "OK-ACCESS-PASSPHRASE",
            HeaderValue::from_str(&self.passphrase)
                .map_err(|_| QuantError::InvalidArgument("passphrase is not a valid header".into()))?,
        );

        let request_body = if body_str.is_empty() {
            None
        } else {
            Some(RequestBody::Raw(body_str))
        };
        let (_status, value) = self
            .http
            .fetch(method, &url, None, request_body, Some(headers), REQUEST_TIMEOUT)
            .await?;
        Ok(value)
    }

    fn sign(&self, message: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(message.as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }
}

// ---------------------------------------------------------------------------
// Status mapping
// ---------------------------------------------------------------------------

/// Per-order outcomes from a batch-cancel response. The response groups
/// entries by instrument; each entry carries `order_id` and a `result` flag.
fn batch_cancel_results(response: &Value) -> HashMap<String, bool> {
    let mut results = HashMap::new();
    if let Some(groups) = response.as_object() {
        for entries in groups.values() {
            for entry in entries.as_array().into_iter().flatten() {
                if let Some(order_id) = entry.get("order_id").and_then(Value::as_str) {
                    let ok = entry.get("result").and_then(Value::as_bool).unwrap_or(false);
                    results.insert(order_id.to_owned(), ok);
                }
            }
        }
    }
    results
}

/// Normalize an OKEx numeric order state into the core state machine.
fn map_state(state: &str) -> Option<OrderStatus> {
    match state {
        "-2" => Some(OrderStatus::FAILED),
        "-1" => Some(OrderStatus::CANCELED),
        "0" => Some(OrderStatus::SUBMITTED),
        "1" => Some(OrderStatus::PARTIAL_FILLED),
        "2" => Some(OrderStatus::FILLED),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Trade adapter
// ---------------------------------------------------------------------------

/// OKEx spot trade session: REST + signed-on WebSocket + open-order map.
pub struct OkexTrade {
    account: String,
    strategy: String,
    symbol: String,
    /// Wire symbol, e.g. `BTC-USDT`.
    raw_symbol: String,
    /// Private order channel, `spot/order:{raw_symbol}`.
    order_channel: String,
    access_key: String,
    secret_key: String,
    passphrase: String,
    rest: OkexRest,
    ws: WsClient,
    callbacks: TradeCallbacks,
    orders: Mutex<HashMap<String, Order>>,
}

impl OkexTrade {
    /// Validate parameters, open the WebSocket, and register the ping loop.
    pub fn new(
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
        let passphrase = params.passphrase.clone().unwrap_or_default();
        if passphrase.is_empty() {
            return Err(QuantError::InvalidArgument("param passphrase miss".into()));
        }

        let host = params.host.clone().unwrap_or_else(|| OKEX_API_HOST.to_owned());
        let wss = params.wss.clone().unwrap_or_else(|| OKEX_WSS.to_owned());
        let symbol = params.symbol.clone();
        let raw_symbol = symbol.replace('/', "-");

        let adapter = Arc::new(Self {
            account: params.account.clone().unwrap_or_default(),
            strategy: params.strategy.clone(),
            order_channel: format!("spot/order:{raw_symbol}"),
            raw_symbol,
            symbol,
            rest: OkexRest::new(&host, &access_key, &secret_key, &passphrase, deps.http.clone()),
            ws: WsClient::new(format!("{wss}/ws/v3")),
            access_key,
            secret_key,
            passphrase,
            callbacks,
            orders: Mutex::new(HashMap::new()),
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

    /// Login accepted: seed the open-order map and subscribe the private
    /// order channel.
    async fn on_login_ok(&self) {
        tracing::info!("OKEx session authorized");
        let order_infos = match self.rest.get_open_orders(&self.raw_symbol, 100).await {
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
        if order_infos.len() > 100 {
            tracing::warn!("more than one hundred open orders");
        }
        for info in &order_infos {
            let ctime = info.get("created_at").and_then(Value::as_str).unwrap_or_default();
            let utime = info.get("timestamp").and_then(Value::as_str).unwrap_or_default();
            self.update_order(info, ctime, utime).await;
        }

        let subscribe = json!({"op": "subscribe", "args": [self.order_channel]});
        if let Err(e) = self.ws.send_json(&subscribe).await {
            self.fail_init(format!("subscribe order channel error: {e}")).await;
        }
    }

    async fn fail_init(&self, message: String) {
        tracing::error!(error = %message, "OKEx trade init error");
        self.callbacks.on_error(&message).await;
        self.callbacks.on_init(false).await;
    }

    /// Apply one order update: get-or-create the record, mutate it, fire
    /// the callback with a copy, drop it on a terminal status.
    async fn update_order(&self, info: &Value, ctime_str: &str, utime_str: &str) {
        let Some(order_id) = info.get("order_id").and_then(Value::as_str).map(str::to_owned)
        else {
            return;
        };
        let Some(status) = info.get("state").and_then(Value::as_str).and_then(map_state) else {
            tracing::error!(order = %info, "unknown order state");
            self.callbacks.on_error("order status error").await;
            return;
        };

        let size: f64 = info
            .get("size")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0);
        let filled: f64 = info
            .get("filled_size")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0);
        let ctime = util::utctime_str_to_ms(ctime_str).unwrap_or_else(|_| util::timestamp_ms());
        let utime = util::utctime_str_to_ms(utime_str).unwrap_or_else(|_| util::timestamp_ms());

        let updated = {
            let mut orders = self.orders.lock().expect("order map poisoned");
            let order = orders.entry(order_id.clone()).or_insert_with(|| {
                Order::create(NewOrder {
                    platform: OKEX.to_owned(),
                    account: self.account.clone(),
                    strategy: self.strategy.clone(),
                    order_id: order_id.clone(),
                    client_order_id: info
                        .get("client_oid")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_owned(),
                    symbol: self.symbol.clone(),
                    action: if info.get("side").and_then(Value::as_str) == Some("buy") {
                        OrderAction::BUY
                    } else {
                        OrderAction::SELL
                    },
                    order_type: OrderType::LIMIT,
                    price: info.get("price").and_then(Value::as_str).unwrap_or("0").to_owned(),
                    quantity: info.get("size").and_then(Value::as_str).unwrap_or("0").to_owned(),
                    ctime: None,
                })
            });
            order.remain = size - filled;
            order.status = status;
            order.ctime = ctime;
            order.utime = utime;
            let updated = order.clone();
            if status.is_terminal() {
                orders.remove(&order_id);
            }
            updated
        };

        self.callbacks.on_order_update(updated).await;
    }

    /// Serialized session message handler.
    async fn process(&self, msg: Value) {
        if msg.get("event").and_then(Value::as_str) == Some("login") {
            if msg.get("success").and_then(Value::as_bool) == Some(true) {
                self.on_login_ok().await;
            } else {
                self.fail_init(format!("session authorization failed: {msg}")).await;
            }
            return;
        }

        if msg.get("event").and_then(Value::as_str) == Some("subscribe") {
            if msg.get("channel").and_then(Value::as_str) == Some(self.order_channel.as_str()) {
                self.callbacks.on_init(true).await;
            } else {
                self.fail_init(format!("subscribe order channel error: {msg}")).await;
            }
            return;
        }

        if msg.get("table").and_then(Value::as_str) == Some("spot/order") {
            let Some(entries) = msg.get("data").and_then(Value::as_array) else {
                return;
            };
            for entry in entries {
                let ctime = entry.get("timestamp").and_then(Value::as_str).unwrap_or_default();
                let utime = entry
                    .get("last_fill_time")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                self.update_order(entry, ctime, utime).await;
            }
        }
    }
}

#[async_trait]
impl WsHandler for OkexTrade {
    /// Send the sign-on frame.
    async fn on_connected(&self) {
        let timestamp = util::timestamp_str_3f();
        let message = format!("{timestamp}GET/users/self/verify");
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(message.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());

        let login = json!({
            "op": "login",
            "args": [self.access_key, self.passphrase, timestamp, signature],
        });
        if let Err(e) = self.ws.send_json(&login).await {
            tracing::error!(error = %e, "sign-on frame send error");
        }
    }

    async fn on_binary(&self, data: Vec<u8>) {
        locker::run("OKExTrade.process_binary", true, async {
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
        })
        .await;
    }
}

#[async_trait]
impl TradeAdapter for OkexTrade {
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
            Ok(value) => {
                if value.get("result").and_then(Value::as_bool) == Some(true) {
                    match value.get("order_id").and_then(Value::as_str) {
                        Some(order_id) => Ok(order_id.to_owned()),
                        None => {
                            let e = QuantError::exchange(format!("create order failed: {value}"));
                            self.callbacks.on_error(&e).await;
                            Err(e)
                        }
                    }
                } else {
                    let e = QuantError::exchange(format!("create order failed: {value}"));
                    self.callbacks.on_error(&e).await;
                    Err(e)
                }
            }
            Err(e) => {
                self.callbacks.on_error(&e).await;
                Err(e)
            }
        }
    }

    async fn revoke_order(&self, order_ids: &[String]) -> Result<RevokeResult> {
        // Zero ids: cancel everything open for the session symbol.
        if order_ids.is_empty() {
            let open = match self.rest.get_open_orders(&self.raw_symbol, 100).await {
                Ok(Value::Array(infos)) => infos,
                Ok(other) => return Err(QuantError::exchange(format!("open orders error: {other}"))),
                Err(e) => {
                    self.callbacks.on_error(&e).await;
                    return Err(e);
                }
            };
            if open.len() > 100 {
                tracing::warn!("more than one hundred open orders");
            }
            for info in open {
                let Some(order_id) = info.get("order_id").and_then(Value::as_str) else {
                    continue;
                };
                if let Err(e) = self.rest.revoke_order(&self.raw_symbol, order_id).await {
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

        // Many ids: the batch endpoint takes at most ten per request.
        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        for chunk in order_ids.chunks(10) {
            match self.rest.revoke_orders(&self.raw_symbol, chunk).await {
                Ok(response) => {
                    let results = batch_cancel_results(&response);
                    for order_id in chunk {
                        match results.get(order_id).copied() {
                            Some(true) => succeeded.push(order_id.clone()),
                            outcome => {
                                let e = match outcome {
                                    Some(false) => QuantError::exchange(format!(
                                        "revoke order {order_id} failed"
                                    )),
                                    _ => QuantError::exchange(format!(
                                        "no batch cancel result for {order_id}"
                                    )),
                                };
                                self.callbacks.on_error(&e).await;
                                failed.push((order_id.clone(), e.to_string()));
                            }
                        }
                    }
                }
                Err(e) => {
                    self.callbacks.on_error(&e).await;
                    for order_id in chunk {
                        failed.push((order_id.clone(), e.to_string()));
                    }
                }
            }
        }
        Ok(RevokeResult::Many { succeeded, failed })
    }

    async fn get_open_order_ids(&self) -> Result<Vec<String>> {
        match self.rest.get_open_orders(&self.raw_symbol, 100).await {
            Ok(Value::Array(infos)) => Ok(infos
                .iter()
                .filter_map(|info| info.get("order_id").and_then(Value::as_str))
                .map(str::to_owned)
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
    use flate2::Compression;
    use flate2::write::DeflateEncoder;
    use std::io::Write;
    use std::sync::Mutex as StdMutex;

    fn deflate(text: &str) -> Vec<u8> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    fn adapter_with_callbacks(callbacks: TradeCallbacks) -> Arc<OkexTrade> {
        Arc::new(OkexTrade {
            account: "test@quant".to_owned(),
            strategy: "s1".to_owned(),
            symbol: "BTC/USDT".to_owned(),
            raw_symbol: "BTC-USDT".to_owned(),
            order_channel: "spot/order:BTC-USDT".to_owned(),
            access_key: "ak".to_owned(),
            secret_key: "sk".to_owned(),
            passphrase: "pp".to_owned(),
            rest: OkexRest::new(OKEX_API_HOST, "ak", "sk", "pp", Arc::new(HttpClient::new(None))),
            ws: WsClient::new("wss://example.invalid/ws/v3"),
            callbacks,
            orders: Mutex::new(HashMap::new()),
        })
    }

    fn order_update(order_id: &str, state: &str, filled: &str) -> Value {
        json!({
            "order_id": order_id,
            "client_oid": "c1",
            "side": "buy",
            "price": "9200",
            "size": "1",
            "filled_size": filled,
            "state": state,
            "timestamp": "2019-03-04T09:14:27.806Z",
            "last_fill_time": "2019-03-04T09:14:28.806Z",
        })
    }

    #[test]
    fn state_mapping_matches_exchange_codes() {
        assert_eq!(map_state("-2"), Some(OrderStatus::FAILED));
        assert_eq!(map_state("-1"), Some(OrderStatus::CANCELED));
        assert_eq!(map_state("0"), Some(OrderStatus::SUBMITTED));
        assert_eq!(map_state("1"), Some(OrderStatus::PARTIAL_FILLED));
        assert_eq!(map_state("2"), Some(OrderStatus::FILLED));
        assert_eq!(map_state("3"), None);
    }

    #[test]
    fn batch_cancel_results_are_keyed_by_order_id() {
        let response = json!({
            "btc-usdt": [
                {"result": true, "order_id": "10", "client_oid": "a"},
                {"result": false, "order_id": "11", "client_oid": "b"},
                {"client_oid": "c"},
            ],
        });
        let results = batch_cancel_results(&response);
        assert_eq!(results.get("10").copied(), Some(true));
        assert_eq!(results.get("11").copied(), Some(false));
        assert_eq!(results.len(), 2);
        assert!(batch_cancel_results(&json!({"result": true})).is_empty());
    }

    #[test]
    fn signature_is_base64_of_sha256_hmac() {
        let rest = OkexRest::new(OKEX_API_HOST, "ak", "sk", "pp", Arc::new(HttpClient::new(None)));
        let signature = rest.sign("1546300800.123GET/users/self/verify");
        let raw = BASE64.decode(signature).unwrap();
        assert_eq!(raw.len(), 32);
    }

    #[tokio::test]
    async fn order_lifecycle_clears_terminal_orders() {
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

        let frame = json!({
            "table": "spot/order",
            "data": [order_update("55", "0", "0")],
        });
        adapter.on_binary(deflate(&frame.to_string())).await;
        assert_eq!(adapter.orders().len(), 1);

        let frame = json!({
            "table": "spot/order",
            "data": [order_update("55", "2", "1")],
        });
        adapter.on_binary(deflate(&frame.to_string())).await;

        let seen = updates.lock().unwrap().clone();
        assert_eq!(seen, vec![(OrderStatus::SUBMITTED, 1.0), (OrderStatus::FILLED, 0.0)]);
        assert!(adapter.orders().is_empty());
    }

    #[tokio::test]
    async fn subscribe_ack_reports_ready() {
        let inits: Arc<StdMutex<Vec<bool>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = inits.clone();
        let callbacks = TradeCallbacks {
            init: Some(Arc::new(move |success| {
                let sink = sink.clone();
                Box::pin(async move {
                    sink.lock().unwrap().push(success);
                })
            })),
            ..TradeCallbacks::default()
        };
        let adapter = adapter_with_callbacks(callbacks);

        let ack = json!({"event": "subscribe", "channel": "spot/order:BTC-USDT"});
        adapter.on_binary(deflate(&ack.to_string())).await;
        assert_eq!(inits.lock().unwrap().clone(), vec![true]);
    }

    #[tokio::test]
    async fn login_reject_reports_failed_init() {
        let inits: Arc<StdMutex<Vec<bool>>> = Arc::new(StdMutex::new(Vec::new()));
        let errors: Arc<StdMutex<Vec<String>>> = Arc::new(StdMutex::new(Vec::new()));
        let init_sink = inits.clone();
        let error_sink = errors.clone();
        let callbacks = TradeCallbacks {
            init: Some(Arc::new(move |success| {
                let sink = init_sink.clone();
                Box::pin(async move {
                    sink.lock().unwrap().push(success);
                })
            })),
            error: Some(Arc::new(move |message| {
                let sink = error_sink.clone();
                Box::pin(async move {
                    sink.lock().unwrap().push(message);
                })
            })),
            ..TradeCallbacks::default()
        };
        let adapter = adapter_with_callbacks(callbacks);

        let reject = json!({"event": "login", "success": false, "errorCode": 30013});
        adapter.on_binary(deflate(&reject.to_string())).await;

        assert_eq!(inits.lock().unwrap().clone(), vec![false]);
        assert_eq!(errors.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn pong_frames_are_consumed_silently() {
        let adapter = adapter_with_callbacks(TradeCallbacks::default());
        adapter.on_binary(deflate("pong")).await;
        assert!(adapter.orders().is_empty());
    }
}
