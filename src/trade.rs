//! Trade façade: one strategy-facing API over the per-exchange trade
//! adapters.
//!
//! The façade validates the platform, builds the concrete adapter through
//! the platform registry, and wraps the strategy's callbacks so that every
//! invocation carries the trade context (strategy, platform, symbol,
//! account). Prices and quantities cross this boundary as plain decimal
//! strings so exchanges never see scientific notation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::error::{QuantError, Result};
use crate::http::HttpClient;
use crate::order::{Order, OrderAction, OrderType, Position};
use crate::tasks::{self, Heartbeat};
use crate::util;

// ---------------------------------------------------------------------------
// Callbacks
// ---------------------------------------------------------------------------

/// Identifies which trade session a callback belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeContext {
    pub strategy: String,
    pub platform: String,
    pub symbol: String,
    pub account: String,
}

/// Adapter-facing order update callback.
pub type OrderUpdateCallback = Arc<dyn Fn(Order) -> BoxFuture<'static, ()> + Send + Sync>;
/// Adapter-facing position update callback.
pub type PositionUpdateCallback = Arc<dyn Fn(Position) -> BoxFuture<'static, ()> + Send + Sync>;
/// Adapter-facing init callback; `true` means the session is ready.
pub type InitCallback = Arc<dyn Fn(bool) -> BoxFuture<'static, ()> + Send + Sync>;
/// Adapter-facing error callback.
pub type ErrorCallback = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;

/// Callbacks handed to a trade adapter. All optional.
#[derive(Clone, Default)]
pub struct TradeCallbacks {
    pub order_update: Option<OrderUpdateCallback>,
    pub position_update: Option<PositionUpdateCallback>,
    pub init: Option<InitCallback>,
    pub error: Option<ErrorCallback>,
}

impl TradeCallbacks {
    /// Fire the order update callback, if any.
    pub fn on_order_update(&self, order: Order) -> BoxFuture<'static, ()> {
        match &self.order_update {
            Some(callback) => callback(order),
            None => Box::pin(async {}),
        }
    }

    /// Fire the position update callback, if any.
    pub fn on_position_update(&self, position: Position) -> BoxFuture<'static, ()> {
        match &self.position_update {
            Some(callback) => callback(position),
            None => Box::pin(async {}),
        }
    }

    /// Fire the init callback, if any.
    pub fn on_init(&self, success: bool) -> BoxFuture<'static, ()> {
        match &self.init {
            Some(callback) => callback(success),
            None => Box::pin(async {}),
        }
    }

    /// Fire the error callback, if any.
    pub fn on_error(&self, error: impl std::fmt::Display) -> BoxFuture<'static, ()> {
        match &self.error {
            Some(callback) => callback(error.to_string()),
            None => Box::pin(async {}),
        }
    }
}

/// Strategy-facing callbacks; each receives the [`TradeContext`].
#[derive(Clone, Default)]
pub struct StrategyCallbacks {
    pub order_update: Option<OrderUpdateCallback>,
    pub position_update: Option<PositionUpdateCallback>,
    pub init: Option<Arc<dyn Fn(bool, TradeContext) -> BoxFuture<'static, ()> + Send + Sync>>,
    pub error: Option<Arc<dyn Fn(String, TradeContext) -> BoxFuture<'static, ()> + Send + Sync>>,
}

// ---------------------------------------------------------------------------
// Parameters and dependencies
// ---------------------------------------------------------------------------

/// Construction parameters for a trade session. Optional credentials are
/// validated by the concrete adapter; a missing required field surfaces
/// through `error_callback` + `init_callback(false)`.
#[derive(Debug, Clone, Default)]
pub struct TradeParams {
    pub strategy: String,
    pub platform: String,
    /// Canonical symbol, e.g. `BTC/USDT`.
    pub symbol: String,
    /// REST host override.
    pub host: Option<String>,
    /// WebSocket host override.
    pub wss: Option<String>,
    pub account: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// API key passphrase (OKEx only).
    pub passphrase: Option<String>,
}

/// Shared runtime services an adapter needs.
#[derive(Clone)]
pub struct TradeDeps {
    pub heartbeat: Arc<Heartbeat>,
    pub http: Arc<HttpClient>,
}

// ---------------------------------------------------------------------------
// Adapter seam
// ---------------------------------------------------------------------------

/// Outcome of [`Trade::revoke_order`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevokeResult {
    /// Every open order for the symbol was canceled.
    All,
    /// The single requested order was canceled.
    One(String),
    /// Batch cancel: ids that succeeded and `(id, error)` pairs that failed.
    Many {
        succeeded: Vec<String>,
        failed: Vec<(String, String)>,
    },
}

/// Options for [`Trade::create_order`].
#[derive(Debug, Clone)]
pub struct OrderOptions {
    pub order_type: OrderType,
    /// Client order id; generated (dashless UUID1) when `None`.
    pub client_order_id: Option<String>,
}

impl Default for OrderOptions {
    fn default() -> Self {
        Self {
            order_type: OrderType::LIMIT,
            client_order_id: None,
        }
    }
}

/// One authenticated exchange trade session.
#[async_trait]
pub trait TradeAdapter: Send + Sync {
    /// Submit an order; returns the exchange order id.
    async fn create_order(
        &self,
        action: OrderAction,
        price: &str,
        quantity: &str,
        order_type: OrderType,
        client_order_id: &str,
    ) -> Result<String>;

    /// Cancel orders; see [`Trade::revoke_order`] for the three shapes.
    async fn revoke_order(&self, order_ids: &[String]) -> Result<RevokeResult>;

    /// Ids of currently open orders for the session symbol.
    async fn get_open_order_ids(&self) -> Result<Vec<String>>;

    /// Shallow copy of the open-order map.
    fn orders(&self) -> HashMap<String, Order>;
}

// ---------------------------------------------------------------------------
// Façade
// ---------------------------------------------------------------------------

/// Strategy-facing trade handle.
pub struct Trade {
    context: TradeContext,
    adapter: Option<Arc<dyn TradeAdapter>>,
}

impl Trade {
    /// Build a trade session for `params.platform`.
    ///
    /// An unknown platform fires `error_callback` and `init_callback(false)`
    /// and leaves the handle inert, mirroring the adapter boot error path.
    pub async fn new(params: TradeParams, callbacks: StrategyCallbacks, deps: &TradeDeps) -> Self {
        let context = TradeContext {
            strategy: params.strategy.clone(),
            platform: params.platform.clone(),
            symbol: params.symbol.clone(),
            account: params.account.clone().unwrap_or_default(),
        };
        let adapter_callbacks = wrap_callbacks(&callbacks, &context);

        match crate::platform::build(params, adapter_callbacks.clone(), deps).await {
            Ok(adapter) => Self {
                context,
                adapter: Some(adapter),
            },
            Err(e) => {
                tracing::error!(platform = %context.platform, error = %e, "trade platform error");
                let error = adapter_callbacks.on_error(&e);
                let init = adapter_callbacks.on_init(false);
                tasks::spawn(async move {
                    error.await;
                    init.await;
                });
                Self {
                    context,
                    adapter: None,
                }
            }
        }
    }

    /// The session context.
    pub fn context(&self) -> &TradeContext {
        &self.context
    }

    /// Create an order. `price` and `quantity` are converted to plain
    /// decimal strings; a missing `client_order_id` gets a dashless UUID1.
    pub async fn create_order(
        &self,
        action: OrderAction,
        price: f64,
        quantity: f64,
        options: OrderOptions,
    ) -> Result<String> {
        let adapter = self.adapter()?;
        let price = util::float_to_str(price);
        let quantity = util::float_to_str(quantity);
        let client_order_id = options
            .client_order_id
            .unwrap_or_else(util::uuid1_compact);
        adapter
            .create_order(action, &price, &quantity, options.order_type, &client_order_id)
            .await
    }

    /// Revoke orders. Zero ids cancels every open order for the session
    /// symbol, one id cancels that order, many ids are canceled one by one
    /// with per-id results collected.
    pub async fn revoke_order(&self, order_ids: &[String]) -> Result<RevokeResult> {
        self.adapter()?.revoke_order(order_ids).await
    }

    /// Open order ids for the session symbol, from the exchange.
    pub async fn get_open_order_ids(&self) -> Result<Vec<String>> {
        self.adapter()?.get_open_order_ids().await
    }

    /// Shallow copy of the open-order map.
    pub fn orders(&self) -> HashMap<String, Order> {
        self.adapter
            .as_ref()
            .map(|adapter| adapter.orders())
            .unwrap_or_default()
    }

    fn adapter(&self) -> Result<&Arc<dyn TradeAdapter>> {
        self.adapter
            .as_ref()
            .ok_or_else(|| QuantError::InvalidArgument("trade platform not initialized".into()))
    }
}

/// Wrap strategy callbacks so each invocation carries the context.
fn wrap_callbacks(callbacks: &StrategyCallbacks, context: &TradeContext) -> TradeCallbacks {
    let order_update = callbacks.order_update.clone();
    let position_update = callbacks.position_update.clone();

    let init = callbacks.init.clone().map(|callback| {
        let context = context.clone();
        let wrapped: InitCallback = Arc::new(move |success| callback(success, context.clone()));
        wrapped
    });
    let error = callbacks.error.clone().map(|callback| {
        let context = context.clone();
        let wrapped: ErrorCallback = Arc::new(move |message| callback(message, context.clone()));
        wrapped
    });

    TradeCallbacks {
        order_update,
        position_update,
        init,
        error,
    }
}
