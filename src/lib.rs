//! # quantflow
//!
//! Event-driven market-data and order-routing runtime for trading bots that
//! connect to multiple cryptocurrency exchanges concurrently.
//!
//! Market adapters normalize exchange WebSocket feeds into
//! [`Orderbook`](market::Orderbook) / [`Trade`](market::Trade) /
//! [`Kline`](market::Kline) events and publish them on an AMQP topic
//! exchange per entity type, routed by `"{platform}.{symbol}"`. Strategy
//! processes subscribe through the same [`EventBus`](event::EventBus).
//! Order routing goes the other way: the [`Trade`](trade::Trade) façade
//! dispatches to a per-exchange trade adapter that signs REST requests and
//! mirrors the order lifecycle from the exchange's user-data stream.
//!
//! ## Quick Start
//!
//! ```no_run
//! use quantflow::config::Config;
//! use quantflow::runtime::QuantRuntime;
//!
//! #[tokio::main]
//! async fn main() -> quantflow::Result<()> {
//!     let config = Config::load("config.json")?;
//!     let runtime = QuantRuntime::init(config).await;
//!     runtime.run(None::<std::future::Ready<()>>).await
//! }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod http;
pub mod locker;
pub mod market;
pub mod markets;
pub mod order;
pub mod platform;
pub mod runtime;
pub mod tasks;
pub mod trade;
pub mod util;
pub mod ws;

/// Re-export the runtime root at crate level for convenience.
pub use runtime::QuantRuntime;
/// Re-export the error type and Result alias.
pub use error::{QuantError, Result};
