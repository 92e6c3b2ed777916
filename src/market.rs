//! Normalized market entities carried over the event bus.
//!
//! Every entity has two serializations: a **verbose** form (long keys, the
//! derived `Serialize` impl) for logs and inspection, and a **compact** form
//! (single-letter keys) used as the bus payload. The compact form is the
//! wire contract: the keys are a schema, and round-trips through it are
//! lossless. Prices and quantities are strings preserving the exchange's
//! original precision.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::order::OrderAction;

/// One price level: `[price, quantity]`, both strings.
pub type BookLevel = [String; 2];

// ---------------------------------------------------------------------------
// Kline kinds
// ---------------------------------------------------------------------------

/// Candlestick interval identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KlineKind {
    #[serde(rename = "kline")]
    Kline,
    #[serde(rename = "kline_3m")]
    Kline3M,
    #[serde(rename = "kline_5m")]
    Kline5M,
    #[serde(rename = "kline_15m")]
    Kline15M,
    #[serde(rename = "kline_30m")]
    Kline30M,
    #[serde(rename = "kline_1h")]
    Kline1H,
    #[serde(rename = "kline_3h")]
    Kline3H,
    #[serde(rename = "kline_6h")]
    Kline6H,
    #[serde(rename = "kline_12h")]
    Kline12H,
    #[serde(rename = "kline_1d")]
    Kline1D,
    #[serde(rename = "kline_3d")]
    Kline3D,
    #[serde(rename = "kline_1w")]
    Kline1W,
    #[serde(rename = "kline_15d")]
    Kline15D,
    #[serde(rename = "kline_1mon")]
    Kline1Mon,
    #[serde(rename = "kline_1y")]
    Kline1Y,
}

// ---------------------------------------------------------------------------
// Orderbook
// ---------------------------------------------------------------------------

/// Order book snapshot published by a market adapter.
///
/// `asks` ascend by price, `bids` descend. At publish time both sides are
/// non-empty, `asks[0] > bids[0]`, and each side holds at most the
/// configured book length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Orderbook {
    pub platform: String,
    pub symbol: String,
    pub asks: Vec<BookLevel>,
    pub bids: Vec<BookLevel>,
    /// Update time, epoch milliseconds.
    pub timestamp: i64,
}

#[derive(Serialize, Deserialize)]
struct CompactOrderbook {
    p: String,
    s: String,
    a: Vec<BookLevel>,
    b: Vec<BookLevel>,
    t: i64,
}

impl Orderbook {
    /// Compact (wire) form.
    pub fn smart(&self) -> Value {
        serde_json::to_value(CompactOrderbook {
            p: self.platform.clone(),
            s: self.symbol.clone(),
            a: self.asks.clone(),
            b: self.bids.clone(),
            t: self.timestamp,
        })
        .expect("orderbook compact form is always serializable")
    }

    /// Rebuild from the compact form.
    pub fn load_smart(value: Value) -> Result<Self> {
        let c: CompactOrderbook = serde_json::from_value(value)?;
        Ok(Self {
            platform: c.p,
            symbol: c.s,
            asks: c.a,
            bids: c.b,
            timestamp: c.t,
        })
    }
}

// ---------------------------------------------------------------------------
// Trade
// ---------------------------------------------------------------------------

/// One public trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub platform: String,
    pub symbol: String,
    pub action: OrderAction,
    pub price: String,
    pub quantity: String,
    /// Trade time, epoch milliseconds.
    pub timestamp: i64,
}

#[derive(Serialize, Deserialize)]
struct CompactTrade {
    p: String,
    s: String,
    a: OrderAction,
    #[serde(rename = "P")]
    price: String,
    q: String,
    t: i64,
}

impl Trade {
    /// Compact (wire) form.
    pub fn smart(&self) -> Value {
        serde_json::to_value(CompactTrade {
            p: self.platform.clone(),
            s: self.symbol.clone(),
            a: self.action,
            price: self.price.clone(),
            q: self.quantity.clone(),
            t: self.timestamp,
        })
        .expect("trade compact form is always serializable")
    }

    /// Rebuild from the compact form.
    pub fn load_smart(value: Value) -> Result<Self> {
        let c: CompactTrade = serde_json::from_value(value)?;
        Ok(Self {
            platform: c.p,
            symbol: c.s,
            action: c.a,
            price: c.price,
            quantity: c.q,
            timestamp: c.t,
        })
    }
}

// ---------------------------------------------------------------------------
// Kline
// ---------------------------------------------------------------------------

/// One candlestick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub platform: String,
    pub symbol: String,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
    /// Candle open time, epoch milliseconds.
    pub timestamp: i64,
    pub kline_type: KlineKind,
}

#[derive(Serialize, Deserialize)]
struct CompactKline {
    p: String,
    s: String,
    o: String,
    h: String,
    l: String,
    c: String,
    v: String,
    t: i64,
    kt: KlineKind,
}

impl Kline {
    /// Compact (wire) form.
    pub fn smart(&self) -> Value {
        serde_json::to_value(CompactKline {
            p: self.platform.clone(),
            s: self.symbol.clone(),
            o: self.open.clone(),
            h: self.high.clone(),
            l: self.low.clone(),
            c: self.close.clone(),
            v: self.volume.clone(),
            t: self.timestamp,
            kt: self.kline_type,
        })
        .expect("kline compact form is always serializable")
    }

    /// Rebuild from the compact form.
    pub fn load_smart(value: Value) -> Result<Self> {
        let c: CompactKline = serde_json::from_value(value)?;
        Ok(Self {
            platform: c.p,
            symbol: c.s,
            open: c.o,
            high: c.h,
            low: c.l,
            close: c.c,
            volume: c.v,
            timestamp: c.t,
            kline_type: c.kt,
        })
    }
}
