//! Wire-contract tests for the event model: queue naming, routing keys,
//! and the compressed `{n, d}` payload codec, exercised through the crate's
//! public API only. No broker required.

use quantflow::event::{Event, EventKind, MarketEvent};
use quantflow::market::{Kline, KlineKind, Orderbook, Trade};
use quantflow::order::OrderAction;

fn sample_orderbook() -> Orderbook {
    Orderbook {
        platform: "okex".to_owned(),
        symbol: "BTC/USDT".to_owned(),
        asks: vec![["101.00000000".to_owned(), "2.00000000".to_owned()]],
        bids: vec![["99.00000000".to_owned(), "1.00000000".to_owned()]],
        timestamp: 1_551_690_867_806,
    }
}

fn sample_trade() -> Trade {
    Trade {
        platform: "binance".to_owned(),
        symbol: "BTC/USDT".to_owned(),
        action: OrderAction::BUY,
        price: "50000".to_owned(),
        quantity: "0.01".to_owned(),
        timestamp: 1_600_000_000_000,
    }
}

fn sample_kline() -> Kline {
    Kline {
        platform: "okex".to_owned(),
        symbol: "ETH/USDT".to_owned(),
        open: "200.10000000".to_owned(),
        high: "201.00000000".to_owned(),
        low: "199.50000000".to_owned(),
        close: "200.80000000".to_owned(),
        volume: "1234.50000000".to_owned(),
        timestamp: 1_551_690_860_000,
        kline_type: KlineKind::Kline,
    }
}

#[test]
fn queue_names_follow_the_server_id_exchange_routing_key_format() {
    let cases = [
        (EventKind::Orderbook, "srv-1.Orderbook.okex.BTC/USDT"),
        (EventKind::Trade, "srv-1.Trade.okex.BTC/USDT"),
        (EventKind::Kline, "srv-1.Kline.okex.BTC/USDT"),
    ];
    for (kind, expected) in cases {
        let event = Event::subscription(kind, "okex", "BTC/USDT", "srv-1");
        assert_eq!(event.queue.as_deref(), Some(expected));
        assert_eq!(event.routing_key, "okex.BTC/USDT");
    }
}

#[test]
fn wildcard_routing_keys_have_no_queue() {
    for (platform, symbol) in [("#", "#"), ("okex", "#"), ("#", "BTC/USDT")] {
        let event = Event::subscription(EventKind::Trade, platform, symbol, "srv-1");
        assert!(event.is_wildcard(), "{platform}.{symbol} should be wildcard");
        assert_eq!(event.queue, None);
    }
}

#[test]
fn every_entity_roundtrips_through_the_compressed_payload() {
    let orderbook = sample_orderbook();
    let event = Event::orderbook(&orderbook, "srv-1");
    let (name, data) = Event::loads(&event.dumps().unwrap()).unwrap();
    assert_eq!(name, "EVENT_ORDERBOOK");
    assert_eq!(Orderbook::load_smart(data).unwrap(), orderbook);

    let trade = sample_trade();
    let event = Event::trade(&trade, "srv-1");
    let (name, data) = Event::loads(&event.dumps().unwrap()).unwrap();
    assert_eq!(name, "EVENT_TRADE");
    assert_eq!(Trade::load_smart(data).unwrap(), trade);

    let kline = sample_kline();
    let event = Event::kline(&kline, "srv-1");
    let (name, data) = Event::loads(&event.dumps().unwrap()).unwrap();
    assert_eq!(name, "EVENT_KLINE");
    assert_eq!(Kline::load_smart(data).unwrap(), kline);
}

#[test]
fn parse_reproduces_the_published_entity_by_value() {
    let trade = sample_trade();
    let event = Event::trade(&trade, "srv-1");
    match event.parse().unwrap() {
        MarketEvent::Trade(parsed) => assert_eq!(parsed, trade),
        other => panic!("expected a trade, got {other:?}"),
    }
}

#[test]
fn payload_is_smaller_than_or_comparable_to_json_and_not_plaintext() {
    let orderbook = Orderbook {
        asks: (0..10)
            .map(|i| [format!("{}.00000000", 101 + i), "1.00000000".to_owned()])
            .collect(),
        bids: (0..10)
            .map(|i| [format!("{}.00000000", 99 - i), "1.00000000".to_owned()])
            .collect(),
        ..sample_orderbook()
    };
    let event = Event::orderbook(&orderbook, "srv-1");
    let wire = event.dumps().unwrap();
    // zlib magic header, not a JSON object.
    assert_eq!(wire[0], 0x78);
    let json_len = serde_json::to_vec(&orderbook.smart()).unwrap().len();
    assert!(wire.len() < json_len, "compression should beat {json_len} bytes");
}
