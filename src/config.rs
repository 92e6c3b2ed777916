//! Runtime configuration.
//!
//! Configuration is a single JSON file with upper-case top-level keys
//! (`SERVER_ID`, `LOG`, `RABBITMQ`, `ACCOUNTS`, `MARKETS`, `HEARTBEAT`,
//! `PROXY`). Unknown top-level keys are retained verbatim and can be read
//! back with [`Config::extra`], so strategy-specific settings can ride in
//! the same file.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::Result;
use crate::util;

/// Parsed configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Process identity used in bus queue names. Generated (UUID1) when
    /// the file does not set one.
    #[serde(rename = "SERVER_ID", default = "util::uuid1")]
    pub server_id: String,

    /// Logger settings.
    #[serde(rename = "LOG", default)]
    pub log: LogConfig,

    /// Message broker settings; `None` disables the event bus.
    #[serde(rename = "RABBITMQ", default)]
    pub rabbitmq: Option<RabbitConfig>,

    /// Trading account records. Shape is application-defined; the trade
    /// façade reads the fields it needs.
    #[serde(rename = "ACCOUNTS", default)]
    pub accounts: Vec<Value>,

    /// Market adapter settings keyed by platform name.
    #[serde(rename = "MARKETS", default)]
    pub markets: HashMap<String, MarketConfig>,

    /// Heartbeat log settings.
    #[serde(rename = "HEARTBEAT", default)]
    pub heartbeat: HeartbeatConfig,

    /// Optional HTTP/WebSocket proxy URL.
    #[serde(rename = "PROXY", default)]
    pub proxy: Option<String>,

    /// All unrecognized top-level keys, verbatim.
    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_id: util::uuid1(),
            log: LogConfig::default(),
            rabbitmq: None,
            accounts: Vec::new(),
            markets: HashMap::new(),
            heartbeat: HeartbeatConfig::default(),
            proxy: None,
            extra: HashMap::new(),
        }
    }
}

impl Config {
    /// Load and parse a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    /// Parse config from a JSON string.
    pub fn from_json(data: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(data)?;
        Ok(config)
    }

    /// Read an unrecognized top-level key by name.
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

/// `LOG` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level filter (`trace` / `debug` / `info` / `warn` / `error`).
    pub level: String,
    /// Directory for the log file; `None` disables file output.
    pub path: Option<String>,
    /// Log file name.
    pub name: String,
    /// Truncate the existing log file at startup.
    pub clear: bool,
    /// How many rotated files to keep at startup; `0` keeps none.
    pub backup_count: u32,
    /// Also write to stdout.
    pub console: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            path: None,
            name: "quant.log".to_owned(),
            clear: false,
            backup_count: 0,
            console: true,
        }
    }
}

/// `RABBITMQ` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RabbitConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl Default for RabbitConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: 5672,
            username: "guest".to_owned(),
            password: "guest".to_owned(),
        }
    }
}

impl RabbitConfig {
    /// AMQP connection URI.
    pub fn uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/%2f",
            self.username, self.password, self.host, self.port
        )
    }
}

/// One entry of the `MARKETS` section.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    /// Exchange WebSocket host override.
    #[serde(default)]
    pub wss: Option<String>,
    /// Symbols to subscribe, in canonical `BASE/QUOTE` form.
    pub symbols: Vec<String>,
    /// Channels to subscribe (`orderbook` / `trade` / `kline`).
    pub channels: Vec<String>,
    /// Levels per side published in order book events.
    #[serde(default)]
    pub orderbook_length: Option<usize>,
}

/// `HEARTBEAT` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Emit a heartbeat log line every `interval` ticks; `0` disables it.
    pub interval: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let raw = r#"{
            "SERVER_ID": "srv-1",
            "LOG": {"level": "debug", "console": true},
            "RABBITMQ": {"host": "mq.local", "port": 5673, "username": "u", "password": "p"},
            "ACCOUNTS": [{"platform": "binance", "account": "a@b.c"}],
            "MARKETS": {
                "binance": {"symbols": ["BTC/USDT"], "channels": ["orderbook", "trade"]}
            },
            "HEARTBEAT": {"interval": 60},
            "PROXY": null,
            "MY_STRATEGY": {"spread": 0.002}
        }"#;
        let config = Config::from_json(raw).unwrap();
        assert_eq!(config.server_id, "srv-1");
        assert_eq!(config.log.level, "debug");
        let mq = config.rabbitmq.as_ref().unwrap();
        assert_eq!(mq.uri(), "amqp://u:p@mq.local:5673/%2f");
        assert_eq!(config.accounts.len(), 1);
        assert_eq!(config.markets["binance"].symbols, vec!["BTC/USDT"]);
        assert_eq!(config.markets["binance"].orderbook_length, None);
        assert_eq!(config.heartbeat.interval, 60);
        assert_eq!(config.extra("MY_STRATEGY").unwrap()["spread"], 0.002);
    }

    #[test]
    fn server_id_defaults_to_generated_uuid() {
        let config = Config::from_json("{}").unwrap();
        assert!(!config.server_id.is_empty());
        let other = Config::from_json("{}").unwrap();
        assert_ne!(config.server_id, other.server_id);
    }

    #[test]
    fn missing_rabbitmq_disables_bus() {
        let config = Config::from_json(r#"{"SERVER_ID": "x"}"#).unwrap();
        assert!(config.rabbitmq.is_none());
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(Config::from_json("not json").is_err());
    }
}
