//! Runtime root: boot sequence, signal handling, ownership of the shared
//! services.
//!
//! Boot order: parse config → (caller initializes logging) → connect the
//! event bus when a broker is configured, blocking boot on the first
//! attempt → start the heartbeat ticker → spawn the configured market
//! adapters and the optional entrance future → run until SIGINT.

use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::event::EventBus;
use crate::http::HttpClient;
use crate::markets::{self, MarketAdapter, MarketDeps};
use crate::tasks::{self, Heartbeat};
use crate::trade::TradeDeps;

/// Owner of the process-wide services: configuration, heartbeat, HTTP
/// session cache, and (optionally) the event bus.
pub struct QuantRuntime {
    config: Config,
    heartbeat: Arc<Heartbeat>,
    http: Arc<HttpClient>,
    bus: Option<EventBus>,
    markets: Vec<Arc<dyn MarketAdapter>>,
}

impl QuantRuntime {
    /// Build the runtime and perform the event bus's first connect (boot
    /// blocks on the attempt; a failure is logged and retried by the bus's
    /// health loop).
    pub async fn init(config: Config) -> Self {
        let heartbeat = Heartbeat::new(config.heartbeat.interval);
        let http = Arc::new(HttpClient::new(config.proxy.clone()));

        let bus = match &config.rabbitmq {
            Some(rabbitmq) => {
                Some(EventBus::new(rabbitmq, &config.server_id, &heartbeat).await)
            }
            None => None,
        };

        Self {
            config,
            heartbeat,
            http,
            bus,
            markets: Vec::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn heartbeat(&self) -> Arc<Heartbeat> {
        self.heartbeat.clone()
    }

    /// The event bus; `None` when no broker is configured.
    pub fn event_bus(&self) -> Option<EventBus> {
        self.bus.clone()
    }

    /// Dependencies for constructing [`Trade`](crate::trade::Trade) sessions.
    pub fn trade_deps(&self) -> TradeDeps {
        TradeDeps {
            heartbeat: self.heartbeat.clone(),
            http: self.http.clone(),
        }
    }

    /// Start the heartbeat, the configured market adapters, and the
    /// optional entrance future, then run until SIGINT.
    pub async fn run<F>(mut self, entrance: Option<F>) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.heartbeat.start();
        self.start_markets();

        if let Some(entrance) = entrance {
            tasks::spawn(entrance);
        }

        tracing::info!(server_id = %self.config.server_id, "runtime started");
        tokio::signal::ctrl_c().await?;
        tracing::info!("SIGINT received, stopping");
        Ok(())
    }

    /// Spawn a market adapter for every `MARKETS` config entry. Requires
    /// the event bus; entries failing to construct are logged and skipped.
    fn start_markets(&mut self) {
        if self.config.markets.is_empty() {
            return;
        }
        let Some(bus) = &self.bus else {
            tracing::warn!("markets configured but no broker, market adapters not started");
            return;
        };
        let deps = MarketDeps {
            heartbeat: self.heartbeat.clone(),
            bus: bus.clone(),
        };
        for (platform, market_config) in &self.config.markets {
            let params = markets::MarketParams::from_config(platform, market_config);
            match markets::spawn(params, &deps) {
                Ok(adapter) => {
                    tracing::info!(platform, "market adapter started");
                    self.markets.push(adapter);
                }
                Err(e) => tracing::error!(platform, error = %e, "market adapter error"),
            }
        }
    }
}

/// Initialize the global `tracing` subscriber from the `LOG` config
/// section. Console and file output are mutually exclusive, matching the
/// logger this runtime grew out of; file mode performs a simple rotation
/// at startup honoring `backup_count`, or truncates when `clear` is set.
#[cfg(feature = "cli")]
pub fn init_logger(log: &crate::config::LogConfig) -> Result<()> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&log.level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if log.console || log.path.is_none() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return Ok(());
    }

    let dir = std::path::PathBuf::from(log.path.as_deref().unwrap_or("."));
    std::fs::create_dir_all(&dir)?;
    let file_path = dir.join(&log.name);

    if log.clear {
        let _ = std::fs::remove_file(&file_path);
    } else if log.backup_count > 0 && file_path.exists() {
        // Shift name.1 → name.2 … then name → name.1, dropping the oldest.
        for index in (1..log.backup_count).rev() {
            let from = dir.join(format!("{}.{index}", log.name));
            if from.exists() {
                let _ = std::fs::rename(&from, dir.join(format!("{}.{}", log.name, index + 1)));
            }
        }
        let _ = std::fs::rename(&file_path, dir.join(format!("{}.1", log.name)));
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&file_path)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}
