//! Runtime entry point: `quantflow <config.json>`.
//!
//! Loads the config file, initializes logging, and runs the runtime until
//! SIGINT. Exits non-zero when the config cannot be loaded.

use std::process::ExitCode;

use quantflow::config::Config;
use quantflow::runtime::{self, QuantRuntime};

fn main() -> ExitCode {
    let mut args = std::env::args().skip(1);
    let Some(config_path) = args.next() else {
        eprintln!("usage: quantflow <config.json>");
        return ExitCode::from(2);
    };

    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("config load error ({config_path}): {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = runtime::init_logger(&config.log) {
        eprintln!("logger init error: {e}");
        return ExitCode::from(1);
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("runtime build error: {e}");
            return ExitCode::from(1);
        }
    };

    let result = rt.block_on(async {
        let runtime = QuantRuntime::init(config).await;
        runtime.run(None::<std::future::Ready<()>>).await
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("runtime error: {e}");
            ExitCode::from(1)
        }
    }
}
