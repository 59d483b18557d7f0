//! Logging setup: console output plus a dated log file under `<exe_dir>/logs/`.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Returns `<dir>/market_bot_YYYYMMDD.log` for today's date.
pub fn log_file_path(dir: &Path) -> PathBuf {
    dir.join(format!("market_bot_{}.log", Local::now().format("%Y%m%d")))
}

/// Installs the global subscriber.
///
/// `RUST_LOG` wins over `level` when set. If the log file cannot be opened
/// only the console layer is installed.
pub fn init(level: &str, log_dir: &Path) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path(log_dir));

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false));

    match file {
        Ok(file) => {
            registry
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .init();
        }
        Err(e) => {
            registry.init();
            tracing::warn!("Could not open log file in {}: {}", log_dir.display(), e);
        }
    }
}

/// Routes panics through `tracing` so they land in the log file.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = panic_info
            .location()
            .map(|loc| format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_default();
        tracing::error!("[PANIC]{} {}", location, msg);
    }));
}
