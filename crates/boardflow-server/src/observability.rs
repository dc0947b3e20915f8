//! Tracing setup. The filter level starts at `info` and is swapped for
//! `logging.level` once the configuration is loaded.

use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

static LOG_RELOAD_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// HTTP client and server internals stay at `warn` unless `RUST_LOG` says
/// otherwise; at `debug` they drown out the engine's own events.
const QUIET_TARGETS: &[&str] = &["hyper", "hyper_util", "h2", "rustls", "reqwest"];

/// Filter directives for `level`: the level itself plus the quieted targets.
/// `off` silences everything.
fn filter_directives(level: &str) -> String {
    let level = level.trim().to_ascii_lowercase();
    if level == "off" {
        return level;
    }
    let mut directives = vec![level];
    directives.extend(QUIET_TARGETS.iter().map(|t| format!("{t}=warn")));
    directives.join(",")
}

/// `RUST_LOG` when it is set and parses, else the directives for `level`.
fn build_filter(level: &str) -> EnvFilter {
    std::env::var_os("RUST_LOG")
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(filter_directives(level)))
}

pub fn init_tracing() {
    init_tracing_with_level("info");
}

pub fn init_tracing_with_level(level: &str) {
    let (reload_layer, handle) = reload::Layer::new(build_filter(level));
    let _ = LOG_RELOAD_HANDLE.set(handle);

    let _ = tracing_subscriber::registry()
        .with(reload_layer)
        .with(fmt::layer().with_target(true))
        .try_init();
}

/// Swap in the configured level. `RUST_LOG`, when set, wins.
pub fn apply_logging_level(level: &str) {
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }
    let Some(handle) = LOG_RELOAD_HANDLE.get() else {
        return;
    };
    match handle.modify(|f| *f = EnvFilter::new(filter_directives(level))) {
        Ok(()) => tracing::debug!(level, "Log level applied"),
        Err(e) => eprintln!("Failed to apply log level {level}: {e}"),
    }
}

pub fn shutdown_tracing() {
    // fmt layer writes synchronously; nothing to flush
}
