//! Tracing setup (SPEC_FULL.md §1A). Grounded directly in the teacher's
//! `main.rs::init_logging`/`init_logging_simple`: an `EnvFilter` default
//! directive, a console layer, and an optional daily-rotating file layer
//! whose writability is preflighted before committing to it (the teacher's
//! `tracing_appender::rolling::daily` aborts the process if it can't create
//! the log file, so we check first and fall back to console-only instead).

use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Leaked deliberately: the non-blocking writer's guard must outlive the
/// process for a long-running engine, and there is no natural owner for it
/// short of `main`'s stack, which already has enough to hold.
fn leak_guard(guard: tracing_appender::non_blocking::WorkerGuard) {
    Box::leak(Box::new(guard));
}

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,paired_hedge_engine=debug"))
}

fn resolve_log_dir(configured: Option<&str>) -> Option<PathBuf> {
    let dir = configured
        .map(PathBuf::from)
        .or_else(|| std::env::var("HEDGE_ENGINE_LOG_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("./logs"));

    std::fs::create_dir_all(&dir).ok()?;
    let probe = dir.join(".write_probe");
    if std::fs::write(&probe, b"ok").is_ok() {
        let _ = std::fs::remove_file(&probe);
        Some(dir)
    } else {
        None
    }
}

/// Full logging setup for the `run` subcommand: console plus (when a log
/// directory is writable) a daily-rotating file layer.
pub fn init_logging(log_dir_override: Option<&str>) {
    let filter = default_filter();

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match resolve_log_dir(log_dir_override) {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(&dir, "paired-hedge-engine.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            leak_guard(guard);
            let file_layer = fmt::layer().with_ansi(false).with_writer(non_blocking);
            tracing_subscriber::registry().with(filter).with(console_layer).with(file_layer).init();
        }
        None => {
            tracing_subscriber::registry().with(filter).with(console_layer).init();
        }
    }
}

/// Minimal setup for one-shot CLI subcommands (e.g. `validate-config`):
/// warnings and errors only, console-only.
pub fn init_logging_simple() {
    let _ = fmt().with_max_level(Level::WARN).try_init();
}

pub fn log_dir_is_writable(path: &Path) -> bool {
    resolve_log_dir(path.to_str()).is_some()
}
