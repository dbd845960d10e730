//! Command-line surface (SPEC_FULL.md §1A). Grounded in the teacher's
//! `cli::Cli`/`Commands` (`clap` derive, `Subcommand` enum), narrowed to the
//! two subcommands this spec's core actually needs — market-agnostic
//! persistence/API/TUI commands stay out of scope for this crate.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "paired-hedge-engine")]
#[command(author, version, about = "Paired-leg market-making/hedging engine for binary prediction markets")]
pub struct Cli {
    /// Path to a TOML config file; if absent, code defaults + env vars apply.
    #[arg(long, global = true, env = "HEDGE_ENGINE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Force dry-run (in-memory exchange) even if the config says otherwise.
    #[arg(long, global = true, env = "HEDGE_ENGINE_DRY_RUN")]
    pub dry_run: bool,

    /// Directory for rotated log files; falls back to `./logs`.
    #[arg(long, global = true, env = "HEDGE_ENGINE_LOG_DIR")]
    pub log_dir: Option<String>,

    /// Warnings-only, console-only logging for one-shot subcommands.
    #[arg(long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the engine against one market slug and run until shutdown.
    Run {
        /// Market slug to trade, e.g. "btc-updown-15m-2026-07-31T1200".
        #[arg(long)]
        market: String,
    },
    /// Load and validate configuration, then exit.
    ValidateConfig,
}
